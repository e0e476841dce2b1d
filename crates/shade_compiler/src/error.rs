//! Error types for backend initialization and container parsing.
//!
//! Shader source problems never surface here; they are reported through
//! [`CompiledShader::errors`](crate::CompiledShader::errors).

use crate::container::FourCC;

/// Errors raised while initializing a compiler backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend was disabled by configuration.
    #[error("{backend} backend disabled by configuration")]
    Disabled {
        /// Backend name.
        backend: &'static str,
    },

    /// The initialization self-test compile did not succeed.
    #[error("{backend} backend self-test failed: {detail}")]
    SelfTest {
        /// Backend name.
        backend: &'static str,
        /// The first diagnostic produced by the self-test.
        detail: String,
    },
}

/// Errors raised while reading a bytecode container.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContainerError {
    /// The buffer ends before a required field.
    #[error("container truncated: need {needed} bytes, got {actual}")]
    Truncated {
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The container does not start with the expected magic.
    #[error("bad container magic")]
    BadMagic,

    /// A chunk offset points outside the container or into its header.
    #[error("chunk {index} has invalid offset {offset}")]
    BadOffset {
        /// Chunk index in the offset table.
        index: usize,
        /// The offending offset.
        offset: usize,
    },

    /// The stored checksum does not match the content.
    #[error("container checksum mismatch")]
    ChecksumMismatch,

    /// A required chunk is absent.
    #[error("missing {0} chunk")]
    MissingChunk(FourCC),

    /// A chunk payload could not be encoded.
    #[error("cannot encode {fourcc} chunk: {reason}")]
    EncodeChunk {
        /// Chunk identifier.
        fourcc: FourCC,
        /// Encoder message.
        reason: String,
    },

    /// A chunk payload could not be decoded.
    #[error("malformed {fourcc} chunk: {reason}")]
    MalformedChunk {
        /// Chunk identifier.
        fourcc: FourCC,
        /// Decoder message.
        reason: String,
    },
}
