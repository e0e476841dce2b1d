//! Errors for manager setup and batch operations.
//!
//! Individual compiles never fail with these; they report through
//! [`CompiledShader`](shade_compiler::CompiledShader).

use std::path::PathBuf;

use shade_cache::CacheError;
use shade_config::ConfigError;

/// Errors raised by [`ShaderManager`](crate::ShaderManager) construction,
/// cache maintenance and precompilation.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A configuration or manifest file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A cache maintenance operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A directory could not be scanned.
    #[error("failed to scan {path}: {reason}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// The compile thread pool could not be created.
    #[error("failed to start compile threads: {0}")]
    ThreadPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_config_errors() {
        let err: ManagerError = ConfigError::MissingField("shader[0].file".into()).into();
        assert!(err.to_string().contains("shader[0].file"));
    }

    #[test]
    fn scan_display() {
        let err = ManagerError::Scan {
            path: PathBuf::from("shaders"),
            reason: "permission denied".into(),
        };
        assert_eq!(err.to_string(), "failed to scan shaders: permission denied");
    }
}
