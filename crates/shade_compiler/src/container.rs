//! Chunked bytecode container.
//!
//! Layout (little-endian):
//!
//! ```text
//! 0   magic       "SHBC"
//! 4   checksum    16 bytes, XXH3-128 of everything from offset 20
//! 20  reserved    u32 = 1
//! 24  total_size  u32
//! 28  chunk_count u32
//! 32  offsets     chunk_count x u32
//!     chunks      fourcc + u32 size + payload
//! ```

use std::fmt;

use crate::error::ContainerError;
use xxhash_rust::xxh3::xxh3_128;

const MAGIC: [u8; 4] = *b"SHBC";
const HEADER_LEN: usize = 32;
const CHECKSUM_START: usize = 20;
const MAX_CHUNKS: usize = 64;

/// A four-character chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Legacy-tier program.
    pub const SHEX: FourCC = FourCC(*b"SHEX");
    /// Modern-tier program.
    pub const DXIL: FourCC = FourCC(*b"DXIL");
    /// Resource bindings.
    pub const RDEF: FourCC = FourCC(*b"RDEF");
    /// Vertex input signature.
    pub const ISGN: FourCC = FourCC(*b"ISGN");
    /// Embedded debug information.
    pub const SDBG: FourCC = FourCC(*b"SDBG");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{self}\")")
    }
}

/// Assembles a container from chunks.
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    chunks: Vec<(FourCC, Vec<u8>)>,
}

impl ContainerBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk.
    pub fn chunk(mut self, fourcc: FourCC, data: Vec<u8>) -> Self {
        self.chunks.push((fourcc, data));
        self
    }

    /// Serializes the container and fills in its checksum.
    pub fn build(self) -> Vec<u8> {
        let table_end = HEADER_LEN + 4 * self.chunks.len();
        let total = table_end + self.chunks.iter().map(|(_, d)| 8 + d.len()).sum::<usize>();

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&(total as u32).to_le_bytes());
        out.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());

        let mut offset = table_end;
        for (_, data) in &self.chunks {
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += 8 + data.len();
        }
        for (fourcc, data) in &self.chunks {
            out.extend_from_slice(&fourcc.0);
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(data);
        }

        let sum = xxh3_128(&out[CHECKSUM_START..]).to_le_bytes();
        out[4..CHECKSUM_START].copy_from_slice(&sum);
        out
    }
}

/// A parsed container borrowing its bytes.
#[derive(Debug, Clone)]
pub struct Container<'a> {
    bytes: &'a [u8],
    chunks: Vec<(FourCC, &'a [u8])>,
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, ContainerError> {
    let end = at.checked_add(4).ok_or(ContainerError::Truncated {
        needed: usize::MAX,
        actual: bytes.len(),
    })?;
    let slice = bytes.get(at..end).ok_or(ContainerError::Truncated {
        needed: end,
        actual: bytes.len(),
    })?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(slice);
    Ok(u32::from_le_bytes(buf))
}

impl<'a> Container<'a> {
    /// Parses and bounds-checks `bytes`. The checksum is not verified; see
    /// [`Container::verify_checksum`].
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ContainerError> {
        if bytes.len() < HEADER_LEN {
            return Err(ContainerError::Truncated {
                needed: HEADER_LEN,
                actual: bytes.len(),
            });
        }
        if bytes[..4] != MAGIC {
            return Err(ContainerError::BadMagic);
        }
        let total = read_u32(bytes, 24)? as usize;
        if total < HEADER_LEN || total > bytes.len() {
            return Err(ContainerError::Truncated {
                needed: total.max(HEADER_LEN),
                actual: bytes.len(),
            });
        }
        let bytes = &bytes[..total];

        let count = read_u32(bytes, 28)? as usize;
        if count > MAX_CHUNKS {
            return Err(ContainerError::BadOffset {
                index: count,
                offset: 28,
            });
        }
        let table_end = HEADER_LEN + 4 * count;
        if table_end > bytes.len() {
            return Err(ContainerError::Truncated {
                needed: table_end,
                actual: bytes.len(),
            });
        }

        let mut chunks = Vec::with_capacity(count);
        for index in 0..count {
            let offset = read_u32(bytes, HEADER_LEN + 4 * index)? as usize;
            if offset < table_end || offset.saturating_add(8) > bytes.len() {
                return Err(ContainerError::BadOffset { index, offset });
            }
            let mut fourcc = [0u8; 4];
            fourcc.copy_from_slice(&bytes[offset..offset + 4]);
            let size = read_u32(bytes, offset + 4)? as usize;
            let start = offset + 8;
            let end = start.checked_add(size).filter(|&e| e <= bytes.len()).ok_or(
                ContainerError::Truncated {
                    needed: start.saturating_add(size),
                    actual: bytes.len(),
                },
            )?;
            chunks.push((FourCC(fourcc), &bytes[start..end]));
        }
        Ok(Self { bytes, chunks })
    }

    /// Checks the stored checksum against the content.
    pub fn verify_checksum(&self) -> Result<(), ContainerError> {
        let sum = xxh3_128(&self.bytes[CHECKSUM_START..]).to_le_bytes();
        if self.bytes[4..CHECKSUM_START] == sum {
            Ok(())
        } else {
            Err(ContainerError::ChecksumMismatch)
        }
    }

    /// Returns the first chunk with `fourcc`.
    pub fn chunk(&self, fourcc: FourCC) -> Option<&'a [u8]> {
        self.chunks.iter().find(|(f, _)| *f == fourcc).map(|(_, d)| *d)
    }

    /// Returns the chunk with `fourcc` or a [`ContainerError::MissingChunk`].
    pub fn require(&self, fourcc: FourCC) -> Result<&'a [u8], ContainerError> {
        self.chunk(fourcc).ok_or(ContainerError::MissingChunk(fourcc))
    }

    /// All chunks in container order.
    pub fn chunks(&self) -> impl Iterator<Item = (FourCC, &'a [u8])> + '_ {
        self.chunks.iter().copied()
    }

    /// Size of the container in bytes.
    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }
}
