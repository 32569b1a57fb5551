//! Incremental checksums over written data.

use crate::types::ChecksumType;

/// Running checksum, updated on every write.
#[derive(Clone)]
pub(crate) enum Checksummer {
    Crc32(crc32fast::Hasher),
    Crc32c(u32),
}

impl Checksummer {
    pub(crate) fn new(kind: ChecksumType) -> Self {
        match kind {
            ChecksumType::Crc32 => Self::Crc32(crc32fast::Hasher::new()),
            ChecksumType::Crc32c => Self::Crc32c(0),
        }
    }

    pub(crate) fn update(&mut self, data: &[u8]) {
        match self {
            Self::Crc32(h) => h.update(data),
            Self::Crc32c(crc) => *crc = crc32c::crc32c_append(*crc, data),
        }
    }

    pub(crate) fn value(&self) -> u32 {
        match self {
            Self::Crc32(h) => h.clone().finalize(),
            Self::Crc32c(crc) => *crc,
        }
    }

    pub(crate) fn kind(&self) -> ChecksumType {
        match self {
            Self::Crc32(_) => ChecksumType::Crc32,
            Self::Crc32c(_) => ChecksumType::Crc32c,
        }
    }
}

impl std::fmt::Debug for Checksummer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({:#010x})", self.kind(), self.value())
    }
}
