//! Storage backends for data drops.
//!
//! A backend only moves bytes. Status, checksums and completion live on the
//! owning [`DropObject`](super::DropObject), which serializes writes.

use crate::types::DropPhase;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Sequential reader over a drop's data, one chunk at a time.
pub trait ChunkReader: Send {
    /// Read up to `max` bytes. `None` means end of data.
    fn next_chunk(&mut self, max: usize) -> io::Result<Option<Bytes>>;
}

/// Byte storage behind a data drop.
pub trait DataIo: Send + Sync + fmt::Debug {
    /// Append bytes, returning how many were stored.
    fn write(&self, data: &[u8]) -> io::Result<usize>;

    /// Open a fresh reader positioned at the start of the data.
    fn open_reader(&self) -> io::Result<Box<dyn ChunkReader>>;

    /// Number of bytes stored.
    fn size(&self) -> u64;

    /// Whether stored data is present.
    fn exists(&self) -> bool;

    /// Remove stored data. Deleting twice is not an error.
    fn delete(&self) -> io::Result<()>;

    /// Durability tier of this backend.
    fn phase(&self) -> DropPhase;
}

/// Volatile in-memory storage.
#[derive(Debug)]
pub struct MemoryIo {
    buf: RwLock<Option<BytesMut>>,
}

impl MemoryIo {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            buf: RwLock::new(Some(BytesMut::new())),
        }
    }
}

impl Default for MemoryIo {
    fn default() -> Self {
        Self::new()
    }
}

impl DataIo for MemoryIo {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut guard = self.buf.write();
        let buf = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "buffer was deleted"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn open_reader(&self) -> io::Result<Box<dyn ChunkReader>> {
        let guard = self.buf.read();
        let buf = guard
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "buffer was deleted"))?;
        Ok(Box::new(BytesReader {
            data: Bytes::copy_from_slice(buf),
        }))
    }

    fn size(&self) -> u64 {
        self.buf.read().as_ref().map_or(0, |b| b.len() as u64)
    }

    fn exists(&self) -> bool {
        self.buf.read().is_some()
    }

    fn delete(&self) -> io::Result<()> {
        *self.buf.write() = None;
        Ok(())
    }

    fn phase(&self) -> DropPhase {
        DropPhase::Plasma
    }
}

struct BytesReader {
    data: Bytes,
}

impl ChunkReader for BytesReader {
    fn next_chunk(&mut self, max: usize) -> io::Result<Option<Bytes>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let n = max.max(1).min(self.data.len());
        Ok(Some(self.data.split_to(n)))
    }
}

/// File-backed storage.
#[derive(Debug)]
pub struct FileIo {
    path: PathBuf,
    written: RwLock<u64>,
}

impl FileIo {
    /// Use `path` for storage. Parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let written = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            written: RwLock::new(written),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataIo for FileIo {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut written = self.written.write();
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(data)?;
        *written += data.len() as u64;
        Ok(data.len())
    }

    fn open_reader(&self) -> io::Result<Box<dyn ChunkReader>> {
        Ok(Box::new(FileReader {
            file: File::open(&self.path)?,
        }))
    }

    fn size(&self) -> u64 {
        *self.written.read()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn delete(&self) -> io::Result<()> {
        let mut written = self.written.write();
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        *written = 0;
        Ok(())
    }

    fn phase(&self) -> DropPhase {
        DropPhase::Solid
    }
}

struct FileReader {
    file: File,
}

impl ChunkReader for FileReader {
    fn next_chunk(&mut self, max: usize) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; max.max(1)];
        let n = self.file.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}

/// Storage that counts bytes and discards them.
#[derive(Debug, Default)]
pub struct NullIo {
    written: RwLock<u64>,
}

impl NullIo {
    /// Create a discarding backend.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataIo for NullIo {
    fn write(&self, data: &[u8]) -> io::Result<usize> {
        *self.written.write() += data.len() as u64;
        Ok(data.len())
    }

    fn open_reader(&self) -> io::Result<Box<dyn ChunkReader>> {
        Ok(Box::new(BytesReader { data: Bytes::new() }))
    }

    fn size(&self) -> u64 {
        *self.written.read()
    }

    fn exists(&self) -> bool {
        true
    }

    fn delete(&self) -> io::Result<()> {
        *self.written.write() = 0;
        Ok(())
    }

    fn phase(&self) -> DropPhase {
        DropPhase::Plasma
    }
}
