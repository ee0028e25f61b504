//! Backing stores a page source reads from.

use parking_lot::{Mutex, RwLock};
use quiver_core::{Error, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One request of a vectored read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadRequest {
    pub offset: u64,
    pub size: usize,
    /// Filled by the read.
    pub buffer: Vec<u8>,
}

impl ReadRequest {
    pub fn new(offset: u64, size: usize) -> Self {
        Self {
            offset,
            size,
            buffer: Vec::new(),
        }
    }
}

/// Random-access, read-only view of a backing store.
pub trait RawFile: Send + Sync {
    /// Fills `buf` with the bytes starting at `offset`; short reads are errors.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Serves several requests at once.
    fn read_v(&self, requests: &mut [ReadRequest]) -> Result<()> {
        for req in requests.iter_mut() {
            req.buffer.resize(req.size, 0);
            self.read_at(&mut req.buffer, req.offset)?;
        }
        Ok(())
    }

    /// Total size in bytes.
    fn size(&self) -> Result<u64>;

    /// Opens an independent handle on the same store.
    fn try_clone(&self) -> Result<Box<dyn RawFile>>;

    /// Human-readable location, used in log messages.
    fn url(&self) -> String;
}

/// A file on the local file system.
///
/// Each handle owns its OS file; clones reopen the path so that concurrent
/// readers never share a cursor.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LocalFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawFile for LocalFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn try_clone(&self) -> Result<Box<dyn RawFile>> {
        Ok(Box::new(LocalFile::open(&self.path)?))
    }

    fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// An in-memory store shared by every clone of the handle.
///
/// A writer publishes the complete dataset on commit; until then readers see
/// whatever was published before.
#[derive(Clone, Debug, Default)]
pub struct MemoryFile {
    data: Arc<RwLock<Arc<Vec<u8>>>>,
}

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(Arc::new(bytes))),
        }
    }

    /// Replaces the store content.
    pub fn publish(&self, bytes: Vec<u8>) {
        *self.data.write() = Arc::new(bytes);
    }

    /// Snapshot of the store content.
    pub fn contents(&self) -> Arc<Vec<u8>> {
        self.data.read().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RawFile for MemoryFile {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let data = self.contents();
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("read of {} bytes at {} past end of {}", buf.len(), offset, data.len()),
                ))
            })?;
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.len() as u64)
    }

    fn try_clone(&self) -> Result<Box<dyn RawFile>> {
        Ok(Box::new(self.clone()))
    }

    fn url(&self) -> String {
        "memory://".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_memory_file_reads() {
        let file = MemoryFile::from_bytes((0..32).collect());
        let mut buf = [0u8; 4];
        file.read_at(&mut buf, 10).unwrap();
        assert_eq!(buf, [10, 11, 12, 13]);
        assert!(file.read_at(&mut buf, 30).is_err());
        assert_eq!(file.size().unwrap(), 32);
    }

    #[test]
    fn test_read_v_default() {
        let file = MemoryFile::from_bytes((0..32).collect());
        let mut reqs = vec![ReadRequest::new(0, 2), ReadRequest::new(20, 3)];
        file.read_v(&mut reqs).unwrap();
        assert_eq!(reqs[0].buffer, vec![0, 1]);
        assert_eq!(reqs[1].buffer, vec![20, 21, 22]);
    }

    #[test]
    fn test_local_file_clone_is_independent() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789").unwrap();
        tmp.flush().unwrap();

        let file = LocalFile::open(tmp.path()).unwrap();
        let clone = file.try_clone().unwrap();
        let mut a = [0u8; 3];
        let mut b = [0u8; 3];
        file.read_at(&mut a, 7).unwrap();
        clone.read_at(&mut b, 1).unwrap();
        assert_eq!(&a, b"789");
        assert_eq!(&b, b"123");
        assert_eq!(clone.size().unwrap(), 10);
    }

    #[test]
    fn test_memory_publish_visible_to_clones() {
        let file = MemoryFile::new();
        let clone = file.try_clone().unwrap();
        file.publish(vec![1, 2, 3]);
        assert_eq!(clone.size().unwrap(), 3);
    }
}
