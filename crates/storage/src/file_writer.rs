//! Sequential writer for the nTuple container.
//!
//! ```text
//! [magic][header envelope][page blobs ...][footer envelope][anchor]
//! ```
//!
//! On-disk datasets are written to a hidden sibling file and renamed into place
//! by `commit`. A writer dropped before committing removes its temporary file,
//! and an in-memory writer publishes nothing.

use crate::raw_file::MemoryFile;
use crate::serialize::{Anchor, MAGIC};
use quiver_core::{Error, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

enum Target {
    File {
        out: BufWriter<File>,
        tmp_path: PathBuf,
        path: PathBuf,
    },
    Memory {
        buffer: Vec<u8>,
        file: MemoryFile,
    },
}

/// Appends blobs to a new nTuple container.
pub struct FileWriter {
    target: Target,
    offset: u64,
    anchor: Anchor,
    committed: bool,
}

impl FileWriter {
    /// Starts a new on-disk dataset at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::invalid_operation(format!("not a file path: {}", path.display())))?
            .to_string_lossy()
            .into_owned();
        let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));
        let out = BufWriter::new(File::create(&tmp_path)?);
        let mut writer = Self {
            target: Target::File { out, tmp_path, path },
            offset: 0,
            anchor: Anchor::default(),
            committed: false,
        };
        writer.write_blob(MAGIC)?;
        Ok(writer)
    }

    /// Starts a new dataset that is published to `file` on commit.
    pub fn in_memory(file: MemoryFile) -> Self {
        Self {
            target: Target::Memory {
                buffer: MAGIC.to_vec(),
                file,
            },
            offset: MAGIC.len() as u64,
            anchor: Anchor::default(),
            committed: false,
        }
    }

    /// Number of bytes written so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Appends a blob and returns its position.
    pub fn write_blob(&mut self, bytes: &[u8]) -> Result<u64> {
        if self.committed {
            return Err(Error::invalid_operation("write after commit"));
        }
        let position = self.offset;
        match &mut self.target {
            Target::File { out, .. } => out.write_all(bytes)?,
            Target::Memory { buffer, .. } => buffer.extend_from_slice(bytes),
        }
        self.offset += bytes.len() as u64;
        Ok(position)
    }

    /// Writes the stored header envelope.
    pub fn write_header(&mut self, stored: &[u8], logical_len: usize) -> Result<()> {
        self.anchor.seek_header = self.write_blob(stored)?;
        self.anchor.nbytes_header = stored.len() as u32;
        self.anchor.len_header = logical_len as u32;
        Ok(())
    }

    /// Writes the stored footer envelope.
    pub fn write_footer(&mut self, stored: &[u8], logical_len: usize) -> Result<()> {
        self.anchor.seek_footer = self.write_blob(stored)?;
        self.anchor.nbytes_footer = stored.len() as u32;
        self.anchor.len_footer = logical_len as u32;
        Ok(())
    }

    /// Writes the anchor and makes the dataset visible.
    pub fn commit(&mut self) -> Result<()> {
        let anchor = self.anchor.to_bytes();
        self.write_blob(&anchor)?;
        match &mut self.target {
            Target::File {
                out,
                tmp_path,
                path,
            } => {
                out.flush()?;
                out.get_ref().sync_all()?;
                fs::rename(&*tmp_path, &*path)?;
                log::debug!("committed {} ({} bytes)", path.display(), self.offset);
            }
            Target::Memory { buffer, file } => {
                file.publish(std::mem::take(buffer));
            }
        }
        self.committed = true;
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Target::File { tmp_path, path, .. } = &self.target {
            log::warn!("abandoning uncommitted dataset {}", path.display());
            let _ = fs::remove_file(tmp_path);
        }
    }
}
