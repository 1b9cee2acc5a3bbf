//! Advisory-lock scoped file access.
//!
//! Every simulator operation opens its backing file, takes a whole-file
//! advisory lock, does its work and releases the lock on drop. Lock-aware
//! processes (other simulator instances, the sensor feed) never observe a
//! half-written file.

use fs2::FileExt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

pub struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Block until a shared (reader) lock is held.
    pub fn shared(file: File) -> io::Result<Self> {
        FileExt::lock_shared(&file)?;
        Ok(Self { file })
    }

    /// Block until an exclusive (writer) lock is held.
    pub fn exclusive(file: File) -> io::Result<Self> {
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file })
    }

    pub fn read_all(&mut self) -> io::Result<String> {
        let mut text = String::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_string(&mut text)?;
        Ok(text)
    }

    /// Replace the whole file content while the lock is held.
    pub fn rewrite(&mut self, content: &str) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(content.as_bytes())?;
        self.file.flush()
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(error = %e, "Cannot release advisory lock");
        }
    }
}

/// Open `path` for reading and hold a shared lock on it.
pub fn open_shared(path: &Path) -> io::Result<LockedFile> {
    LockedFile::shared(File::open(path)?)
}

/// Open (creating if needed) `path` for read/write and hold an exclusive lock.
pub fn open_exclusive(path: &Path) -> io::Result<LockedFile> {
    let file = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    LockedFile::exclusive(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rewrite_replaces_longer_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("image");

        open_exclusive(&path)
            .unwrap()
            .rewrite("a much longer first line\n")
            .unwrap();
        open_exclusive(&path).unwrap().rewrite("short\n").unwrap();

        assert_eq!(open_shared(&path).unwrap().read_all().unwrap(), "short\n");
    }

    #[test]
    fn shared_open_of_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(open_shared(&dir.path().join("missing")).is_err());
    }
}
