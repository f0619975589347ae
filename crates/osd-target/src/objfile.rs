// Path: crates/osd-target/src/objfile.rs

//! One data file per user object, spread over 256 subdirectories by the low
//! byte of the object id: `<root>/<oid & 0xff>/<pid>.<oid>`, all in hex.

use osd_types::OsdError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Result of a data read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes actually copied.
    pub read: usize,
    /// The request reached past the end of the object.
    pub past_end: bool,
}

#[derive(Debug, Clone)]
pub struct ObjectFiles {
    root: PathBuf,
}

impl ObjectFiles {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, OsdError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, pid: u64, oid: u64) -> PathBuf {
        self.root
            .join(format!("{:02x}", oid & 0xff))
            .join(format!("{pid:x}.{oid:x}"))
    }

    fn open_rw(&self, pid: u64, oid: u64) -> Result<File, OsdError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.path(pid, oid))
            .map_err(|e| OsdError::Io(format!("object {pid:#x}/{oid:#x}: {e}")))
    }

    /// Creates an empty data file; an existing one is an error.
    pub fn create(&self, pid: u64, oid: u64) -> Result<(), OsdError> {
        let path = self.path(pid, oid);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| OsdError::Io(format!("create {}: {e}", path.display())))?;
        Ok(())
    }

    /// Removes a data file. A file that is already gone is not an error.
    pub fn remove(&self, pid: u64, oid: u64) -> Result<(), OsdError> {
        match std::fs::remove_file(self.path(pid, oid)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Removes every data file.
    pub fn remove_all(&self) -> Result<(), OsdError> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn len(&self, pid: u64, oid: u64) -> Result<u64, OsdError> {
        Ok(std::fs::metadata(self.path(pid, oid))?.len())
    }

    /// Reads `buf.len()` bytes from `offset`. A short read zero-fills the
    /// rest of `buf` and reports `past_end`.
    pub fn read(
        &self,
        pid: u64,
        oid: u64,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<ReadOutcome, OsdError> {
        let mut f = self.open_rw(pid, oid)?;
        f.seek(SeekFrom::Start(offset))?;
        let mut read = 0;
        while read < buf.len() {
            let dst = buf.get_mut(read..).unwrap_or_default();
            match f.read(dst)? {
                0 => break,
                n => read += n,
            }
        }
        buf.get_mut(read..).unwrap_or_default().fill(0);
        Ok(ReadOutcome {
            read,
            past_end: read < buf.len(),
        })
    }

    pub fn write(&self, pid: u64, oid: u64, data: &[u8], offset: u64) -> Result<(), OsdError> {
        let mut f = self.open_rw(pid, oid)?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)?;
        Ok(())
    }

    /// Appends `data` and returns the offset it was written at.
    pub fn append(&self, pid: u64, oid: u64, data: &[u8]) -> Result<u64, OsdError> {
        let mut f = self.open_rw(pid, oid)?;
        let at = f.seek(SeekFrom::End(0))?;
        f.write_all(data)?;
        Ok(at)
    }

    /// Zeroes `[offset, offset + len)` clipped to the current length.
    pub fn clear(&self, pid: u64, oid: u64, offset: u64, len: u64) -> Result<(), OsdError> {
        let mut f = self.open_rw(pid, oid)?;
        let size = f.metadata()?.len();
        let end = offset.saturating_add(len).min(size);
        if offset >= end {
            return Ok(());
        }
        zero_range(&mut f, offset, end)
    }

    /// Like [`clear`](Self::clear), but a range reaching the end of the
    /// object truncates it instead.
    pub fn punch(&self, pid: u64, oid: u64, offset: u64, len: u64) -> Result<(), OsdError> {
        let mut f = self.open_rw(pid, oid)?;
        let size = f.metadata()?.len();
        let end = offset.saturating_add(len);
        if offset >= size {
            return Ok(());
        }
        if end >= size {
            f.set_len(offset)?;
            return Ok(());
        }
        zero_range(&mut f, offset, end)
    }

    pub fn sync(&self, pid: u64, oid: u64) -> Result<(), OsdError> {
        self.open_rw(pid, oid)?.sync_all()?;
        Ok(())
    }
}

fn zero_range(f: &mut File, start: u64, end: u64) -> Result<(), OsdError> {
    const CHUNK: usize = 64 * 1024;
    let zeros = [0u8; CHUNK];
    f.seek(SeekFrom::Start(start))?;
    let mut left = end - start;
    while left > 0 {
        let n = left.min(CHUNK as u64) as usize;
        f.write_all(zeros.get(..n).unwrap_or_default())?;
        left -= n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> (tempfile::TempDir, ObjectFiles) {
        let dir = tempfile::tempdir().unwrap();
        let files = ObjectFiles::open(dir.path().join("dfiles")).unwrap();
        (dir, files)
    }

    #[test]
    fn layout_uses_low_oid_byte() {
        let (_d, f) = files();
        let p = f.path(0x10000, 0x10203);
        assert!(p.ends_with("03/10000.10203"));
    }

    #[test]
    fn create_is_exclusive_and_remove_is_idempotent() {
        let (_d, f) = files();
        f.create(1, 2).unwrap();
        assert!(f.create(1, 2).is_err());
        f.remove(1, 2).unwrap();
        f.remove(1, 2).unwrap();
    }

    #[test]
    fn short_read_reports_past_end() {
        let (_d, f) = files();
        f.create(1, 2).unwrap();
        f.write(1, 2, b"hello world", 0).unwrap();
        let mut buf = [0xAAu8; 8];
        let r = f.read(1, 2, &mut buf, 6).unwrap();
        assert_eq!(r, ReadOutcome { read: 5, past_end: true });
        assert_eq!(&buf, b"world\0\0\0");
        let mut buf = [0u8; 5];
        assert!(!f.read(1, 2, &mut buf, 0).unwrap().past_end);
    }

    #[test]
    fn append_returns_start_offset() {
        let (_d, f) = files();
        f.create(1, 2).unwrap();
        assert_eq!(f.append(1, 2, b"abc").unwrap(), 0);
        assert_eq!(f.append(1, 2, b"de").unwrap(), 3);
        assert_eq!(f.len(1, 2).unwrap(), 5);
    }

    #[test]
    fn clear_and_punch() {
        let (_d, f) = files();
        f.create(1, 2).unwrap();
        f.write(1, 2, b"abcdefgh", 0).unwrap();
        f.clear(1, 2, 2, 100).unwrap();
        assert_eq!(f.len(1, 2).unwrap(), 8);
        let mut buf = [0u8; 8];
        f.read(1, 2, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"ab\0\0\0\0\0\0");

        f.write(1, 2, b"abcdefgh", 0).unwrap();
        f.punch(1, 2, 1, 2).unwrap();
        assert_eq!(f.len(1, 2).unwrap(), 8);
        f.punch(1, 2, 4, 10).unwrap();
        assert_eq!(f.len(1, 2).unwrap(), 4);
        let mut buf = [0u8; 4];
        f.read(1, 2, &mut buf, 0).unwrap();
        assert_eq!(&buf, b"a\0\0d");
    }

    #[test]
    fn remove_all_empties_the_tree() {
        let (_d, f) = files();
        f.create(1, 2).unwrap();
        f.create(1, 0x103).unwrap();
        f.remove_all().unwrap();
        assert!(f.len(1, 2).is_err());
        f.create(1, 2).unwrap();
    }
}
