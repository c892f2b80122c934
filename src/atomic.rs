use std::fs::{self, File};
use std::io::{Result, Write};
use std::path::{Path, PathBuf};

/// Scratch file used to stage content before it is published. Dropped
/// without publishing, it removes itself.
pub struct TmpFile {
    file: File,
    path: PathBuf,
}

impl TmpFile {
    pub fn create_in(dir: impl AsRef<Path>) -> Result<Self> {
        let filename: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(10)
            .collect();
        let path = dir.as_ref().join(filename);
        let file = File::create(&path)?;
        Ok(Self { file, path })
    }

    /// Move the staged content to `dest`. The rename is atomic on the
    /// same filesystem, so a reader never observes a partial file.
    pub fn publish(self, dest: impl AsRef<Path>) -> Result<()> {
        self.file.sync_data()?;
        fs::rename(&self.path, dest)
    }
}

impl Write for &TmpFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (&self.file).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (&self.file).flush()
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Write `bytes` to `dest` through a staged temp file in the destination
/// directory, creating the directory if needed. A crash mid-write leaves
/// only the temp file behind, never a truncated `dest`.
pub fn write_atomic(dest: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let dest = dest.as_ref();
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let tmp = TmpFile::create_in(dir)?;
    (&tmp).write_all(bytes)?;
    (&tmp).flush()?;
    tmp.publish(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new("wiitag_atomic").unwrap();
        let dest = dir.path().join("nested").join("out.bin");

        write_atomic(&dest, b"payload").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");

        // No staging leftovers next to the destination.
        let others = fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(others, 1);
    }

    #[test]
    fn dropped_tmp_file_is_removed() {
        let dir = TempDir::new("wiitag_atomic").unwrap();
        {
            let tmp = TmpFile::create_in(dir.path()).unwrap();
            (&tmp).write_all(b"half-written").unwrap();
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn overwrite_replaces_content() {
        let dir = TempDir::new("wiitag_atomic").unwrap();
        let dest = dir.path().join("out.bin");
        write_atomic(&dest, b"first").unwrap();
        write_atomic(&dest, b"second").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"second");
    }
}
