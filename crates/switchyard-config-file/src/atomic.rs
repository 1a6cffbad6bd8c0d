//! Atomic file replacement

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use switchyard_core::Result;

/// Writes to a temporary sibling and renames it over the target on commit
pub(crate) struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: File,
}

impl AtomicWriter {
    pub(crate) fn new(path: &Path) -> Result<Self> {
        let final_path = path.to_path_buf();

        if let Some(parent) = final_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path)?;

        Ok(Self {
            temp_path,
            final_path,
            file,
        })
    }

    pub(crate) fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        Ok(())
    }

    /// Flush to disk and move the temporary file into place
    pub(crate) fn commit(mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;

        let temp_path = std::mem::take(&mut self.temp_path);
        fs::rename(&temp_path, &self.final_path)?;
        Ok(())
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        // Empty after a successful commit
        if !self.temp_path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_commit_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "old").unwrap();

        let mut writer = AtomicWriter::new(&path).unwrap();
        writer.write(b"new").unwrap();
        writer.commit().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!dir.path().join("config.yaml.tmp").exists());
    }

    #[test]
    fn test_drop_without_commit_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "old").unwrap();

        {
            let mut writer = AtomicWriter::new(&path).unwrap();
            writer.write(b"half written").unwrap();
        }

        assert_eq!(fs::read_to_string(&path).unwrap(), "old");
        assert!(!dir.path().join("config.yaml.tmp").exists());
    }

    #[test]
    fn test_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.json");

        let mut writer = AtomicWriter::new(&path).unwrap();
        writer.write(b"{}").unwrap();
        writer.commit().unwrap();

        assert!(path.exists());
    }
}
