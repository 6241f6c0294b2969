//! File-backed persistent blob for batch progress.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ffj_traits::{BoxError, NvStore};

use crate::error::HwError;
use crate::util::write_atomic;

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NvStore for FileStore {
    fn load(&mut self) -> Result<Option<Vec<u8>>, BoxError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }

    fn store(&mut self, bytes: &[u8]) -> Result<(), BoxError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(HwError::Io)?;
        }
        write_atomic(&self.path, bytes).map_err(HwError::Io)?;
        tracing::debug!(path = %self.path.display(), len = bytes.len(), "progress stored");
        Ok(())
    }
}
