use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tracing::debug;
use uuid::Uuid;

use crate::store::StoreError;

/// Accepts an image and hands back a stable reference to it. The bytes are
/// never inspected.
pub trait BlobStore {
    fn put(&mut self, bytes: &[u8], extension: &str) -> Result<String, StoreError>;

    /// Deletes a blob handed out by `put`. Returns `false` when this store
    /// does not hold it.
    fn remove(&mut self, reference: &str) -> Result<bool, StoreError>;
}

pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl BlobStore for FileBlobStore {
    fn put(&mut self, bytes: &[u8], extension: &str) -> Result<String, StoreError> {
        let extension: String = extension
            .trim_start_matches('.')
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        let name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4(), extension.to_ascii_lowercase())
        };

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(name);
        fs::write(&path, bytes)?;

        debug!(path = %path.display(), size = bytes.len(), "blob stored");

        Ok(path.to_string_lossy().into_owned())
    }

    fn remove(&mut self, reference: &str) -> Result<bool, StoreError> {
        let path = Path::new(reference);

        if path.parent() != Some(self.dir.as_path()) {
            debug!(reference, "not a blob of this store");
            return Ok(false);
        }

        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "blob removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
