//! Persistence of accepted uploads.
//!
//! Files only get here after the upload policy has passed on the bytes
//! actually received. They are stored under a generated name so that the
//! client-chosen name never reaches the filesystem.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::security::upload::extension_of;

/// Where a stored upload ended up.
#[derive(Debug, Clone, Serialize)]
pub struct StoredUpload {
    /// Generated file name inside the storage directory.
    pub file: String,
    /// Name the client declared.
    pub original_name: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> io::Result<StoredUpload> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file = match extension_of(original_name) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };
        tokio::fs::write(self.dir.join(&file), bytes).await?;

        tracing::info!(file = %file, size = bytes.len(), "Stored upload");
        Ok(StoredUpload {
            file,
            original_name: original_name.to_string(),
            size: bytes.len() as u64,
        })
    }
}
