// Filesystem result store
// Writes pretty JSON via a uniquely named temp file + rename so readers never
// see a partial file and concurrent saves of one name never share a temp file.
use async_trait::async_trait;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use whiterabbit_core::port::{ResultStore, StoreError};

/// Write-through store for persisted tool results
#[derive(Debug, Default, Clone, Copy)]
pub struct FsResultStore;

impl FsResultStore {
    pub fn new() -> Self {
        Self
    }
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Temp file in the target folder, renamed over the target
fn write_atomic(dir: &Path, path: &Path, body: &[u8]) -> Result<(), StoreError> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".whiterabbit-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| io_error(dir, e))?;
    tmp.write_all(body).map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn save(&self, dir: &Path, file_name: &str, result: &Value) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_error(dir, e))?;

        let body = serde_json::to_vec_pretty(result)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let bytes = body.len();
        let path = dir.join(file_name);
        let (folder, target) = (dir.to_path_buf(), path.clone());
        tokio::task::spawn_blocking(move || write_atomic(&folder, &target, &body))
            .await
            .map_err(|e| StoreError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })??;

        debug!(path = %path.display(), bytes, "Result written");
        Ok(path)
    }
}
