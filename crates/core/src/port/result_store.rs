// Result Store Port
// Write-through persistence of parsed results to a caller-chosen folder

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("IO error writing {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result Store trait
///
/// Failures are reported to the caller, which degrades them to a warning.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write `result` as `dir/file_name`, creating `dir` if needed.
    /// Returns the written path.
    async fn save(&self, dir: &Path, file_name: &str, result: &Value) -> Result<PathBuf, StoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory store recording every save
    #[derive(Clone, Default)]
    pub struct MemoryResultStore {
        saved: Arc<Mutex<Vec<(PathBuf, Value)>>>,
    }

    impl MemoryResultStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn saved(&self) -> Vec<(PathBuf, Value)> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResultStore for MemoryResultStore {
        async fn save(&self, dir: &Path, file_name: &str, result: &Value) -> Result<PathBuf, StoreError> {
            let path = dir.join(file_name);
            self.saved.lock().unwrap().push((path.clone(), result.clone()));
            Ok(path)
        }
    }

    /// Store that always fails (write-through degradation tests)
    pub struct FailingResultStore;

    #[async_trait]
    impl ResultStore for FailingResultStore {
        async fn save(&self, dir: &Path, file_name: &str, _result: &Value) -> Result<PathBuf, StoreError> {
            Err(StoreError::Io {
                path: dir.join(file_name).display().to_string(),
                reason: "read-only file system".to_string(),
            })
        }
    }
}
