use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::metric_consts::STORE_FETCH_TIME;

use super::ObjectStore;

// Reads artifacts straight off the local filesystem, rooted at a directory.
// Mostly useful for dev setups and tests, but it's a real backend.
pub struct LocalStore {
    directory: PathBuf,
}

impl LocalStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let start = common_metrics::timing_guard(STORE_FETCH_TIME, &[]);
        let path = self.directory.join(key.trim_start_matches('/'));
        match tokio::fs::read(&path).await {
            Ok(data) => {
                start.label("outcome", "success").fin();
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                start.label("outcome", "not_found").fin();
                Err(StoreError::NotFound(path.display().to_string()))
            }
            Err(e) => {
                start.label("outcome", "failure").fin();
                Err(StoreError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn missing_files_are_not_found_not_io_errors() {
        let store = LocalStore::new("tests/static");
        let err = store.fetch("does-not-exist.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
