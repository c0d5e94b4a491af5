use async_trait::async_trait;
use aws_sdk_s3::{config::Region, error::SdkError, Client as S3Client, Error as S3Error};
use tracing::error;

use crate::error::StoreError;
use crate::metric_consts::STORE_FETCH_TIME;

use super::ObjectStore;

// We wrap the s3 client to keep the backend surface down to the one operation
// the symbolication engine needs.
pub struct S3Store {
    inner: S3Client,
    bucket: String,
}

impl S3Store {
    pub fn new(inner: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            inner,
            bucket: bucket.into(),
        }
    }

    // Builds a client from ambient AWS configuration, optionally pinning the
    // region.
    pub async fn from_env(bucket: impl Into<String>, region: Option<String>) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = region.filter(|r| !r.is_empty()) {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self::new(S3Client::new(&config), bucket)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let start = common_metrics::timing_guard(STORE_FETCH_TIME, &[]);
        let key = key.trim_start_matches('/');
        let res = self
            .inner
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(res) => match res.body.collect().await {
                Ok(data) => {
                    start.label("outcome", "success").fin();
                    Ok(data.to_vec())
                }
                Err(e) => {
                    start.label("outcome", "failure").fin();
                    Err(StoreError::Transport(e.to_string()))
                }
            },
            Err(SdkError::ServiceError(err)) if err.err().is_no_such_key() => {
                start.label("outcome", "not_found").fin();
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => {
                start.label("outcome", "failure").fin();
                error!("Failed to fetch object {} from S3: {:?}", key, err);
                Err(StoreError::Transport(S3Error::from(err).to_string()))
            }
        }
    }
}
