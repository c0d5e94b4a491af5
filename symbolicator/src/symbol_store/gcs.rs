use async_trait::async_trait;
use google_cloud_storage::client::{Client, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::Error as GcsError;
use tracing::error;

use crate::error::StoreError;
use crate::metric_consts::STORE_FETCH_TIME;

use super::ObjectStore;

pub struct GcsStore {
    inner: Client,
    bucket: String,
}

impl GcsStore {
    pub fn new(inner: Client, bucket: impl Into<String>) -> Self {
        Self {
            inner,
            bucket: bucket.into(),
        }
    }

    // Builds a client from ambient GCP credentials.
    pub async fn from_env(bucket: impl Into<String>) -> Result<Self, StoreError> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self::new(Client::new(config), bucket))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let start = common_metrics::timing_guard(STORE_FETCH_TIME, &[]);
        let object = key.trim_start_matches('/').to_string();
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            object: object.clone(),
            ..Default::default()
        };

        match self.inner.download_object(&request, &Range::default()).await {
            Ok(data) => {
                start.label("outcome", "success").fin();
                Ok(data)
            }
            Err(GcsError::Response(res)) if res.code == 404 => {
                start.label("outcome", "not_found").fin();
                Err(StoreError::NotFound(object))
            }
            Err(err) => {
                start.label("outcome", "failure").fin();
                error!("Failed to fetch object {} from GCS: {:?}", object, err);
                Err(StoreError::Transport(err.to_string()))
            }
        }
    }
}
