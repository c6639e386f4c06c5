use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use scope_core::config::{Settings, StageTimeouts};
use scope_core::error::{Error, Result};
use scope_core::traits::{MetadataSource, NeighborSource, RowSource};
use scope_core::types::{DatasetMetadata, EnrichedRow, RowIndex, SearchResult, StageKind};

use crate::retry::{with_retry, RetryPolicy};
use crate::urls;

/// Client for both external services.
///
/// `reqwest::Client` pools connections internally, so clones share one pool.
#[derive(Debug, Clone)]
pub struct HttpServices {
    http: reqwest::Client,
    metadata_base: Url,
    search_base: Url,
    timeouts: StageTimeouts,
    retry: RetryPolicy,
}

impl HttpServices {
    pub fn new(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("scope-http/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            metadata_base: settings.services.metadata_url()?,
            search_base: settings.services.search_url()?,
            timeouts: settings.timeouts.clone(),
            retry: RetryPolicy::from(&settings.retry),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, stage: StageKind) -> Result<T> {
        let what = format!("{stage} request");
        let body = with_retry(&self.retry, &what, || self.get_once(&url, stage)).await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::MalformedResponse(format!("{stage} response from {url}: {e}")))
    }

    async fn get_once(&self, url: &Url, stage: StageKind) -> Result<Vec<u8>> {
        let timeout = self.timeouts.for_stage(stage);
        let response = self
            .http
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(url, &e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(url.path().to_string()));
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::REQUEST_TIMEOUT {
            return Err(Error::Network(format!("{url} returned HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::MalformedResponse(format!("{url} rejected the request: HTTP {status} {body}")));
        }

        let bytes = response.bytes().await.map_err(|e| transport_error(url, &e))?;
        Ok(bytes.to_vec())
    }
}

fn transport_error(url: &Url, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network(format!("request to {url} timed out"))
    } else {
        Error::Network(format!("request to {url} failed: {e}"))
    }
}

#[async_trait(?Send)]
impl MetadataSource for HttpServices {
    async fn fetch_metadata(&self, dataset_id: &str) -> Result<DatasetMetadata> {
        let url = urls::metadata_url(&self.metadata_base, dataset_id)?;
        debug!(%url, "fetching dataset metadata");
        let meta: serde_json::Value = match self.get_json(url, StageKind::Metadata).await {
            Err(Error::NotFound(_)) => return Err(Error::NotFound(format!("dataset '{dataset_id}'"))),
            other => other?,
        };
        DatasetMetadata::from_meta(dataset_id, meta)
    }
}

#[async_trait(?Send)]
impl NeighborSource for HttpServices {
    async fn nearest(&self, dataset_id: &str, query: &str) -> Result<SearchResult> {
        let url = urls::nn_url(&self.search_base, dataset_id, query)?;
        debug!(%url, "querying nearest neighbors");
        self.get_json(url, StageKind::Search).await
    }
}

#[async_trait(?Send)]
impl RowSource for HttpServices {
    async fn rows(&self, dataset_id: &str, indices: &[RowIndex]) -> Result<Vec<EnrichedRow>> {
        let url = urls::indexed_url(&self.search_base, dataset_id, indices)?;
        debug!(%url, count = indices.len(), "fetching enriched rows");
        self.get_json(url, StageKind::Assembly).await
    }
}
