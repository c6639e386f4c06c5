use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DatasetMetadata, EnrichedRow, RowIndex, SearchResult};

// Futures are driven from a single event loop, so none of these need `Send`.

#[async_trait(?Send)]
pub trait MetadataSource {
    async fn fetch_metadata(&self, dataset_id: &str) -> Result<DatasetMetadata>;
}

#[async_trait(?Send)]
pub trait NeighborSource {
    async fn nearest(&self, dataset_id: &str, query: &str) -> Result<SearchResult>;
}

#[async_trait(?Send)]
pub trait RowSource {
    /// Must return one row per index, in request order.
    async fn rows(&self, dataset_id: &str, indices: &[RowIndex]) -> Result<Vec<EnrichedRow>>;
}
