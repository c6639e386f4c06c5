use tracing::{info, warn};

use scope_core::error::Result;
use scope_core::traits::NeighborSource;
use scope_core::types::SearchResult;

/// Issues free-text nearest-neighbor queries. The query text is forwarded
/// untouched, including the empty string.
pub struct SearchCoordinator<S> {
    source: S,
}

impl<S: NeighborSource> SearchCoordinator<S> {
    pub fn new(source: S) -> Self { Self { source } }

    pub async fn search(&self, dataset_id: &str, query: &str) -> Result<SearchResult> {
        match self.source.nearest(dataset_id, query).await {
            Ok(result) => {
                info!(dataset = dataset_id, hits = result.len(), "search resolved");
                Ok(result)
            }
            Err(e) => {
                warn!(dataset = dataset_id, "search failed: {e}");
                Err(e)
            }
        }
    }
}
