use tracing::{info, warn};

use scope_core::error::{Error, Result};
use scope_core::traits::MetadataSource;
use scope_core::types::DatasetMetadata;

/// Loads the metadata of one dataset from a [`MetadataSource`].
pub struct MetadataLoader<S> {
    source: S,
}

impl<S: MetadataSource> MetadataLoader<S> {
    pub fn new(source: S) -> Self { Self { source } }

    pub async fn load(&self, dataset_id: &str) -> Result<DatasetMetadata> {
        if dataset_id.trim().is_empty() {
            return Err(Error::NotFound("empty dataset id".to_string()));
        }
        match self.source.fetch_metadata(dataset_id).await {
            Ok(meta) => {
                info!(dataset = dataset_id, rows = meta.row_count, dims = meta.dim_count, model = %meta.model, "metadata loaded");
                Ok(meta)
            }
            Err(e) => {
                warn!(dataset = dataset_id, "metadata load failed: {e}");
                Err(e)
            }
        }
    }
}
