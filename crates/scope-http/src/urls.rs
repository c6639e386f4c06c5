//! Endpoint URL construction. Bases may carry a path prefix; dataset ids are
//! encoded as a single path segment and query values are form-encoded.
use url::Url;

use scope_core::error::{Error, Result};
use scope_core::types::RowIndex;

pub fn metadata_url(base: &Url, dataset_id: &str) -> Result<Url> {
    with_segments(base, &["api", "datasets", dataset_id, "meta"])
}

pub fn nn_url(base: &Url, dataset_id: &str, query: &str) -> Result<Url> {
    let mut url = with_segments(base, &["nn"])?;
    url.query_pairs_mut()
        .append_pair("dataset", dataset_id)
        .append_pair("query", query);
    Ok(url)
}

pub fn indexed_url(base: &Url, dataset_id: &str, indices: &[RowIndex]) -> Result<Url> {
    let encoded = serde_json::to_string(indices)
        .map_err(|e| Error::MalformedResponse(format!("cannot encode indices: {e}")))?;
    let mut url = with_segments(base, &["indexed"])?;
    url.query_pairs_mut()
        .append_pair("dataset", dataset_id)
        .append_pair("indices", &encoded);
    Ok(url)
}

fn with_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| Error::InvalidConfig(format!("'{base}' cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
