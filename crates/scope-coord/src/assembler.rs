use tracing::{debug, warn};

use scope_core::error::{Error, Result};
use scope_core::traits::RowSource;
use scope_core::types::{DatasetMetadata, EnrichedRow, NeighborRecord, RowIndex, SortKey};

/// Fetches enriched rows for NN indices and merges them into ranked neighbors.
pub struct ResultAssembler<S> {
    source: S,
    sort_key: SortKey,
}

impl<S: RowSource> ResultAssembler<S> {
    pub fn new(source: S) -> Self { Self { source, sort_key: SortKey::default() } }

    pub fn with_sort_key(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    pub fn sort_key(&self) -> SortKey { self.sort_key }

    pub async fn assemble(
        &self,
        dataset_id: &str,
        indices: &[RowIndex],
        distances: &[f64],
        metadata: &DatasetMetadata,
    ) -> Result<Vec<NeighborRecord>> {
        if indices.len() != distances.len() {
            return Err(Error::MalformedResponse(format!(
                "{} indices but {} distances",
                indices.len(),
                distances.len()
            )));
        }
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.source.rows(dataset_id, indices).await.map_err(|e| {
            warn!(dataset = dataset_id, "row enrichment failed: {e}");
            e
        })?;
        if rows.len() != indices.len() {
            return Err(Error::MalformedResponse(format!(
                "requested {} rows, received {}",
                indices.len(),
                rows.len()
            )));
        }
        let records = merge_rows(&rows, distances, &metadata.text_column, self.sort_key)?;
        debug!(dataset = dataset_id, count = records.len(), "neighbors assembled");
        Ok(records)
    }
}

/// Pair `rows[i]` with `distances[i]`, then stable-sort by `sort_key`.
/// Positions are paired before sorting so each distance stays with its row.
pub fn merge_rows(
    rows: &[EnrichedRow],
    distances: &[f64],
    text_column: &str,
    sort_key: SortKey,
) -> Result<Vec<NeighborRecord>> {
    if rows.len() != distances.len() {
        return Err(Error::MalformedResponse(format!(
            "{} rows but {} distances",
            rows.len(),
            distances.len()
        )));
    }
    let mut records = rows
        .iter()
        .zip(distances)
        .enumerate()
        .map(|(i, (row, &distance))| {
            let text = row.text(text_column).map_err(|e| at_position(i, e))?;
            let score = row.score().map_err(|e| at_position(i, e))?;
            Ok(NeighborRecord { text, score, distance })
        })
        .collect::<Result<Vec<_>>>()?;
    records.sort_by(|a, b| sort_key.compare(a, b));
    Ok(records)
}

fn at_position(i: usize, e: Error) -> Error {
    match e {
        Error::MalformedResponse(msg) => Error::MalformedResponse(format!("row {i}: {msg}")),
        other => other,
    }
}
