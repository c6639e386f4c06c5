//! Domain types passed between the metadata, search and assembly stages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

pub type DatasetId = String;
pub type RowIndex = u64;

/// Entry of the meta document that describes the dataset's embeddings.
pub const EMBEDDINGS_ENTRY: &str = "embeddings.json";

/// The three network stages. Each one owns an independent generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Metadata,
    Search,
    Assembly,
}

impl StageKind {
    pub const ALL: [StageKind; 3] = [StageKind::Metadata, StageKind::Search, StageKind::Assembly];

    pub fn slot(self) -> usize {
        match self {
            StageKind::Metadata => 0,
            StageKind::Search => 1,
            StageKind::Assembly => 2,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Metadata => "metadata",
            StageKind::Search => "search",
            StageKind::Assembly => "assembly",
        };
        f.write_str(name)
    }
}

#[derive(Deserialize)]
struct EmbeddingsEntry {
    shape: Vec<u64>,
    model: String,
    text_column: String,
}

/// Metadata of one dataset, built from its `/meta` document.
///
/// - `row_count`/`dim_count`: the embedding matrix shape
/// - `model`: name of the model that produced the embeddings
/// - `text_column`: row field shown as the neighbor's text
/// - `files`: the whole meta document keyed by filename, for consumers that
///   need entries other than the embeddings one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub id: DatasetId,
    pub row_count: u64,
    pub dim_count: u64,
    pub model: String,
    pub text_column: String,
    pub files: BTreeMap<String, Value>,
}

impl DatasetMetadata {
    pub fn from_meta(id: &str, meta: Value) -> Result<Self> {
        let Value::Object(files) = meta else {
            return Err(Error::MalformedResponse(format!("meta for '{id}' is not a JSON object")));
        };
        let entry = files.get(EMBEDDINGS_ENTRY).ok_or_else(|| {
            Error::MalformedResponse(format!("meta for '{id}' has no '{EMBEDDINGS_ENTRY}' entry"))
        })?;
        let parsed: EmbeddingsEntry = serde_json::from_value(entry.clone())
            .map_err(|e| Error::MalformedResponse(format!("'{EMBEDDINGS_ENTRY}' for '{id}': {e}")))?;
        let (row_count, dim_count) = match parsed.shape.as_slice() {
            [rows, dims] => (*rows, *dims),
            other => {
                return Err(Error::MalformedResponse(format!(
                    "'{EMBEDDINGS_ENTRY}' for '{id}': shape must be [rows, dims], got {other:?}"
                )))
            }
        };
        Ok(Self {
            id: id.to_string(),
            row_count,
            dim_count,
            model: parsed.model,
            text_column: parsed.text_column,
            files: files.into_iter().collect(),
        })
    }
}

#[derive(Deserialize)]
struct RawSearchResult {
    distances: Vec<f64>,
    indices: Vec<RowIndex>,
}

impl TryFrom<RawSearchResult> for SearchResult {
    type Error = Error;

    fn try_from(raw: RawSearchResult) -> Result<Self> {
        SearchResult::new(raw.distances, raw.indices)
    }
}

/// Positionally paired NN output: `distances[i]` belongs to `indices[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSearchResult")]
pub struct SearchResult {
    distances: Vec<f64>,
    indices: Vec<RowIndex>,
}

impl SearchResult {
    pub fn new(distances: Vec<f64>, indices: Vec<RowIndex>) -> Result<Self> {
        if distances.len() != indices.len() {
            return Err(Error::MalformedResponse(format!(
                "{} distances but {} indices",
                distances.len(),
                indices.len()
            )));
        }
        Ok(Self { distances, indices })
    }

    pub fn distances(&self) -> &[f64] { &self.distances }

    pub fn indices(&self) -> &[RowIndex] { &self.indices }

    pub fn len(&self) -> usize { self.indices.len() }

    pub fn is_empty(&self) -> bool { self.indices.is_empty() }
}

/// A raw row returned by the enrichment service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichedRow(Map<String, Value>);

impl EnrichedRow {
    pub fn new(fields: Map<String, Value>) -> Self { Self(fields) }

    pub fn get(&self, field: &str) -> Option<&Value> { self.0.get(field) }

    pub fn score(&self) -> Result<f64> {
        match self.0.get("score") {
            Some(value) => value
                .as_f64()
                .ok_or_else(|| Error::MalformedResponse(format!("row field 'score' is not numeric: {value}"))),
            None => Err(Error::MalformedResponse("row is missing 'score'".to_string())),
        }
    }

    /// Strings are taken as-is; other scalars keep their JSON rendering.
    pub fn text(&self, column: &str) -> Result<String> {
        match self.0.get(column) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Null) | None => {
                Err(Error::MalformedResponse(format!("row is missing text column '{column}'")))
            }
            Some(other) => Ok(other.to_string()),
        }
    }
}

impl From<Map<String, Value>> for EnrichedRow {
    fn from(fields: Map<String, Value>) -> Self { Self(fields) }
}

/// One displayed neighbor. `score` comes from the enrichment service and
/// `distance` from the NN service; they are never interchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborRecord {
    pub text: String,
    pub score: f64,
    pub distance: f64,
}

/// Ordering applied to assembled neighbors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Highest score first.
    #[default]
    Score,
    /// Nearest first.
    Distance,
}

impl SortKey {
    pub fn compare(self, a: &NeighborRecord, b: &NeighborRecord) -> Ordering {
        match self {
            SortKey::Score => b.score.total_cmp(&a.score),
            SortKey::Distance => a.distance.total_cmp(&b.distance),
        }
    }
}
