//! The single source of truth for one dataset view.
//!
//! `CoordinationState` performs no I/O. Its transitions hand back at most one
//! [`Command`] for the owner to run, and the owner feeds the outcome back as
//! an [`Event`]. Every command carries the generation it was issued under;
//! an event whose generation is no longer live is rejected as
//! [`Error::Stale`] and leaves the state untouched.

use serde::Serialize;
use tracing::{debug, info, warn};

use scope_core::error::{Error, Result};
use scope_core::types::{DatasetId, DatasetMetadata, NeighborRecord, SearchResult, StageKind};

use crate::generation::{Generations, Ticket};

/// Derived display phase, in precedence order
/// `Error > MetadataLoading > Searching > Assembling > Displayed > Ready > Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "stage", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    MetadataLoading,
    Ready,
    Searching,
    Assembling,
    Displayed,
    Error(StageKind),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadMetadata { generation: u64, dataset_id: DatasetId },
    Search { generation: u64, dataset_id: DatasetId, query: String },
    Assemble { generation: u64, dataset_id: DatasetId, search: SearchResult, metadata: DatasetMetadata },
}

impl Command {
    pub fn ticket(&self) -> Ticket {
        match self {
            Command::LoadMetadata { generation, .. } => Ticket { stage: StageKind::Metadata, generation: *generation },
            Command::Search { generation, .. } => Ticket { stage: StageKind::Search, generation: *generation },
            Command::Assemble { generation, .. } => Ticket { stage: StageKind::Assembly, generation: *generation },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MetadataLoaded { generation: u64, result: Result<DatasetMetadata> },
    SearchResolved { generation: u64, result: Result<SearchResult> },
    RowsResolved { generation: u64, result: Result<Vec<NeighborRecord>> },
}

impl Event {
    pub fn stage(&self) -> StageKind {
        match self {
            Event::MetadataLoaded { .. } => StageKind::Metadata,
            Event::SearchResolved { .. } => StageKind::Search,
            Event::RowsResolved { .. } => StageKind::Assembly,
        }
    }

    pub fn ticket(&self) -> Ticket {
        let generation = match self {
            Event::MetadataLoaded { generation, .. }
            | Event::SearchResolved { generation, .. }
            | Event::RowsResolved { generation, .. } => *generation,
        };
        Ticket { stage: self.stage(), generation }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetSummary {
    pub rows: u64,
    pub dims: u64,
    pub model: String,
}

/// What collaborators (result table, summary header) render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct View {
    pub dataset_id: Option<DatasetId>,
    pub summary: Option<DatasetSummary>,
    pub phase: Phase,
    pub neighbors: Vec<NeighborRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Default)]
pub struct CoordinationState {
    dataset_id: Option<DatasetId>,
    metadata: Option<DatasetMetadata>,
    query: Option<String>,
    search: Option<SearchResult>,
    neighbors: Vec<NeighborRecord>,
    // neighbors were assembled from the current search
    displayed: bool,
    // a search resolved before metadata; assemble once it lands
    awaiting_metadata: bool,
    errors: [Option<Error>; 3],
    generations: Generations,
}

impl CoordinationState {
    pub fn new() -> Self { Self::default() }

    /// Select (or re-select) a dataset and request its metadata.
    ///
    /// Switching to a different id drops everything tied to the previous one
    /// and supersedes its in-flight search and assembly. Re-selecting the same
    /// id is a metadata retry and keeps what is already shown.
    pub fn select_dataset(&mut self, dataset_id: &str) -> Command {
        if self.dataset_id.as_deref() != Some(dataset_id) {
            self.generations.invalidate(StageKind::Search);
            self.generations.invalidate(StageKind::Assembly);
            self.metadata = None;
            self.query = None;
            self.search = None;
            self.neighbors.clear();
            self.displayed = false;
            self.awaiting_metadata = false;
            self.errors = Default::default();
            self.dataset_id = Some(dataset_id.to_string());
        } else {
            self.clear_error(StageKind::Metadata);
        }
        let ticket = self.generations.issue(StageKind::Metadata);
        debug!(dataset = dataset_id, generation = ticket.generation, "metadata load issued");
        Command::LoadMetadata { generation: ticket.generation, dataset_id: dataset_id.to_string() }
    }

    /// Submit a query for the selected dataset. Returns `None` when no dataset
    /// is selected. Neighbors already shown stay until replaced.
    pub fn submit_query(&mut self, query: &str) -> Option<Command> {
        let Some(dataset_id) = self.dataset_id.clone() else {
            warn!("query submitted with no dataset selected");
            return None;
        };
        self.generations.invalidate(StageKind::Assembly);
        self.awaiting_metadata = false;
        self.clear_error(StageKind::Search);
        self.clear_error(StageKind::Assembly);
        self.query = Some(query.to_string());
        let ticket = self.generations.issue(StageKind::Search);
        debug!(dataset = %dataset_id, generation = ticket.generation, "search issued");
        Some(Command::Search { generation: ticket.generation, dataset_id, query: query.to_string() })
    }

    /// Re-run one stage with the current inputs.
    pub fn retry(&mut self, stage: StageKind) -> Option<Command> {
        match stage {
            StageKind::Metadata => {
                let dataset_id = self.dataset_id.clone()?;
                Some(self.select_dataset(&dataset_id))
            }
            StageKind::Search => {
                let query = self.query.clone()?;
                self.submit_query(&query)
            }
            StageKind::Assembly => {
                self.clear_error(StageKind::Assembly);
                self.schedule_assembly()
            }
        }
    }

    /// Incorporate a completed command. Superseded events return `Err(Stale)`.
    pub fn apply(&mut self, event: Event) -> Result<Option<Command>> {
        if let Err(stale) = self.generations.resolve(event.ticket()) {
            debug!("discarding {stale}");
            return Err(stale);
        }
        match event {
            Event::MetadataLoaded { result: Ok(metadata), .. } => {
                info!(dataset = %metadata.id, "metadata applied");
                self.metadata = Some(metadata);
                self.clear_error(StageKind::Metadata);
                Ok(self.schedule_assembly())
            }
            Event::SearchResolved { result: Ok(search), .. } => {
                info!(hits = search.len(), "search applied");
                self.search = Some(search);
                self.displayed = false;
                self.clear_error(StageKind::Search);
                Ok(self.schedule_assembly())
            }
            Event::RowsResolved { result: Ok(neighbors), .. } => {
                info!(count = neighbors.len(), "neighbors applied");
                self.neighbors = neighbors;
                self.displayed = true;
                self.clear_error(StageKind::Assembly);
                Ok(None)
            }
            Event::MetadataLoaded { result: Err(e), .. } => self.fail(StageKind::Metadata, e),
            Event::SearchResolved { result: Err(e), .. } => self.fail(StageKind::Search, e),
            Event::RowsResolved { result: Err(e), .. } => self.fail(StageKind::Assembly, e),
        }
    }

    // Readiness gate: assembly only ever pairs the current search with the
    // current metadata.
    fn schedule_assembly(&mut self) -> Option<Command> {
        let (Some(dataset_id), Some(search)) = (self.dataset_id.clone(), self.search.clone()) else {
            return None;
        };
        let Some(metadata) = self.metadata.clone() else {
            debug!("search resolved before metadata, deferring assembly");
            self.generations.invalidate(StageKind::Assembly);
            self.awaiting_metadata = true;
            return None;
        };
        self.awaiting_metadata = false;
        let ticket = self.generations.issue(StageKind::Assembly);
        debug!(dataset = %dataset_id, generation = ticket.generation, "assembly issued");
        Some(Command::Assemble { generation: ticket.generation, dataset_id, search, metadata })
    }

    fn fail(&mut self, stage: StageKind, error: Error) -> Result<Option<Command>> {
        warn!(%stage, "stage failed: {error}");
        self.errors[stage.slot()] = Some(error);
        Ok(None)
    }

    fn clear_error(&mut self, stage: StageKind) {
        self.errors[stage.slot()] = None;
    }

    pub fn phase(&self) -> Phase {
        if let Some(stage) = StageKind::ALL.into_iter().find(|s| self.errors[s.slot()].is_some()) {
            return Phase::Error(stage);
        }
        if self.dataset_id.is_none() {
            return Phase::Idle;
        }
        if self.generations.is_pending(StageKind::Metadata) {
            return Phase::MetadataLoading;
        }
        if self.generations.is_pending(StageKind::Search) {
            return Phase::Searching;
        }
        if self.generations.is_pending(StageKind::Assembly) || self.awaiting_metadata {
            return Phase::Assembling;
        }
        if self.displayed {
            return Phase::Displayed;
        }
        if self.metadata.is_some() {
            return Phase::Ready;
        }
        Phase::Idle
    }

    pub fn dataset_id(&self) -> Option<&str> { self.dataset_id.as_deref() }

    pub fn metadata(&self) -> Option<&DatasetMetadata> { self.metadata.as_ref() }

    pub fn query(&self) -> Option<&str> { self.query.as_deref() }

    pub fn search_result(&self) -> Option<&SearchResult> { self.search.as_ref() }

    pub fn neighbors(&self) -> &[NeighborRecord] { &self.neighbors }

    pub fn error(&self, stage: StageKind) -> Option<&Error> { self.errors[stage.slot()].as_ref() }

    pub fn is_awaiting_metadata(&self) -> bool { self.awaiting_metadata }

    pub fn view(&self) -> View {
        let error = StageKind::ALL
            .into_iter()
            .find_map(|stage| self.error(stage).map(|e| format!("{stage}: {e}")));
        View {
            dataset_id: self.dataset_id.clone(),
            summary: self.metadata.as_ref().map(|m| DatasetSummary {
                rows: m.row_count,
                dims: m.dim_count,
                model: m.model.clone(),
            }),
            phase: self.phase(),
            neighbors: self.neighbors.clone(),
            error,
        }
    }
}
