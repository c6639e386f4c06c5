//! Single-threaded driver around [`CoordinationState`].
//!
//! Commands become boxed local futures polled from one `FuturesUnordered`,
//! so completions arrive in whatever order the transport produces and are
//! applied one at a time on the calling task.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::debug;

use scope_core::traits::{MetadataSource, NeighborSource, RowSource};
use scope_core::types::StageKind;

use crate::assembler::ResultAssembler;
use crate::metadata::MetadataLoader;
use crate::search::SearchCoordinator;
use crate::state::{Command, CoordinationState, Event, View};

/// User-originated input for [`Session::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SelectDataset(String),
    SubmitQuery(String),
    Retry(StageKind),
}

/// Outcome of one completed request. `applied` is false when it was stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Update {
    pub stage: StageKind,
    pub applied: bool,
}

pub struct Session<M, N, R> {
    state: CoordinationState,
    loader: Rc<MetadataLoader<M>>,
    searcher: Rc<SearchCoordinator<N>>,
    assembler: Rc<ResultAssembler<R>>,
    in_flight: FuturesUnordered<LocalBoxFuture<'static, Event>>,
}

impl<M, N, R> Session<M, N, R>
where
    M: MetadataSource + 'static,
    N: NeighborSource + 'static,
    R: RowSource + 'static,
{
    pub fn new(loader: MetadataLoader<M>, searcher: SearchCoordinator<N>, assembler: ResultAssembler<R>) -> Self {
        Self {
            state: CoordinationState::new(),
            loader: Rc::new(loader),
            searcher: Rc::new(searcher),
            assembler: Rc::new(assembler),
            in_flight: FuturesUnordered::new(),
        }
    }

    pub fn state(&self) -> &CoordinationState { &self.state }

    pub fn view(&self) -> View { self.state.view() }

    /// Requests started and not yet completed, stale ones included.
    pub fn in_flight(&self) -> usize { self.in_flight.len() }

    pub fn select_dataset(&mut self, dataset_id: &str) {
        let command = self.state.select_dataset(dataset_id);
        self.dispatch(command);
    }

    pub fn submit_query(&mut self, query: &str) {
        if let Some(command) = self.state.submit_query(query) {
            self.dispatch(command);
        }
    }

    pub fn retry(&mut self, stage: StageKind) {
        if let Some(command) = self.state.retry(stage) {
            self.dispatch(command);
        }
    }

    pub fn handle(&mut self, intent: Intent) {
        match intent {
            Intent::SelectDataset(id) => self.select_dataset(&id),
            Intent::SubmitQuery(query) => self.submit_query(&query),
            Intent::Retry(stage) => self.retry(stage),
        }
    }

    /// Wait for the next request to complete and apply it.
    /// Returns `None` once nothing is in flight.
    pub async fn next(&mut self) -> Option<Update> {
        let event = self.in_flight.next().await?;
        Some(self.incorporate(event))
    }

    /// Drive until every request, including follow-ups, has completed.
    pub async fn settle(&mut self) {
        while self.next().await.is_some() {}
    }

    /// Consume intents until the channel closes and all work has settled,
    /// reporting the view after every change.
    pub async fn run<F>(&mut self, mut intents: mpsc::Receiver<Intent>, mut on_change: F)
    where
        F: FnMut(&View),
    {
        let mut open = true;
        loop {
            tokio::select! {
                intent = intents.recv(), if open => match intent {
                    Some(intent) => {
                        self.handle(intent);
                        on_change(&self.state.view());
                    }
                    None => open = false,
                },
                Some(event) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    if self.incorporate(event).applied {
                        on_change(&self.state.view());
                    }
                }
                else => break,
            }
        }
    }

    fn incorporate(&mut self, event: Event) -> Update {
        let stage = event.stage();
        match self.state.apply(event) {
            Ok(follow_up) => {
                if let Some(command) = follow_up {
                    self.dispatch(command);
                }
                Update { stage, applied: true }
            }
            Err(_) => Update { stage, applied: false },
        }
    }

    fn dispatch(&mut self, command: Command) {
        debug!(ticket = ?command.ticket(), "dispatching");
        let task: LocalBoxFuture<'static, Event> = match command {
            Command::LoadMetadata { generation, dataset_id } => {
                let loader = Rc::clone(&self.loader);
                async move {
                    let result = loader.load(&dataset_id).await;
                    Event::MetadataLoaded { generation, result }
                }
                .boxed_local()
            }
            Command::Search { generation, dataset_id, query } => {
                let searcher = Rc::clone(&self.searcher);
                async move {
                    let result = searcher.search(&dataset_id, &query).await;
                    Event::SearchResolved { generation, result }
                }
                .boxed_local()
            }
            Command::Assemble { generation, dataset_id, search, metadata } => {
                let assembler = Rc::clone(&self.assembler);
                async move {
                    let result = assembler
                        .assemble(&dataset_id, search.indices(), search.distances(), &metadata)
                        .await;
                    Event::RowsResolved { generation, result }
                }
                .boxed_local()
            }
        };
        self.in_flight.push(task);
    }
}
