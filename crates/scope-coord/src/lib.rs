//! scope-coord
//!
//! Coordinates the three dependent fetches behind a dataset neighbor view:
//! metadata load, nearest-neighbor search and row enrichment. Results of
//! superseded requests are dropped by generation, and assembly never runs
//! before metadata is available.

pub mod assembler;
pub mod generation;
pub mod metadata;
pub mod search;
pub mod session;
pub mod state;

pub use assembler::ResultAssembler;
pub use metadata::MetadataLoader;
pub use search::SearchCoordinator;
pub use session::{Intent, Session, Update};
pub use state::{Command, CoordinationState, Event, Phase, View};

use scope_core::config::Settings;
use scope_core::error::Result;
use scope_http::HttpServices;

pub type HttpSession = Session<HttpServices, HttpServices, HttpServices>;

/// Build a session talking to the services named in `settings`.
pub fn connect(settings: &Settings) -> Result<HttpSession> {
    let services = HttpServices::new(settings)?;
    Ok(Session::new(
        MetadataLoader::new(services.clone()),
        SearchCoordinator::new(services.clone()),
        ResultAssembler::new(services).with_sort_key(settings.results.sort_key),
    ))
}
