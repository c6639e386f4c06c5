use pretty_assertions::assert_eq;
use serde_json::json;

use scope_core::error::Error;
use scope_core::types::{DatasetMetadata, NeighborRecord, SearchResult, StageKind};
use scope_coord::{Command, CoordinationState, Event, Phase};

fn meta(id: &str, model: &str, text_column: &str) -> DatasetMetadata {
    DatasetMetadata::from_meta(
        id,
        json!({"embeddings.json": {"shape": [100, 768], "model": model, "text_column": text_column}}),
    )
    .expect("meta")
}

fn hits(distances: &[f64], indices: &[u64]) -> SearchResult {
    SearchResult::new(distances.to_vec(), indices.to_vec()).expect("search result")
}

fn record(text: &str, score: f64, distance: f64) -> NeighborRecord {
    NeighborRecord { text: text.to_string(), score, distance }
}

fn generation(command: &Command) -> u64 {
    command.ticket().generation
}

/// Select `id`, apply its metadata and return the state at `Ready`.
fn ready(id: &str) -> CoordinationState {
    let mut state = CoordinationState::new();
    let load = state.select_dataset(id);
    let follow_up = state
        .apply(Event::MetadataLoaded { generation: generation(&load), result: Ok(meta(id, "m1", "t")) })
        .expect("apply metadata");
    assert!(follow_up.is_none());
    state
}

/// Run one query to completion on a ready state.
fn display(state: &mut CoordinationState, query: &str, search: SearchResult, rows: Vec<NeighborRecord>) {
    let cmd = state.submit_query(query).expect("search command");
    let assemble = state
        .apply(Event::SearchResolved { generation: generation(&cmd), result: Ok(search) })
        .expect("apply search")
        .expect("assemble command");
    state
        .apply(Event::RowsResolved { generation: generation(&assemble), result: Ok(rows) })
        .expect("apply rows");
}

#[test]
fn phases_follow_the_happy_path() {
    let mut state = CoordinationState::new();
    assert_eq!(state.phase(), Phase::Idle);

    let load = state.select_dataset("ds");
    assert_eq!(state.phase(), Phase::MetadataLoading);
    state
        .apply(Event::MetadataLoaded { generation: generation(&load), result: Ok(meta("ds", "m1", "t")) })
        .expect("metadata");
    assert_eq!(state.phase(), Phase::Ready);

    let search = state.submit_query("").expect("search");
    assert_eq!(state.phase(), Phase::Searching);
    let assemble = state
        .apply(Event::SearchResolved { generation: generation(&search), result: Ok(hits(&[0.1, 0.2], &[3, 7])) })
        .expect("search applied")
        .expect("assembly issued");
    assert_eq!(state.phase(), Phase::Assembling);

    let Command::Assemble { search: pending, metadata, dataset_id, .. } = &assemble else {
        panic!("expected an assemble command, got {assemble:?}");
    };
    assert_eq!(dataset_id, "ds");
    assert_eq!(pending.indices(), &[3, 7]);
    assert_eq!(metadata.text_column, "t");

    state
        .apply(Event::RowsResolved {
            generation: generation(&assemble),
            result: Ok(vec![record("a", 0.9, 0.1), record("b", 0.5, 0.2)]),
        })
        .expect("rows applied");
    assert_eq!(state.phase(), Phase::Displayed);
    assert_eq!(state.neighbors().len(), 2);

    // a new query re-enters Searching while metadata stays
    state.submit_query("again").expect("search");
    assert_eq!(state.phase(), Phase::Searching);
    assert!(state.metadata().is_some());
}

#[test]
fn latest_metadata_load_wins_whatever_the_arrival_order() {
    for newest_first in [true, false] {
        let mut state = CoordinationState::new();
        let first = state.select_dataset("a");
        let second = state.select_dataset("b");

        let old = Event::MetadataLoaded { generation: generation(&first), result: Ok(meta("a", "m-a", "t")) };
        let new = Event::MetadataLoaded { generation: generation(&second), result: Ok(meta("b", "m-b", "t")) };
        let (early, late) = if newest_first { (new, old) } else { (old, new) };
        let early_stale = state.apply(early).is_err();
        let late_stale = state.apply(late).is_err();

        assert_eq!(early_stale, !newest_first);
        assert_eq!(late_stale, newest_first);
        assert_eq!(state.metadata().map(|m| m.model.as_str()), Some("m-b"));
        assert_eq!(state.dataset_id(), Some("b"));
    }
}

#[test]
fn reselecting_the_same_dataset_applies_only_the_latest_load() {
    let mut state = CoordinationState::new();
    let first = state.select_dataset("ds");
    let second = state.select_dataset("ds");

    state
        .apply(Event::MetadataLoaded { generation: generation(&second), result: Ok(meta("ds", "fresh", "t")) })
        .expect("latest applies");
    let err = state
        .apply(Event::MetadataLoaded { generation: generation(&first), result: Ok(meta("ds", "old", "t")) })
        .unwrap_err();

    assert!(matches!(err, Error::Stale { stage: StageKind::Metadata, .. }));
    assert_eq!(state.metadata().map(|m| m.model.as_str()), Some("fresh"));
}

#[test]
fn later_query_wins_when_it_resolves_first() {
    let mut state = ready("ds");
    let q1 = state.submit_query("first").expect("q1");
    let q2 = state.submit_query("second").expect("q2");

    let assemble = state
        .apply(Event::SearchResolved { generation: generation(&q2), result: Ok(hits(&[0.3], &[9])) })
        .expect("q2 applies")
        .expect("assembly");
    let stale = state.apply(Event::SearchResolved { generation: generation(&q1), result: Ok(hits(&[0.1], &[1])) });
    assert!(stale.unwrap_err().is_stale());
    assert_eq!(state.search_result().map(SearchResult::indices), Some(&[9][..]));

    state
        .apply(Event::RowsResolved { generation: generation(&assemble), result: Ok(vec![record("q2", 1.0, 0.3)]) })
        .expect("rows");
    assert_eq!(state.neighbors(), &[record("q2", 1.0, 0.3)]);
    assert_eq!(state.query(), Some("second"));
}

#[test]
fn new_query_supersedes_in_flight_assembly() {
    let mut state = ready("ds");
    let q1 = state.submit_query("first").expect("q1");
    let a1 = state
        .apply(Event::SearchResolved { generation: generation(&q1), result: Ok(hits(&[0.1], &[1])) })
        .expect("q1")
        .expect("a1");
    state.submit_query("second").expect("q2");

    let late = state.apply(Event::RowsResolved { generation: generation(&a1), result: Ok(vec![record("q1", 1.0, 0.1)]) });
    assert!(late.is_err());
    assert!(state.neighbors().is_empty());
    assert_eq!(state.phase(), Phase::Searching);
}

#[test]
fn assembly_waits_for_metadata_and_runs_once() {
    let mut state = CoordinationState::new();
    let load = state.select_dataset("ds");
    let search = state.submit_query("q").expect("search");

    let none = state
        .apply(Event::SearchResolved { generation: generation(&search), result: Ok(hits(&[0.1, 0.2], &[3, 7])) })
        .expect("search applies");
    assert!(none.is_none(), "no assembly without metadata");
    assert!(state.is_awaiting_metadata());

    let assemble = state
        .apply(Event::MetadataLoaded { generation: generation(&load), result: Ok(meta("ds", "m1", "t")) })
        .expect("metadata applies")
        .expect("deferred assembly issued");
    assert!(!state.is_awaiting_metadata());
    match &assemble {
        Command::Assemble { search, metadata, .. } => {
            assert_eq!(search.indices(), &[3, 7]);
            assert_eq!(metadata.model, "m1");
        }
        other => panic!("unexpected command {other:?}"),
    }

    state
        .apply(Event::RowsResolved { generation: generation(&assemble), result: Ok(vec![record("a", 0.9, 0.1)]) })
        .expect("rows");
    assert_eq!(state.phase(), Phase::Displayed);
}

#[test]
fn deferred_assembly_uses_the_latest_search() {
    let mut state = CoordinationState::new();
    let load = state.select_dataset("ds");
    let q1 = state.submit_query("one").expect("q1");
    state
        .apply(Event::SearchResolved { generation: generation(&q1), result: Ok(hits(&[0.1], &[1])) })
        .expect("q1");
    let q2 = state.submit_query("two").expect("q2");
    state
        .apply(Event::SearchResolved { generation: generation(&q2), result: Ok(hits(&[0.2], &[2])) })
        .expect("q2");

    let assemble = state
        .apply(Event::MetadataLoaded { generation: generation(&load), result: Ok(meta("ds", "m1", "t")) })
        .expect("metadata")
        .expect("assembly");
    let Command::Assemble { search, .. } = assemble else { panic!("expected assembly") };
    assert_eq!(search.indices(), &[2]);
}

#[test]
fn dataset_change_discards_results_of_the_old_dataset() {
    let mut state = ready("a");
    let q = state.submit_query("q").expect("search");
    state.select_dataset("b");

    let late = state.apply(Event::SearchResolved { generation: generation(&q), result: Ok(hits(&[0.1], &[1])) });
    assert!(late.unwrap_err().is_stale());
    assert!(state.search_result().is_none());
    assert!(state.metadata().is_none(), "metadata of 'a' is not shown for 'b'");
    assert_eq!(state.phase(), Phase::MetadataLoading);
}

#[test]
fn dataset_change_discards_in_flight_assembly() {
    let mut state = ready("a");
    let q = state.submit_query("q").expect("search");
    let assemble = state
        .apply(Event::SearchResolved { generation: generation(&q), result: Ok(hits(&[0.1], &[1])) })
        .expect("search")
        .expect("assembly");
    state.select_dataset("b");

    let late = state.apply(Event::RowsResolved { generation: generation(&assemble), result: Ok(vec![record("a", 1.0, 0.1)]) });
    assert!(late.is_err());
    assert!(state.neighbors().is_empty());
}

#[test]
fn failed_search_keeps_metadata_and_neighbors() {
    let mut state = ready("ds");
    display(&mut state, "first", hits(&[0.1], &[1]), vec![record("kept", 0.7, 0.1)]);

    let q2 = state.submit_query("second").expect("q2");
    state
        .apply(Event::SearchResolved { generation: generation(&q2), result: Err(Error::Network("reset".into())) })
        .expect("failure is applied");

    assert_eq!(state.phase(), Phase::Error(StageKind::Search));
    assert!(state.metadata().is_some());
    assert_eq!(state.neighbors(), &[record("kept", 0.7, 0.1)]);
    assert!(state.view().error.expect("error shown").starts_with("search:"));

    let retry = state.retry(StageKind::Search).expect("retry issues a search");
    assert!(matches!(&retry, Command::Search { query, .. } if query == "second"));
    assert_eq!(state.phase(), Phase::Searching);
}

#[test]
fn failed_enrichment_keeps_previous_neighbors_and_can_be_retried() {
    let mut state = ready("ds");
    display(&mut state, "first", hits(&[0.1], &[1]), vec![record("kept", 0.7, 0.1)]);

    let q2 = state.submit_query("second").expect("q2");
    let assemble = state
        .apply(Event::SearchResolved { generation: generation(&q2), result: Ok(hits(&[0.4], &[4])) })
        .expect("q2")
        .expect("assembly");
    state
        .apply(Event::RowsResolved {
            generation: generation(&assemble),
            result: Err(Error::MalformedResponse("requested 1 rows, received 0".into())),
        })
        .expect("failure is applied");

    assert_eq!(state.phase(), Phase::Error(StageKind::Assembly));
    assert_eq!(state.neighbors(), &[record("kept", 0.7, 0.1)]);

    let retry = state.retry(StageKind::Assembly).expect("assembly retried");
    let Command::Assemble { search, .. } = &retry else { panic!("expected assembly, got {retry:?}") };
    assert_eq!(search.indices(), &[4]);
    assert_eq!(state.phase(), Phase::Assembling);
}

#[test]
fn failed_metadata_load_is_retried_by_reselecting() {
    let mut state = CoordinationState::new();
    let load = state.select_dataset("missing");
    state
        .apply(Event::MetadataLoaded { generation: generation(&load), result: Err(Error::NotFound("dataset 'missing'".into())) })
        .expect("failure is applied");
    assert_eq!(state.phase(), Phase::Error(StageKind::Metadata));
    assert!(state.error(StageKind::Metadata).is_some());

    let retry = state.retry(StageKind::Metadata).expect("reload");
    assert!(matches!(&retry, Command::LoadMetadata { dataset_id, .. } if dataset_id == "missing"));
    assert_eq!(state.phase(), Phase::MetadataLoading);
    assert!(state.error(StageKind::Metadata).is_none());
}

#[test]
fn metadata_reload_reassembles_current_search() {
    let mut state = ready("ds");
    display(&mut state, "q", hits(&[0.1], &[1]), vec![record("a", 0.5, 0.1)]);

    let reload = state.select_dataset("ds");
    assert_eq!(state.neighbors().len(), 1, "same-id reselect keeps the view");
    let assemble = state
        .apply(Event::MetadataLoaded { generation: generation(&reload), result: Ok(meta("ds", "m1", "other_text")) })
        .expect("metadata")
        .expect("re-assembly");
    let Command::Assemble { metadata, .. } = assemble else { panic!("expected assembly") };
    assert_eq!(metadata.text_column, "other_text");
}

#[test]
fn query_without_dataset_issues_nothing() {
    let mut state = CoordinationState::new();
    assert!(state.submit_query("q").is_none());
    assert!(state.retry(StageKind::Search).is_none());
    assert!(state.retry(StageKind::Assembly).is_none());
    assert_eq!(state.phase(), Phase::Idle);
}

#[test]
fn view_reports_summary_and_neighbors() {
    let mut state = ready("ds");
    display(&mut state, "", hits(&[0.1, 0.2], &[3, 7]), vec![record("a", 0.9, 0.1), record("b", 0.5, 0.2)]);

    let view = state.view();
    let summary = view.summary.expect("summary");
    assert_eq!((summary.rows, summary.dims, summary.model.as_str()), (100, 768, "m1"));
    assert_eq!(view.phase, Phase::Displayed);
    assert_eq!(view.neighbors.len(), 2);
    assert!(view.error.is_none());

    let encoded = serde_json::to_value(&view.phase).expect("serialize phase");
    assert_eq!(encoded, json!({"phase": "displayed"}));
}
