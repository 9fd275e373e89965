//! State module for tracking crawl progress
//!
//! `UnitState` is the per-neighborhood state machine the coordinator walks:
//! `Pending -> FetchingFirstPage -> {Empty | FetchingSubsequentPages} -> Done`,
//! with `Failed` reachable from either fetching state.

mod unit_state;

pub use unit_state::UnitState;
