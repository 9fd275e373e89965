//! Crawl coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that drives work units end to end:
//! - Skipping units already present in the checkpoint store
//! - Paging each unit sequentially up to its page ceiling
//! - Pacing every request and honoring operator cancellation
//! - Handing decoded listings to the ingestion sink
//! - Checkpointing a unit only after its last page
//! - Halting the run at the first failed unit

use crate::catalog::{load_work_units, WorkUnit};
use crate::checkpoint::{open_checkpoint_store, CheckpointStore};
use crate::config::{Config, CrawlConfig};
use crate::crawler::fetcher::Transport;
use crate::crawler::pacer::Pacer;
use crate::crawler::parser::PageResult;
use crate::crawler::search::{ListingSource, SearchClient, SearchFilters};
use crate::state::UnitState;
use crate::storage::{ListingSink, RunStatus, SqliteStorage, Storage};
use crate::{CrawlError, Result};
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Knobs for one orchestrator run
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Page the first non-checkpointed unit starts at; later units start at 1
    pub start_page: u32,

    /// Pages per unit counted from the start page; 0 means no limit
    pub max_pages: u32,

    /// Highest page the API will serve
    pub max_api_pages: u32,

    pub filters: SearchFilters,

    /// Base pacing delay before every page request
    pub request_delay: Duration,
}

impl CrawlOptions {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            start_page: 1,
            max_pages: config.max_pages,
            max_api_pages: config.max_api_pages,
            filters: SearchFilters::from_config(config),
            request_delay: config.request_delay(),
        }
    }

    /// Last page to request for a unit, before the API reports its total
    fn page_cap(&self, start_page: u32) -> u32 {
        let mut cap = self.max_api_pages;
        if self.max_pages > 0 {
            cap = cap.min(start_page.saturating_add(self.max_pages - 1));
        }
        cap
    }
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

/// How one work unit ended
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// Every page drained; the unit is checkpointed
    Done { pages: u32, listings: usize },

    /// Already checkpointed by an earlier run
    Skipped,

    /// A page could not be decoded; the unit is not checkpointed but the run goes on
    Incomplete { page: u32, reason: String },

    /// A page failed after retries; the run stops here
    Failed { page: u32, error: String },

    /// Operator abort before `page` was requested
    Interrupted { page: u32 },
}

/// Where a run stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaltPoint {
    pub unit: String,
    pub page: u32,
}

/// Tally of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    pub total_units: usize,
    /// Units drained in this run
    pub done: usize,
    /// Units skipped as already checkpointed
    pub skipped: usize,
    pub incomplete: usize,
    pub failed: usize,
    /// Listings handed to the sink
    pub listings: usize,
    /// Unit and page where the run halted on a failure
    pub halted_at: Option<HaltPoint>,
    /// Unit and page where the operator aborted
    pub interrupted_at: Option<HaltPoint>,
}

impl CrawlSummary {
    fn new(total_units: usize) -> Self {
        Self {
            total_units,
            ..Self::default()
        }
    }

    /// Units whose checkpoint is present after this run
    pub fn completed(&self) -> usize {
        self.done + self.skipped
    }

    /// Units still to be crawled by a later run
    pub fn pending(&self) -> usize {
        self.total_units.saturating_sub(self.completed())
    }

    /// Final status recorded on the crawl run
    pub fn status(&self) -> RunStatus {
        if self.interrupted_at.is_some() {
            RunStatus::Interrupted
        } else if self.halted_at.is_some() {
            RunStatus::Halted
        } else {
            RunStatus::Completed
        }
    }

    fn record(&mut self, unit: &WorkUnit, outcome: &UnitOutcome) {
        match outcome {
            UnitOutcome::Done { listings, .. } => {
                self.done += 1;
                self.listings += listings;
            }
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::Incomplete { .. } => self.incomplete += 1,
            UnitOutcome::Failed { page, .. } => {
                self.failed += 1;
                self.halted_at = Some(HaltPoint {
                    unit: unit.slug.clone(),
                    page: *page,
                });
            }
            UnitOutcome::Interrupted { page } => {
                self.interrupted_at = Some(HaltPoint {
                    unit: unit.slug.clone(),
                    page: *page,
                });
            }
        }
    }
}

/// Moves a unit along its state machine
fn advance(unit: &WorkUnit, state: &mut UnitState, next: UnitState) -> Result<()> {
    if !state.can_transition_to(next) {
        return Err(CrawlError::InvalidTransition {
            from: *state,
            to: next,
        });
    }
    debug!(unit = %unit.slug, from = %state, to = %next, "Unit state change");
    *state = next;
    Ok(())
}

/// Main crawler coordinator structure
///
/// Single worker: units and their pages are processed strictly in order.
pub struct Coordinator<L, C, S> {
    source: L,
    checkpoints: C,
    sink: S,
    options: CrawlOptions,
    pacer: Pacer,
    cancel: CancellationToken,
}

impl<L, C, S> Coordinator<L, C, S>
where
    L: ListingSource,
    C: CheckpointStore,
    S: ListingSink,
{
    pub fn new(
        source: L,
        checkpoints: C,
        sink: S,
        options: CrawlOptions,
        cancel: CancellationToken,
    ) -> Self {
        let pacer = Pacer::new(options.request_delay);
        Self {
            source,
            checkpoints,
            sink,
            options,
            pacer,
            cancel,
        }
    }

    /// Hands back the collaborators
    pub fn into_parts(self) -> (L, C, S) {
        (self.source, self.checkpoints, self.sink)
    }

    /// Crawls `units` in order
    ///
    /// Stops at the first failed unit or on cancellation. Only checkpoint
    /// store errors abort the run with an error.
    pub async fn run(&mut self, units: &[WorkUnit]) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::new(units.len());
        let mut start_page = self.options.start_page.max(1);

        info!(units = units.len(), start_page, "Starting crawl");

        for unit in units {
            let outcome = self.crawl_unit(unit, start_page).await?;
            summary.record(unit, &outcome);

            if outcome != UnitOutcome::Skipped {
                start_page = 1;
            }
            if matches!(
                outcome,
                UnitOutcome::Failed { .. } | UnitOutcome::Interrupted { .. }
            ) {
                break;
            }
        }

        if let Some(halt) = &summary.halted_at {
            error!(
                unit = %halt.unit,
                page = halt.page,
                "Crawl halted; rerun with --start-page {} to resume",
                halt.page
            );
        }
        if let Some(stop) = &summary.interrupted_at {
            warn!(unit = %stop.unit, page = stop.page, "Crawl interrupted");
        }
        info!(
            completed = summary.completed(),
            pending = summary.pending(),
            incomplete = summary.incomplete,
            listings = summary.listings,
            "Crawl finished: {} units completed, {} pending",
            summary.completed(),
            summary.pending()
        );

        Ok(summary)
    }

    /// Crawls one unit from `start_page`
    pub async fn crawl_unit(&mut self, unit: &WorkUnit, start_page: u32) -> Result<UnitOutcome> {
        let mut state = UnitState::Pending;

        if self.checkpoints.is_complete(&unit.slug)? {
            advance(unit, &mut state, UnitState::Done)?;
            info!(unit = %unit.slug, "Skipping already processed neighborhood");
            return Ok(UnitOutcome::Skipped);
        }

        let mut ceiling = self.options.page_cap(start_page);
        if start_page > ceiling {
            warn!(
                unit = %unit.slug,
                start_page,
                ceiling,
                "Start page is past the page ceiling; nothing left to request"
            );
            advance(unit, &mut state, UnitState::Done)?;
            self.checkpoints.mark_complete(&unit.slug)?;
            return Ok(UnitOutcome::Done {
                pages: 0,
                listings: 0,
            });
        }

        advance(unit, &mut state, UnitState::FetchingFirstPage)?;
        info!(unit = %unit.slug, name = %unit.name, start_page, "Crawling neighborhood");

        let mut page = start_page;
        let mut pages = 0u32;
        let mut listings = 0usize;
        let mut first_bad_page: Option<(u32, String)> = None;

        loop {
            if !self.pace().await {
                info!(unit = %unit.slug, page, "Stopping before page request");
                return Ok(UnitOutcome::Interrupted { page });
            }

            let result = match self
                .source
                .search(&unit.slug, &self.options.filters, page)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!(unit = %unit.slug, page, error = %e, "Page fetch failed");
                    advance(unit, &mut state, UnitState::Failed)?;
                    return Ok(UnitOutcome::Failed {
                        page,
                        error: e.to_string(),
                    });
                }
            };

            match result {
                PageResult::Listings {
                    records,
                    total_pages,
                    skipped,
                } => {
                    if state == UnitState::FetchingFirstPage {
                        if let Some(total) = total_pages {
                            ceiling = ceiling.min(total);
                        }
                        advance(unit, &mut state, UnitState::FetchingSubsequentPages)?;
                    }

                    if let Err(e) = self.sink.upsert_listings(&records) {
                        error!(unit = %unit.slug, page, error = %e, "Storing page failed");
                        advance(unit, &mut state, UnitState::Failed)?;
                        return Ok(UnitOutcome::Failed {
                            page,
                            error: e.to_string(),
                        });
                    }

                    pages += 1;
                    listings += records.len();
                    info!(
                        unit = %unit.slug,
                        page,
                        listings = records.len(),
                        skipped,
                        ceiling,
                        "Ingested page"
                    );
                }
                PageResult::EndOfResults { .. } => {
                    if state == UnitState::FetchingFirstPage {
                        advance(unit, &mut state, UnitState::Empty)?;
                        info!(unit = %unit.slug, page, "No listings for neighborhood");
                    } else {
                        info!(unit = %unit.slug, page, "Empty page; end of results");
                    }
                    break;
                }
                PageResult::Malformed { reason } => {
                    warn!(unit = %unit.slug, page, reason = %reason, "Malformed page");
                    if state == UnitState::FetchingFirstPage {
                        advance(unit, &mut state, UnitState::Failed)?;
                        return Ok(UnitOutcome::Incomplete { page, reason });
                    }
                    first_bad_page.get_or_insert((page, reason));
                }
            }

            if page >= ceiling {
                break;
            }
            page += 1;
        }

        if let Some((page, reason)) = first_bad_page {
            advance(unit, &mut state, UnitState::Failed)?;
            warn!(
                unit = %unit.slug,
                page,
                "Neighborhood left unchecked because page {} could not be decoded",
                page
            );
            return Ok(UnitOutcome::Incomplete { page, reason });
        }

        advance(unit, &mut state, UnitState::Done)?;
        self.checkpoints.mark_complete(&unit.slug)?;
        info!(unit = %unit.slug, pages, listings, "Neighborhood complete");

        Ok(UnitOutcome::Done { pages, listings })
    }

    /// Sleeps the pacing delay; false when cancelled first
    async fn pace(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let delay = self.pacer.next_delay();
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open storage and load work units from the catalog
/// 2. Open the checkpoint store (cleared when `fresh`)
/// 3. Record a crawl run
/// 4. Warm up a transport and drive the coordinator
/// 5. Close the run with its final status
///
/// # Arguments
///
/// * `config` - The crawler configuration (CLI overrides already applied)
/// * `config_hash` - Hash stored on the run record
/// * `options` - Orchestrator knobs
/// * `fresh` - Forget all checkpoints before starting
/// * `cancel` - Operator abort signal
pub async fn run_crawl(
    config: &Config,
    config_hash: &str,
    options: CrawlOptions,
    fresh: bool,
    cancel: CancellationToken,
) -> Result<CrawlSummary> {
    let mut storage = SqliteStorage::new(Path::new(&config.storage.database_path))?
        .with_price_history(config.storage.price_history);

    let units = load_work_units(&storage, config.crawl.level)?;
    info!(units = units.len(), level = ?config.crawl.level, "Loaded work units");

    let mut checkpoints = open_checkpoint_store(config)?;
    if fresh {
        info!("Clearing checkpoints for a fresh crawl");
        checkpoints.clear()?;
    }

    let run_id = storage.create_run(config_hash)?;
    info!(run_id, "Created crawl run");

    let transport = Transport::connect(&config.site, &config.transport).await?;
    let source = SearchClient::new(transport, config.site.clone());

    let mut coordinator = Coordinator::new(source, checkpoints, storage, options, cancel);
    let result = coordinator.run(&units).await;
    let (_, _, mut storage) = coordinator.into_parts();

    match result {
        Ok(summary) => {
            storage.finish_run(
                run_id,
                summary.status(),
                summary.completed() as u64,
                summary.failed as u64,
            )?;
            Ok(summary)
        }
        Err(e) => {
            storage.finish_run(run_id, RunStatus::Halted, 0, 1)?;
            Err(e)
        }
    }
}
