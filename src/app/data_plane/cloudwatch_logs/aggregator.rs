//! Multi-region polling and result aggregation
//!
//! Logs Insights has no push mode: every region's query is polled until it
//! settles. Each poll returns the full row snapshot so far, which replaces the
//! region's previous snapshot. After every poll round the snapshots are merged
//! in region order and handed to the caller together with a flag telling
//! whether the set of result fields changed since the last emission.
//!
//! ```text
//! Scheduled ──► Running ──► Complete
//!      │            │
//!      └────────────┴─────► Failed   (remote Failed / Cancelled / Timeout)
//! ```
//!
//! Cancellation is cooperative: an in-flight poll is never aborted, the token is
//! checked after each poll round and after each sleep.

#![warn(clippy::all, rust_2018_idioms)]

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::api::LogsInsightsApi;
use super::diff;
use super::types::{QueryStatistics, QueryStatus, ResultRow};
use crate::app::error::QueryError;
use crate::app::query::FieldAnnotations;

/// Fixed delay between poll rounds
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Per-region lifecycle as seen by the aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
}

impl RegionStatus {
    fn from_remote(status: QueryStatus) -> Self {
        match status {
            QueryStatus::Complete => RegionStatus::Complete,
            QueryStatus::Scheduled => RegionStatus::Scheduled,
            status if status.is_terminal() => RegionStatus::Failed,
            _ => RegionStatus::Running,
        }
    }

    /// Complete or failed; the region is not polled again
    pub fn is_settled(&self) -> bool {
        matches!(self, RegionStatus::Complete | RegionStatus::Failed)
    }
}

/// A started query in one region
#[derive(Clone)]
pub struct RegionQuery {
    pub region: String,
    pub query_id: String,
    pub client: Arc<dyn LogsInsightsApi>,
}

impl std::fmt::Debug for RegionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionQuery")
            .field("region", &self.region)
            .field("query_id", &self.query_id)
            .finish()
    }
}

/// Polling state of one region, owned by the aggregator for one execution
#[derive(Debug, Clone)]
pub struct RegionExecutionState {
    pub query: RegionQuery,
    pub status: RegionStatus,
    /// Latest snapshot, replaced on every poll
    pub rows: Vec<ResultRow>,
    pub statistics: Option<QueryStatistics>,
}

impl RegionExecutionState {
    fn new(query: RegionQuery) -> Self {
        Self {
            query,
            status: RegionStatus::Scheduled,
            rows: Vec::new(),
            statistics: None,
        }
    }

    pub fn region(&self) -> &str {
        &self.query.region
    }
}

/// Number of rows a region contributed to an aggregated result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRowCount {
    pub region: String,
    pub row_count: usize,
}

/// Merged view of every region's current snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// All rows, region by region in definition order
    pub rows: Vec<ResultRow>,
    /// Union of field names without `@ptr`, in first-seen order
    pub field_names: Vec<String>,
    /// Row ranges per region, in the same order as `rows`
    pub regions: Vec<RegionRowCount>,
}

impl AggregatedResult {
    /// Merge `(region, rows)` snapshots in the given order
    pub fn from_snapshots<'a, I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [ResultRow])>,
    {
        let mut result = AggregatedResult::default();

        for (region, rows) in snapshots {
            for row in rows {
                for field in row.display_fields() {
                    if !result.field_names.iter().any(|name| name == field) {
                        result.field_names.push(field.to_string());
                    }
                }
            }
            result.rows.extend_from_slice(rows);
            result.regions.push(RegionRowCount {
                region: region.to_string(),
                row_count: rows.len(),
            });
        }

        result
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Region that produced the row at `index`
    pub fn region_of(&self, index: usize) -> Option<&str> {
        let mut offset = 0;
        for region in &self.regions {
            if index < offset + region.row_count {
                return Some(&region.region);
            }
            offset += region.row_count;
        }
        None
    }
}

/// How the polling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalStatus {
    /// Every region settled
    Completed,
    /// Cancellation was observed before every region settled
    Canceled,
}

/// Final state of one aggregation run
#[derive(Debug, Clone)]
pub struct AggregationOutcome {
    pub status: TerminalStatus,
    /// Latest aggregated rows, also on cancellation
    pub result: AggregatedResult,
    /// Field set carried on the last emission
    pub field_names: Option<Vec<String>>,
    /// Regions the remote service reported as failed, cancelled or timed out
    pub failed_regions: Vec<String>,
    /// Latest statistics summed over the regions that reported any
    pub statistics: QueryStatistics,
    pub poll_rounds: usize,
}

/// Polls every region until all settle or the token is cancelled
pub struct PollingAggregator {
    regions: Vec<RegionExecutionState>,
    poll_interval: Duration,
    carried_fields: Option<Vec<String>>,
    /// Names for rows that arrive as bare value lists
    annotations: FieldAnnotations,
}

impl PollingAggregator {
    pub fn new(queries: Vec<RegionQuery>) -> Self {
        Self {
            regions: queries.into_iter().map(RegionExecutionState::new).collect(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            carried_fields: None,
            annotations: FieldAnnotations::resolve(""),
        }
    }

    /// Field annotations of the query, used to name value-list rows
    pub fn with_annotations(mut self, annotations: FieldAnnotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Seed the field set of the previous emission (e.g. from an earlier run)
    pub fn with_field_names(mut self, field_names: Option<Vec<String>>) -> Self {
        self.carried_fields = field_names;
        self
    }

    /// Run the polling loop.
    ///
    /// `on_update` is called after every poll round in which at least one region
    /// has rows. A poll call error aborts the loop with [`QueryError::QueryPoll`];
    /// updates already delivered stay with the caller.
    pub async fn run<F>(
        mut self,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<AggregationOutcome, QueryError>
    where
        F: FnMut(&AggregatedResult, bool),
    {
        let mut poll_rounds = 0usize;

        let status = loop {
            self.poll_pending().await?;
            poll_rounds += 1;

            if cancel.is_cancelled() {
                tracing::info!("Polling canceled after {} rounds", poll_rounds);
                break TerminalStatus::Canceled;
            }

            if self.regions.iter().any(|state| !state.rows.is_empty()) {
                let aggregated = self.aggregate();
                let fields_changed =
                    diff::changed(self.carried_fields.as_deref(), &aggregated.field_names);
                if fields_changed {
                    tracing::debug!("Result fields changed: {:?}", aggregated.field_names);
                    self.carried_fields = Some(aggregated.field_names.clone());
                }
                on_update(&aggregated, fields_changed);
            }

            if self.regions.iter().all(|state| state.status.is_settled()) {
                break TerminalStatus::Completed;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = cancel.cancelled() => {}
            }

            if cancel.is_cancelled() {
                tracing::info!("Polling canceled after {} rounds", poll_rounds);
                break TerminalStatus::Canceled;
            }
        };

        let result = self.aggregate();
        let failed_regions = self
            .regions
            .iter()
            .filter(|state| state.status == RegionStatus::Failed)
            .map(|state| state.region().to_string())
            .collect();
        let statistics = self.statistics();

        tracing::info!(
            "Polling finished ({:?}) with {} rows after {} rounds",
            status,
            result.row_count(),
            poll_rounds
        );

        Ok(AggregationOutcome {
            status,
            result,
            field_names: self.carried_fields,
            failed_regions,
            statistics,
            poll_rounds,
        })
    }

    /// Poll every unsettled region concurrently and record the snapshots
    async fn poll_pending(&mut self) -> Result<(), QueryError> {
        let polls = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, state)| !state.status.is_settled())
            .map(|(index, state)| {
                let client = state.query.client.clone();
                let query_id = state.query.query_id.clone();
                async move { (index, client.get_query_results(&query_id).await) }
            });

        let responses = join_all(polls).await;

        for (index, response) in responses {
            let state = &mut self.regions[index];
            let page = response.map_err(|e| {
                region_error!(
                    state.region(),
                    "Poll failed for query {}: {:#}",
                    state.query.query_id,
                    e
                );
                QueryError::QueryPoll {
                    region: state.query.region.clone(),
                    query_id: state.query.query_id.clone(),
                    message: QueryError::remote_message(&e),
                }
            })?;

            let status = RegionStatus::from_remote(page.status);
            if status != state.status {
                match status {
                    RegionStatus::Failed => region_warn!(
                        state.region(),
                        "Query {} ended with remote status {}",
                        state.query.query_id,
                        page.status.as_str()
                    ),
                    _ => region_debug!(
                        state.region(),
                        "Query {} is {:?} with {} rows",
                        state.query.query_id,
                        status,
                        page.row_count()
                    ),
                }
            } else {
                region_trace!(
                    state.region(),
                    "Query {} still {:?} with {} rows",
                    state.query.query_id,
                    status,
                    page.row_count()
                );
            }

            state.status = status;
            state.rows = page.rows;
            if !page.value_rows.is_empty() {
                state
                    .rows
                    .extend(self.annotations.rows_from_values(page.value_rows));
            }
            if page.statistics.is_some() {
                state.statistics = page.statistics;
            }
        }

        Ok(())
    }

    fn statistics(&self) -> QueryStatistics {
        let mut total = QueryStatistics::default();
        for statistics in self.regions.iter().filter_map(|state| state.statistics.as_ref()) {
            total.accumulate(statistics);
        }
        total
    }

    fn aggregate(&self) -> AggregatedResult {
        AggregatedResult::from_snapshots(
            self.regions
                .iter()
                .map(|state| (state.region(), state.rows.as_slice())),
        )
    }
}
