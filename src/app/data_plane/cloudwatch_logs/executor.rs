//! Query execution workflow
//!
//! One execution runs a parsed [`QueryDefinition`] end to end:
//!
//! 1. obtain a client per region
//! 2. expand the log group pattern per region (catalog failures abort here)
//! 3. start the query in every region, failing fast on the first refusal
//! 4. poll and aggregate until every region settles or the run is cancelled
//!
//! Progress is reported through a callback, in the same manner as the resource
//! query engine reports its phases.

#![warn(clippy::all, rust_2018_idioms)]

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::aggregator::{
    AggregatedResult, PollingAggregator, RegionQuery, TerminalStatus, DEFAULT_POLL_INTERVAL,
};
use super::api::{LogsClientProvider, LogsInsightsApi};
use super::log_groups::{resolve_log_groups, LogGroupCatalogCache};
use super::types::{QueryStatistics, StartQueryRequest};
use crate::app::error::QueryError;
use crate::app::query::QueryDefinition;

/// Tunables for one execution
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    pub poll_interval: Duration,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Log groups a region's query runs against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionLogGroups {
    pub region: String,
    pub log_groups: Vec<String>,
}

/// Progress events emitted during an execution
#[derive(Debug, Clone)]
pub enum ExecutionProgress {
    /// Log group patterns were expanded for every region
    LogGroupsResolved { log_groups: Vec<RegionLogGroups> },
    /// Every region accepted the query
    QueriesStarted { query_ids: Vec<(String, String)> },
    /// A poll round produced rows
    Results {
        result: Arc<AggregatedResult>,
        fields_changed: bool,
    },
}

/// Outcome of a finished (or cancelled) execution
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub status: TerminalStatus,
    pub result: AggregatedResult,
    pub log_groups: Vec<RegionLogGroups>,
    pub failed_regions: Vec<String>,
    /// Field set of the last emission, to store back on the definition
    pub field_names: Option<Vec<String>>,
    /// Scan statistics summed over the regions
    pub statistics: QueryStatistics,
}

/// Build the StartQuery parameters for one region
pub fn start_request(definition: &QueryDefinition, log_groups: &[String]) -> StartQueryRequest {
    StartQueryRequest {
        query_string: definition.query_text.clone(),
        log_group_names: log_groups.to_vec(),
        start_time: definition.time_range.start_seconds(),
        end_time: definition.time_range.end_seconds(),
        limit: definition.max_results,
    }
}

/// Obtain a client for every region of the definition, in region order
pub async fn region_clients(
    definition: &QueryDefinition,
    provider: &dyn LogsClientProvider,
) -> Result<Vec<(String, Arc<dyn LogsInsightsApi>)>, QueryError> {
    let clients = definition.regions.iter().map(|region| async move {
        provider
            .client(&definition.environment, region)
            .await
            .map(|client| (region.clone(), client))
    });

    try_join_all(clients).await
}

/// Expand the log group pattern in every region concurrently
pub async fn resolve_region_log_groups(
    definition: &QueryDefinition,
    clients: &[(String, Arc<dyn LogsInsightsApi>)],
    catalog: &LogGroupCatalogCache,
) -> Result<Vec<RegionLogGroups>, QueryError> {
    let resolutions = clients.iter().map(|(region, client)| async move {
        let log_groups = resolve_log_groups(
            client.as_ref(),
            catalog,
            &definition.environment,
            region,
            &definition.log_group_pattern,
        )
        .await?;

        if log_groups.is_empty() {
            region_warn!(
                region,
                "No log groups match '{}'",
                definition.log_group_pattern
            );
        }

        Ok::<_, QueryError>(RegionLogGroups {
            region: region.clone(),
            log_groups,
        })
    });

    try_join_all(resolutions).await
}

/// Start the query in every region.
///
/// The first refusal stops the submission: later regions are not attempted and
/// queries already started are stopped, so no partial multi-region run is left
/// behind. Exactly one error is returned.
pub async fn start_queries(
    definition: &QueryDefinition,
    clients: &[(String, Arc<dyn LogsInsightsApi>)],
    log_groups: &[RegionLogGroups],
) -> Result<Vec<RegionQuery>, QueryError> {
    let mut started: Vec<RegionQuery> = Vec::with_capacity(clients.len());

    for (region, client) in clients {
        let groups = log_groups
            .iter()
            .find(|entry| &entry.region == region)
            .map(|entry| entry.log_groups.as_slice())
            .unwrap_or_default();

        match client.start_query(start_request(definition, groups)).await {
            Ok(query_id) => {
                region_info!(region, "Started query {}", query_id);
                started.push(RegionQuery {
                    region: region.clone(),
                    query_id,
                    client: client.clone(),
                });
            }
            Err(e) => {
                region_error!(region, "Failed to start query: {:#}", e);
                stop_started(&started).await;
                return Err(QueryError::QuerySubmit {
                    region: region.clone(),
                    message: QueryError::remote_message(&e),
                });
            }
        }
    }

    Ok(started)
}

/// Best-effort stop of queries that were started before a submit failure
async fn stop_started(started: &[RegionQuery]) {
    let stops = started.iter().map(|query| async move {
        match query.client.stop_query(&query.query_id).await {
            Ok(_) => region_info!(query.region, "Stopped query {}", query.query_id),
            Err(e) => region_warn!(
                query.region,
                "Could not stop query {}: {:#}",
                query.query_id,
                e
            ),
        }
    });

    futures::future::join_all(stops).await;
}

/// Run a definition end to end, reporting progress through `on_progress`
pub async fn execute_query<F>(
    definition: &QueryDefinition,
    provider: &dyn LogsClientProvider,
    catalog: &LogGroupCatalogCache,
    options: &ExecutionOptions,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<ExecutionReport, QueryError>
where
    F: FnMut(ExecutionProgress),
{
    tracing::info!(
        "Executing query in {} for regions {:?}",
        definition.environment,
        definition.regions
    );

    let clients = region_clients(definition, provider).await?;
    let log_groups = resolve_region_log_groups(definition, &clients, catalog).await?;
    on_progress(ExecutionProgress::LogGroupsResolved {
        log_groups: log_groups.clone(),
    });

    let queries = start_queries(definition, &clients, &log_groups).await?;
    on_progress(ExecutionProgress::QueriesStarted {
        query_ids: queries
            .iter()
            .map(|query| (query.region.clone(), query.query_id.clone()))
            .collect(),
    });

    let outcome = PollingAggregator::new(queries)
        .with_poll_interval(options.poll_interval)
        .with_field_names(definition.field_names.clone())
        .with_annotations(definition.field_annotations())
        .run(cancel, |result, fields_changed| {
            on_progress(ExecutionProgress::Results {
                result: Arc::new(result.clone()),
                fields_changed,
            })
        })
        .await?;

    Ok(ExecutionReport {
        status: outcome.status,
        result: outcome.result,
        log_groups,
        failed_regions: outcome.failed_regions,
        field_names: outcome.field_names,
        statistics: outcome.statistics,
    })
}
