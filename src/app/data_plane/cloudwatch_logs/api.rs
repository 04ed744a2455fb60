//! Remote service seam
//!
//! The engine only talks to CloudWatch Logs through these traits so the polling
//! and aggregation logic can be driven by scripted clients in tests.

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::types::{
    LogGroupsPage, LogRecord, QueryHistoryEntry, QueryResultsPage, StartQueryRequest,
};
use crate::app::error::QueryError;

/// Logs Insights operations for one `(environment, region)` pair
#[async_trait]
pub trait LogsInsightsApi: Send + Sync {
    /// Fetch one page of log group names
    async fn describe_log_groups(&self, next_token: Option<String>) -> Result<LogGroupsPage>;

    /// Submit a query and return its query id
    async fn start_query(&self, request: StartQueryRequest) -> Result<String>;

    /// Fetch the current status and the full row snapshot of a query
    async fn get_query_results(&self, query_id: &str) -> Result<QueryResultsPage>;

    /// Ask the service to stop a running query
    async fn stop_query(&self, query_id: &str) -> Result<bool>;

    /// Fetch every field of the record behind a `@ptr` value
    async fn get_log_record(&self, pointer: &str) -> Result<LogRecord>;

    /// List recently run queries
    async fn describe_queries(&self) -> Result<Vec<QueryHistoryEntry>>;
}

/// Hands out a [`LogsInsightsApi`] per `(environment, region)`
#[async_trait]
pub trait LogsClientProvider: Send + Sync {
    async fn client(
        &self,
        environment: &str,
        region: &str,
    ) -> Result<Arc<dyn LogsInsightsApi>, QueryError>;
}
