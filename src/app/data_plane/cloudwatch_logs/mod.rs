//! CloudWatch Logs Insights Module
//!
//! Runs Logs Insights queries in several regions at once and merges the
//! results as they arrive.
//!
//! ## Features
//!
//! - Wildcard log group patterns expanded against a cached per-region catalog
//! - Fail-fast multi-region submission
//! - Cooperative cancellation of the polling loop
//! - Field-set change detection between result emissions
//! - Log record lookup, raw text tables and query history
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cwquery::app::data_plane::cloudwatch_logs::{
//!     execute_query, AwsLogsClientProvider, ExecutionOptions, LogGroupCatalogCache,
//! };
//! use cwquery::app::credentials::CredentialCoordinator;
//! use cwquery::app::query::QueryDefinition;
//! # use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = AwsLogsClientProvider::new(Arc::new(CredentialCoordinator::new(None)));
//! let definition = QueryDefinition::parse(
//!     "prod;us-east-1,eu-west-1;/aws/lambda/orders-*;1h\nfields @timestamp, @message",
//!     None,
//! )?;
//!
//! let report = execute_query(
//!     &definition,
//!     &provider,
//!     &LogGroupCatalogCache::new(),
//!     &ExecutionOptions::default(),
//!     &CancellationToken::new(),
//!     |progress| println!("{:?}", progress),
//! )
//! .await?;
//!
//! println!("{} rows", report.result.row_count());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, rust_2018_idioms)]

pub mod aggregator;
pub mod api;
pub mod client;
pub mod diff;
pub mod executor;
pub mod log_groups;
pub mod presentation;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use aggregator::{
    AggregatedResult, PollingAggregator, RegionQuery, RegionStatus, TerminalStatus,
};
pub use api::{LogsClientProvider, LogsInsightsApi};
pub use client::{AwsLogsClientProvider, CloudWatchLogsClient};
pub use executor::{
    execute_query, start_queries, ExecutionOptions, ExecutionProgress, ExecutionReport,
    RegionLogGroups,
};
pub use log_groups::{resolve_log_groups, LogGroupCatalogCache};
pub use session::{QuerySession, SessionCommand, SessionMessage, SessionOutcome};
pub use types::{
    LogGroupsPage, LogRecord, QueryHistoryEntry, QueryResultsPage, QueryStatistics, QueryStatus,
    ResultField, ResultRow, StartQueryRequest,
};
