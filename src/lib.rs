//! cwquery - multi-region CloudWatch Logs Insights queries
//!
//! cwquery runs a Logs Insights query described by a small text block against
//! several AWS regions at once and merges the results as they arrive.
//!
//! # Query blocks
//!
//! ```text
//! #@ errors in checkout
//! prod;us-east-1,eu-west-1;/aws/lambda/checkout-*;2h;500
//! fields @timestamp, @message
//! | filter @message like /ERROR/
//! ```
//!
//! The settings line names the environment (an AWS profile), the regions, the
//! log group pattern, the time range and an optional row limit. Everything
//! after it is the query body.
//!
//! # Architecture Overview
//!
//! - **Parsing** ([`app::query`]): query blocks, time ranges, field annotations
//! - **Engine** ([`app::data_plane::cloudwatch_logs`]): log group resolution,
//!   fail-fast submission, polling and aggregation
//! - **Session** ([`app::data_plane::cloudwatch_logs::session`]): JSON command and
//!   message protocol for a results view
//! - **Integration**: AWS SDK clients behind the `LogsInsightsApi` trait

#![warn(clippy::all, rust_2018_idioms)]

// Include logging macros first
#[macro_use]
pub mod logging_macros;

pub mod app;
pub use app::QueryError;
