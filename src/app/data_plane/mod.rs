//! Data Plane Services Module
//!
//! Data plane services query data held inside AWS resources, as opposed to
//! control plane operations on the resources themselves.
//!
//! ## Available Services
//!
//! - **CloudWatch Logs Insights**: multi-region query execution and result aggregation
//!
//! ## Architecture
//!
//! ```text
//! 1. Remote seam (api.rs)
//!    └─ async trait per (environment, region), AWS SDK or scripted fake
//!
//! 2. Engine (log_groups.rs, executor.rs, aggregator.rs, diff.rs)
//!    └─ resolve, submit, poll, merge
//!
//! 3. Session (session.rs, presentation.rs)
//!    └─ command/message protocol for a results view
//! ```

pub mod cloudwatch_logs;

// Re-export commonly used types
pub use cloudwatch_logs::{
    execute_query, AggregatedResult, ExecutionOptions, ExecutionReport, LogGroupCatalogCache,
    QuerySession,
};
