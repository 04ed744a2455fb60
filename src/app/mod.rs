//! Core modules of cwquery.
//!
//! # Module Organization
//!
//! - [`query`] - query block parsing, time ranges and field annotations
//! - [`data_plane`] - CloudWatch Logs Insights execution, aggregation and sessions
//! - [`credentials`] - per-environment, per-region SDK configs
//! - [`config`] - application configuration
//! - [`query_files`] - saved query files
//! - [`error`] - query error taxonomy
//!
//! # Architecture
//!
//! A query block is parsed into a [`query::QueryDefinition`], executed across
//! its regions by [`data_plane::execute_query`] and streamed to a display layer
//! through a [`data_plane::QuerySession`].

pub mod config;
pub mod credentials;
pub mod data_plane;
pub mod error;
pub mod query;
pub mod query_files;

pub use error::QueryError;
