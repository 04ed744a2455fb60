//! Error taxonomy for parsing and executing query blocks.
//!
//! Parse-time and submit-time errors are surfaced before anything runs remotely.
//! Poll errors abort the polling loop but leave already-streamed results visible.

#![warn(clippy::all, rust_2018_idioms)]

use std::fmt;

/// Errors raised while parsing or executing a query definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Settings line unparseable or time range unresolvable
    MalformedQuery(String),
    /// A time range side is neither a timestamp nor a duration
    InvalidTimeRange(String),
    /// No usable credentials for the environment/region pair
    Credentials {
        environment: String,
        region: String,
        message: String,
    },
    /// Draining the log group catalog failed
    LogGroupCatalogFetch { region: String, message: String },
    /// The remote service refused to start the query in one region
    QuerySubmit { region: String, message: String },
    /// A poll call itself errored (not a remote `Failed` status)
    QueryPoll {
        region: String,
        query_id: String,
        message: String,
    },
}

impl QueryError {
    /// Region the error belongs to, when it is region scoped
    pub fn region(&self) -> Option<&str> {
        match self {
            QueryError::MalformedQuery(_) | QueryError::InvalidTimeRange(_) => None,
            QueryError::Credentials { region, .. }
            | QueryError::LogGroupCatalogFetch { region, .. }
            | QueryError::QuerySubmit { region, .. }
            | QueryError::QueryPoll { region, .. } => Some(region),
        }
    }

    /// Flatten an anyhow chain into a single line, keeping the remote error text
    pub fn remote_message(error: &anyhow::Error) -> String {
        format!("{:#}", error)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::MalformedQuery(reason) => write!(f, "Malformed query: {}", reason),
            QueryError::InvalidTimeRange(reason) => write!(f, "Invalid time range: {}", reason),
            QueryError::Credentials {
                environment,
                region,
                message,
            } => write!(
                f,
                "Could not find credentials for {} in {}: {}",
                environment, region, message
            ),
            QueryError::LogGroupCatalogFetch { region, message } => {
                write!(f, "Failed to list log groups in {}: {}", region, message)
            }
            QueryError::QuerySubmit { region, message } => {
                write!(f, "Failed to start query in {}: {}", region, message)
            }
            QueryError::QueryPoll {
                region,
                query_id,
                message,
            } => write!(
                f,
                "Failed to fetch results for query {} in {}: {}",
                query_id, region, message
            ),
        }
    }
}

impl std::error::Error for QueryError {}
