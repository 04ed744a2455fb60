//! CloudWatch Logs Insights Data Types
//!
//! Data structures for submitted queries, polled results and catalog pages.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved field holding the record pointer; never a display field
pub const POINTER_FIELD: &str = "@ptr";

/// Query status as reported by the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Scheduled,
    Running,
    Complete,
    Failed,
    Cancelled,
    Timeout,
    Unknown,
}

impl QueryStatus {
    /// Map the remote status string, treating anything unrecognised as `Unknown`
    pub fn from_remote(status: &str) -> Self {
        match status {
            "Scheduled" => QueryStatus::Scheduled,
            "Running" => QueryStatus::Running,
            "Complete" => QueryStatus::Complete,
            "Failed" => QueryStatus::Failed,
            "Cancelled" => QueryStatus::Cancelled,
            "Timeout" => QueryStatus::Timeout,
            _ => QueryStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Scheduled => "Scheduled",
            QueryStatus::Running => "Running",
            QueryStatus::Complete => "Complete",
            QueryStatus::Failed => "Failed",
            QueryStatus::Cancelled => "Cancelled",
            QueryStatus::Timeout => "Timeout",
            QueryStatus::Unknown => "Unknown",
        }
    }

    /// The remote query will never produce more rows
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryStatus::Complete
                | QueryStatus::Failed
                | QueryStatus::Cancelled
                | QueryStatus::Timeout
        )
    }
}

/// One `(field, value)` cell of a result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultField {
    pub field: String,
    pub value: String,
}

impl ResultField {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A result row: ordered `(field, value)` pairs, possibly including `@ptr`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow(pub Vec<ResultField>);

impl ResultRow {
    pub fn new(fields: Vec<ResultField>) -> Self {
        Self(fields)
    }

    /// Build from `(field, value)` pairs
    pub fn from_pairs<I, F, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(field, value)| ResultField::new(field, value))
                .collect(),
        )
    }

    /// Pair a value-only row with column names; extra values are dropped
    pub fn from_values(field_names: &[String], values: Vec<String>) -> Self {
        Self(
            field_names
                .iter()
                .zip(values)
                .map(|(field, value)| ResultField::new(field.clone(), value))
                .collect(),
        )
    }

    /// Value of the first cell named `field`
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|cell| cell.field == field)
            .map(|cell| cell.value.as_str())
    }

    /// Record pointer used to fetch the full log record
    pub fn pointer(&self) -> Option<&str> {
        self.get(POINTER_FIELD)
    }

    /// Field names excluding the reserved pointer field
    pub fn display_fields(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .map(|cell| cell.field.as_str())
            .filter(|field| *field != POINTER_FIELD)
    }

    pub fn cells(&self) -> &[ResultField] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameters of one StartQuery call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartQueryRequest {
    pub query_string: String,
    pub log_group_names: Vec<String>,
    /// Epoch seconds
    pub start_time: i64,
    /// Epoch seconds
    pub end_time: i64,
    pub limit: Option<i32>,
}

/// Statistics about a Logs Insights query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStatistics {
    /// Bytes scanned during the query
    pub bytes_scanned: f64,
    /// Number of records that matched the query
    pub records_matched: f64,
    /// Total number of records scanned
    pub records_scanned: f64,
}

impl QueryStatistics {
    pub fn new(bytes_scanned: f64, records_matched: f64, records_scanned: f64) -> Self {
        Self {
            bytes_scanned,
            records_matched,
            records_scanned,
        }
    }

    /// Add another region's statistics to these
    pub fn accumulate(&mut self, other: &QueryStatistics) {
        self.bytes_scanned += other.bytes_scanned;
        self.records_matched += other.records_matched;
        self.records_scanned += other.records_scanned;
    }
}

/// One GetQueryResults response: the full result set so far, not a delta
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResultsPage {
    pub status: QueryStatus,
    pub rows: Vec<ResultRow>,
    /// Rows whose cells came without field names, paired later with the
    /// display names declared in the query
    pub value_rows: Vec<Vec<String>>,
    pub statistics: Option<QueryStatistics>,
}

impl QueryResultsPage {
    pub fn new(status: QueryStatus, rows: Vec<ResultRow>) -> Self {
        Self {
            status,
            rows,
            value_rows: Vec::new(),
            statistics: None,
        }
    }

    pub fn from_values(status: QueryStatus, value_rows: Vec<Vec<String>>) -> Self {
        Self {
            status,
            rows: Vec::new(),
            value_rows,
            statistics: None,
        }
    }

    pub fn with_statistics(mut self, statistics: QueryStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Number of rows in either shape
    pub fn row_count(&self) -> usize {
        self.rows.len() + self.value_rows.len()
    }
}

/// One page of the log group catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogGroupsPage {
    pub names: Vec<String>,
    pub next_token: Option<String>,
}

/// A previously run query, as listed by DescribeQueries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub query_id: Option<String>,
    pub query_string: String,
    /// Unix milliseconds
    pub create_time: Option<i64>,
    pub status: QueryStatus,
}

/// Full field/value map of one log record
pub type LogRecord = BTreeMap<String, String>;
