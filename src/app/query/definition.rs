//! Query block parsing
//!
//! A query block is a settings line followed by the query body:
//!
//! ```text
//! #@ optional title
//! <env>;<region1,region2>;<logGroupPattern,...>;<timeRange>[;<maxResults>]
//! fields @timestamp, @message
//! | filter @message like /ERROR/
//! ```
//!
//! The settings line may use `:` instead of `;`, in which case everything after
//! the third field is the time range and no row limit can be given.

#![warn(clippy::all, rust_2018_idioms)]

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::fields::FieldAnnotations;
use super::time_range::{self, TimeRange};
use crate::app::error::QueryError;

/// Line prefixes that set the title instead of being ignored as comments
const TITLE_MARKERS: [&str; 2] = ["#@", "#!"];

/// Title used for result views when none was given
pub const DEFAULT_TITLE: &str = "Results";

/// A parsed query block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefinition {
    /// Query body, sent verbatim to the remote service
    pub query_text: String,
    /// Credential scope (AWS profile name)
    pub environment: String,
    /// Target regions, trimmed and deduplicated in order
    pub regions: Vec<String>,
    /// Comma-separated literal or `*` wildcard log group names
    pub log_group_pattern: String,
    pub time_range: TimeRange,
    /// Row cap per region
    pub max_results: Option<i32>,
    /// Original text, kept for redisplay and re-editing
    pub raw_text: String,
    pub title: Option<String>,
    /// Last observed set of displayable result fields
    pub field_names: Option<Vec<String>>,
}

impl QueryDefinition {
    /// Parse a query block. The title of `previous` takes precedence over a title directive.
    pub fn parse(text: &str, previous: Option<&QueryDefinition>) -> Result<Self, QueryError> {
        Self::parse_at(text, previous, Utc::now().timestamp_millis())
    }

    /// Parse with relative time ranges counted back from `now_ms`
    pub fn parse_at(
        text: &str,
        previous: Option<&QueryDefinition>,
        now_ms: i64,
    ) -> Result<Self, QueryError> {
        let mut directive_title: Option<String> = None;
        let mut lines = Vec::new();

        for line in text.trim().lines() {
            if let Some(rest) = TITLE_MARKERS
                .iter()
                .find_map(|marker| line.strip_prefix(marker))
            {
                let candidate = rest.trim();
                if directive_title.is_none() && !candidate.is_empty() {
                    directive_title = Some(candidate.to_string());
                }
                continue;
            }

            if line.starts_with('#') {
                continue;
            }

            if lines.is_empty() && line.trim().is_empty() {
                continue;
            }

            lines.push(line);
        }

        let (settings, query_lines) = lines.split_first().ok_or_else(|| {
            QueryError::MalformedQuery("query block has no settings line".to_string())
        })?;
        let settings = SettingsLine::parse(settings)?;

        let regions = parse_regions(settings.regions);
        if regions.is_empty() {
            return Err(QueryError::MalformedQuery(
                "settings line names no regions".to_string(),
            ));
        }

        let time_range = time_range::resolve_at(settings.time_range, now_ms)
            .map_err(|e| QueryError::MalformedQuery(e.to_string()))?;

        let title = previous
            .and_then(|previous| previous.title.clone())
            .or(directive_title);

        Ok(Self {
            query_text: query_lines.join("\n"),
            environment: settings.environment.trim().to_string(),
            regions,
            log_group_pattern: settings.log_group_pattern.trim().to_string(),
            time_range,
            max_results: settings.max_results,
            raw_text: text.to_string(),
            title,
            field_names: None,
        })
    }

    /// Title shown on result views, e.g. `errors prod (42)`
    pub fn panel_title(&self, row_count: usize) -> String {
        format!(
            "{} {} ({})",
            self.title.as_deref().unwrap_or(DEFAULT_TITLE),
            self.environment,
            row_count
        )
    }

    /// Display annotations declared in the query body
    pub fn field_annotations(&self) -> FieldAnnotations {
        FieldAnnotations::resolve(&self.query_text)
    }
}

/// Borrowed fields of a settings line
struct SettingsLine<'a> {
    environment: &'a str,
    regions: &'a str,
    log_group_pattern: &'a str,
    time_range: &'a str,
    max_results: Option<i32>,
}

impl<'a> SettingsLine<'a> {
    fn parse(line: &'a str) -> Result<Self, QueryError> {
        let line = line.trim();

        if line.contains(';') {
            let fields: Vec<&str> = line.split(';').collect();
            Self::require_fields(fields.len())?;

            let max_results = match fields.get(4).map(|value| value.trim()) {
                Some(value) if !value.is_empty() => Some(value.parse::<i32>().map_err(|_| {
                    QueryError::MalformedQuery(format!(
                        "max results '{}' is not an integer",
                        value
                    ))
                })?),
                _ => None,
            };

            return Ok(Self {
                environment: fields[0],
                regions: fields[1],
                log_group_pattern: fields[2],
                time_range: fields.get(3).copied().unwrap_or(""),
                max_results,
            });
        }

        let fields: Vec<&str> = line.splitn(4, ':').collect();
        Self::require_fields(fields.len())?;

        Ok(Self {
            environment: fields[0],
            regions: fields[1],
            log_group_pattern: fields[2],
            time_range: fields.get(3).copied().unwrap_or(""),
            max_results: None,
        })
    }

    fn require_fields(count: usize) -> Result<(), QueryError> {
        if count < 3 {
            return Err(QueryError::MalformedQuery(format!(
                "settings line needs environment, regions and log groups (found {} field{})",
                count,
                if count == 1 { "" } else { "s" }
            )));
        }
        Ok(())
    }
}

fn parse_regions(regions: &str) -> Vec<String> {
    let mut parsed: Vec<String> = Vec::new();
    for region in regions.split(',').map(str::trim) {
        if !region.is_empty() && !parsed.iter().any(|existing| existing == region) {
            parsed.push(region.to_string());
        }
    }
    parsed
}
