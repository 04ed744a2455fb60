//! Log group pattern expansion
//!
//! Patterns are comma-separated names where `*` matches any run of characters.
//! Wildcards are expanded against the full log group catalog of a region, which
//! is fetched once per `(environment, region)` and memoised in
//! [`LogGroupCatalogCache`].

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use moka::sync::Cache;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use super::api::LogsInsightsApi;
use crate::app::error::QueryError;

/// Wildcard character in log group patterns
pub const WILDCARD: char = '*';

/// Memoised log group catalogs keyed by `(environment, region)`.
///
/// Populated lazily and never expired; concurrent executions may populate the
/// same key twice, the last writer wins.
#[derive(Clone)]
pub struct LogGroupCatalogCache {
    cache: Cache<(String, String), Arc<Vec<String>>>,
}

impl LogGroupCatalogCache {
    /// Default number of `(environment, region)` catalogs kept
    pub const DEFAULT_CAPACITY: u64 = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn get(&self, environment: &str, region: &str) -> Option<Arc<Vec<String>>> {
        let entry = self
            .cache
            .get(&(environment.to_string(), region.to_string()));
        if entry.is_some() {
            tracing::debug!("Log group catalog HIT for {}/{}", environment, region);
        } else {
            tracing::debug!("Log group catalog MISS for {}/{}", environment, region);
        }
        entry
    }

    pub fn insert(&self, environment: &str, region: &str, names: Vec<String>) -> Arc<Vec<String>> {
        let names = Arc::new(names);
        self.cache.insert(
            (environment.to_string(), region.to_string()),
            names.clone(),
        );
        names
    }
}

impl Default for LogGroupCatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a pattern into its non-empty, trimmed segments
pub fn pattern_segments(pattern: &str) -> Vec<&str> {
    pattern
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Whether any segment needs the catalog to be expanded
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD)
}

/// Case-insensitive, fully anchored matcher for one pattern segment
pub fn segment_matcher(segment: &str) -> Result<Regex, QueryError> {
    let expression = format!("^{}$", regex::escape(segment).replace(r"\*", ".*"));
    RegexBuilder::new(&expression)
        .case_insensitive(true)
        .build()
        .map_err(|e| {
            QueryError::MalformedQuery(format!("invalid log group pattern '{}': {}", segment, e))
        })
}

/// Select catalog entries matching any segment, segment by segment, deduplicated
pub fn match_catalog(segments: &[&str], catalog: &[String]) -> Result<Vec<String>, QueryError> {
    let mut matched: Vec<String> = Vec::new();

    for segment in segments {
        let matcher = segment_matcher(segment)?;
        for name in catalog {
            if matcher.is_match(name) && !matched.contains(name) {
                matched.push(name.clone());
            }
        }
    }

    Ok(matched)
}

/// Drain every catalog page for a region
pub async fn fetch_catalog(client: &dyn LogsInsightsApi) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = client
            .describe_log_groups(next_token.take())
            .await
            .with_context(|| format!("Failed to fetch log group page {}", pages + 1))?;
        pages += 1;
        names.extend(page.names);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    tracing::debug!("Fetched {} log groups in {} pages", names.len(), pages);
    Ok(names)
}

/// Resolve a log group pattern for one region
pub async fn resolve_log_groups(
    client: &dyn LogsInsightsApi,
    cache: &LogGroupCatalogCache,
    environment: &str,
    region: &str,
    pattern: &str,
) -> Result<Vec<String>, QueryError> {
    let segments = pattern_segments(pattern);

    if !has_wildcard(pattern) {
        let mut literal: Vec<String> = Vec::new();
        for segment in segments {
            if !literal.iter().any(|existing| existing == segment) {
                literal.push(segment.to_string());
            }
        }
        return Ok(literal);
    }

    let catalog = match cache.get(environment, region) {
        Some(catalog) => catalog,
        None => {
            let names = fetch_catalog(client).await.map_err(|e| {
                region_error!(region, "Log group catalog fetch failed: {:#}", e);
                QueryError::LogGroupCatalogFetch {
                    region: region.to_string(),
                    message: QueryError::remote_message(&e),
                }
            })?;
            region_debug!(region, "Caching {} log group names", names.len());
            cache.insert(environment, region, names)
        }
    };

    let matched = match_catalog(&segments, &catalog)?;
    region_info!(
        region,
        "Pattern '{}' matched {} of {} log groups",
        pattern,
        matched.len(),
        catalog.len()
    );
    Ok(matched)
}
