//! Field annotations declared inline in the query body
//!
//! `fields a, b as c` and `display x, y as z` clauses decide which columns are
//! shown and under which names. The last `display` clause wins over `fields`.

#![warn(clippy::all, rust_2018_idioms)]

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::app::data_plane::cloudwatch_logs::types::ResultRow;

/// Columns shown when the query declares neither `display` nor `fields`
pub const DEFAULT_DISPLAY_FIELDS: [&str; 2] = ["@timestamp", "@message"];

static ALIASED_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)^(.+?)\s+as\s+(\S+)$").expect("valid alias regex"));

/// Which directive the display names came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    Display,
    Fields,
    Default,
}

/// Display field names and alias mapping resolved from a query body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAnnotations {
    pub display_field_names: Vec<String>,
    pub alias_to_source: HashMap<String, String>,
    pub source: FieldSource,
}

struct FieldEntry {
    name: String,
    alias: Option<String>,
}

impl FieldEntry {
    fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl FieldAnnotations {
    /// Scan `query_text` for `fields` and `display` clauses
    pub fn resolve(query_text: &str) -> Self {
        let mut fields_entries: Option<Vec<FieldEntry>> = None;
        let mut display_entries: Option<Vec<FieldEntry>> = None;
        let mut alias_to_source = HashMap::new();

        for clause in query_text.split('|') {
            let Some((keyword, list)) = split_directive(clause) else {
                continue;
            };

            let entries = parse_entries(list);
            for entry in &entries {
                if let Some(alias) = &entry.alias {
                    alias_to_source.insert(alias.clone(), entry.name.clone());
                }
            }

            match keyword.as_str() {
                "display" => display_entries = Some(entries),
                _ => {
                    if fields_entries.is_none() {
                        fields_entries = Some(entries);
                    }
                }
            }
        }

        let (source, entries) = match (display_entries, fields_entries) {
            (Some(entries), _) => (FieldSource::Display, entries),
            (None, Some(entries)) => (FieldSource::Fields, entries),
            (None, None) => {
                return Self {
                    display_field_names: DEFAULT_DISPLAY_FIELDS
                        .iter()
                        .map(|name| name.to_string())
                        .collect(),
                    alias_to_source,
                    source: FieldSource::Default,
                }
            }
        };

        Self {
            display_field_names: entries
                .iter()
                .map(|entry| entry.display_name().to_string())
                .collect(),
            alias_to_source,
            source,
        }
    }

    /// Name of the field a display column was derived from
    pub fn source_name<'a>(&'a self, display_name: &'a str) -> &'a str {
        self.alias_to_source
            .get(display_name)
            .map(String::as_str)
            .unwrap_or(display_name)
    }

    /// Put declared display columns first, then the remaining observed fields
    pub fn order_columns(&self, observed: &[String]) -> Vec<String> {
        let mut ordered: Vec<String> = self
            .display_field_names
            .iter()
            .filter(|name| observed.contains(name))
            .cloned()
            .collect();

        for name in observed {
            if !ordered.contains(name) {
                ordered.push(name.clone());
            }
        }

        ordered
    }

    /// Pair value-only rows with the resolved display names
    pub fn rows_from_values(&self, rows: Vec<Vec<String>>) -> Vec<ResultRow> {
        rows.into_iter()
            .map(|values| ResultRow::from_values(&self.display_field_names, values))
            .collect()
    }
}

/// Split a clause into its lowercased directive keyword and field list
fn split_directive(clause: &str) -> Option<(String, &str)> {
    let clause = clause.trim();
    let keyword_end = clause.find(char::is_whitespace)?;
    let keyword = clause[..keyword_end].to_lowercase();

    match keyword.as_str() {
        "fields" | "display" => Some((keyword, clause[keyword_end..].trim())),
        _ => None,
    }
}

fn parse_entries(list: &str) -> Vec<FieldEntry> {
    split_top_level(list)
        .into_iter()
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match ALIASED_ENTRY.captures(entry) {
            Some(captures) => FieldEntry {
                name: captures[1].trim().to_string(),
                alias: Some(captures[2].to_string()),
            },
            None => FieldEntry {
                name: entry.to_string(),
                alias: None,
            },
        })
        .collect()
}

/// Split on commas that are not nested inside parentheses
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, ch) in list.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);

    parts
}
