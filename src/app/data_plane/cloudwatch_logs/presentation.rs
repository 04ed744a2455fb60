//! Text renderings of query results, log records and query history

#![warn(clippy::all, rust_2018_idioms)]

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{LogRecord, QueryHistoryEntry, ResultRow};

/// Column delimiter of the raw table
pub const RAW_TABLE_DELIMITER: &str = " | ";

/// Record fields holding epoch milliseconds
pub const TIME_FIELDS: [&str; 2] = ["@ingestionTime", "@timestamp"];

/// Render epoch milliseconds as local wall-clock time
pub fn format_local_time(epoch_ms: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|time| time.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Render rows as a width-padded text table with a header line.
///
/// Cells missing from a row are left blank; fields not listed in
/// `field_names` are not shown.
pub fn format_raw_table(field_names: &[String], rows: &[ResultRow]) -> String {
    let cells: Vec<Vec<&str>> = rows
        .iter()
        .map(|row| {
            field_names
                .iter()
                .map(|name| row.get(name).unwrap_or(""))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = field_names
        .iter()
        .enumerate()
        .map(|(column, name)| {
            cells
                .iter()
                .map(|row| row[column].chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |values: &mut dyn Iterator<Item = &str>| -> String {
        values
            .zip(&widths)
            .map(|(value, width)| format!("{:<width$}", value, width = *width))
            .collect::<Vec<_>>()
            .join(RAW_TABLE_DELIMITER)
            .trim_end()
            .to_string()
    };

    let header = render(&mut field_names.iter().map(String::as_str));
    let total_width = widths.iter().sum::<usize>()
        + RAW_TABLE_DELIMITER.len() * widths.len().saturating_sub(1);

    let mut lines = vec![header, "-".repeat(total_width)];
    for row in &cells {
        lines.push(render(&mut row.iter().copied()));
    }

    lines.join("\n")
}

/// Display value of one record field
fn record_value(field: &str, value: &str) -> String {
    if TIME_FIELDS.contains(&field) {
        if let Some(local) = value.parse::<i64>().ok().and_then(format_local_time) {
            return format!("{} (local)", local);
        }
        return value.to_string();
    }

    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| value.to_string())
        }
        _ => value.to_string(),
    }
}

/// Record fields sorted case-insensitively, with display-formatted values
pub fn log_record_fields(record: &LogRecord) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = record
        .iter()
        .map(|(field, value)| (field.clone(), record_value(field, value)))
        .collect();
    fields.sort_by_key(|(field, _)| field.to_lowercase());
    fields
}

/// Render a log record as aligned `field  value` lines
pub fn format_log_record(record: &LogRecord) -> String {
    let fields = log_record_fields(record);
    let width = fields
        .iter()
        .map(|(field, _)| field.chars().count())
        .max()
        .unwrap_or(0);
    let indent = " ".repeat(width + 2);

    let mut out = String::new();
    for (field, value) in &fields {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or("");
        out.push_str(&format!("{:<width$}  {}\n", field, first, width = width));
        for line in lines {
            out.push_str(&indent);
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// One distinct query string from the remote history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub query_string: String,
    /// Newest create time among the runs of this query, unix milliseconds
    pub create_time: Option<i64>,
}

/// Drop the `SOURCE ... | ` clause the service prepends to stored queries
pub fn strip_source_prefix(query_string: &str) -> &str {
    if !query_string.starts_with("SOURCE ") {
        return query_string;
    }
    match query_string.split_once('|') {
        Some((_, rest)) => rest.strip_prefix(' ').unwrap_or(rest),
        None => query_string,
    }
}

/// Group history entries by query string, newest first
pub fn group_query_history(entries: &[QueryHistoryEntry]) -> Vec<HistoryItem> {
    let mut items: Vec<HistoryItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let query_string = strip_source_prefix(&entry.query_string).to_string();
        match index.get(&query_string) {
            Some(&position) => {
                let item = &mut items[position];
                item.create_time = item.create_time.max(entry.create_time);
            }
            None => {
                index.insert(query_string.clone(), items.len());
                items.push(HistoryItem {
                    query_string,
                    create_time: entry.create_time,
                });
            }
        }
    }

    // Option orders None first, so reversing puts undated entries last
    items.sort_by(|a, b| b.create_time.cmp(&a.create_time));
    items
}

/// Render grouped history as a text document
pub fn format_history(items: &[HistoryItem]) -> String {
    let mut out = format!("Query History ({})\n\n", items.len());
    for item in items {
        let time = item
            .create_time
            .and_then(format_local_time)
            .unwrap_or_else(|| "unknown time".to_string());
        out.push_str(&time);
        out.push('\n');
        out.push_str(item.query_string.trim());
        out.push_str("\n\n");
    }
    out
}
