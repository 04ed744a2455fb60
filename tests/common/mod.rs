//! Scripted CloudWatch Logs clients for driving the engine without AWS

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cwquery::app::data_plane::cloudwatch_logs::{
    LogGroupsPage, LogRecord, LogsClientProvider, LogsInsightsApi, QueryHistoryEntry,
    QueryResultsPage, QueryStatus, ResultRow, StartQueryRequest,
};
use cwquery::QueryError;

/// Rows `{@timestamp, @message, @ptr}` tagged with the region
pub fn rows(region: &str, count: usize) -> Vec<ResultRow> {
    (0..count)
        .map(|index| {
            ResultRow::from_pairs([
                ("@timestamp", format!("2024-01-01 00:00:0{}", index)),
                ("@message", format!("{} message {}", region, index)),
                ("@ptr", format!("{}-ptr-{}", region, index)),
            ])
        })
        .collect()
}

pub fn page(status: QueryStatus, rows: Vec<ResultRow>) -> QueryResultsPage {
    QueryResultsPage::new(status, rows)
}

/// A fake region: scripted catalog pages, submit outcome and poll responses
pub struct ScriptedLogsApi {
    pub region: String,
    query_id: String,
    catalog_pages: Vec<Vec<String>>,
    catalog_error: Option<String>,
    start_error: Option<String>,
    /// Served in order; the last one repeats once exhausted
    polls: Vec<QueryResultsPage>,
    poll_error_at: Option<usize>,
    records: HashMap<String, LogRecord>,
    history: Vec<QueryHistoryEntry>,

    pub describe_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub started: Mutex<Vec<StartQueryRequest>>,
}

impl ScriptedLogsApi {
    pub fn new(region: &str) -> Self {
        Self {
            region: region.to_string(),
            query_id: format!("query-{}", region),
            catalog_pages: Vec::new(),
            catalog_error: None,
            start_error: None,
            polls: vec![page(QueryStatus::Complete, Vec::new())],
            poll_error_at: None,
            records: HashMap::new(),
            history: Vec::new(),
            describe_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn with_polls(mut self, polls: Vec<QueryResultsPage>) -> Self {
        self.polls = polls;
        self
    }

    pub fn with_catalog(mut self, pages: &[&[&str]]) -> Self {
        self.catalog_pages = pages
            .iter()
            .map(|names| names.iter().map(|name| name.to_string()).collect())
            .collect();
        self
    }

    pub fn failing_catalog(mut self, message: &str) -> Self {
        self.catalog_error = Some(message.to_string());
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    /// Fail the poll call with the given zero-based index
    pub fn failing_poll_at(mut self, call: usize) -> Self {
        self.poll_error_at = Some(call);
        self
    }

    pub fn with_record(mut self, pointer: &str, fields: &[(&str, &str)]) -> Self {
        self.records.insert(
            pointer.to_string(),
            fields
                .iter()
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .collect(),
        );
        self
    }

    pub fn with_history(mut self, history: Vec<QueryHistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn describes(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn started_requests(&self) -> Vec<StartQueryRequest> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogsInsightsApi for ScriptedLogsApi {
    async fn describe_log_groups(&self, next_token: Option<String>) -> Result<LogGroupsPage> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.catalog_error {
            return Err(anyhow!(message.clone()));
        }

        let index: usize = match next_token {
            Some(token) => token.parse()?,
            None => 0,
        };
        let names = self.catalog_pages.get(index).cloned().unwrap_or_default();
        let next_token = (index + 1 < self.catalog_pages.len()).then(|| (index + 1).to_string());
        Ok(LogGroupsPage { names, next_token })
    }

    async fn start_query(&self, request: StartQueryRequest) -> Result<String> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.start_error {
            return Err(anyhow!(message.clone()));
        }
        self.started.lock().unwrap().push(request);
        Ok(self.query_id.clone())
    }

    async fn get_query_results(&self, query_id: &str) -> Result<QueryResultsPage> {
        assert_eq!(query_id, self.query_id);
        let call = self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if self.poll_error_at == Some(call) {
            return Err(anyhow!("ThrottlingException: rate exceeded"));
        }
        let index = call.min(self.polls.len() - 1);
        Ok(self.polls[index].clone())
    }

    async fn stop_query(&self, query_id: &str) -> Result<bool> {
        assert_eq!(query_id, self.query_id);
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn get_log_record(&self, pointer: &str) -> Result<LogRecord> {
        self.records
            .get(pointer)
            .cloned()
            .ok_or_else(|| anyhow!("no record {}", pointer))
    }

    async fn describe_queries(&self) -> Result<Vec<QueryHistoryEntry>> {
        Ok(self.history.clone())
    }
}

/// Provider handing out the scripted regions; unknown regions fail authentication
#[derive(Default)]
pub struct ScriptedProvider {
    regions: HashMap<String, Arc<ScriptedLogsApi>>,
}

impl ScriptedProvider {
    pub fn new(regions: Vec<ScriptedLogsApi>) -> Self {
        Self {
            regions: regions
                .into_iter()
                .map(|api| (api.region.clone(), Arc::new(api)))
                .collect(),
        }
    }

    pub fn region(&self, region: &str) -> Arc<ScriptedLogsApi> {
        self.regions[region].clone()
    }
}

#[async_trait]
impl LogsClientProvider for ScriptedProvider {
    async fn client(
        &self,
        environment: &str,
        region: &str,
    ) -> Result<Arc<dyn LogsInsightsApi>, QueryError> {
        match self.regions.get(region) {
            Some(api) => Ok(api.clone() as Arc<dyn LogsInsightsApi>),
            None => Err(QueryError::Credentials {
                environment: environment.to_string(),
                region: region.to_string(),
                message: "could not find credentials".to_string(),
            }),
        }
    }
}
