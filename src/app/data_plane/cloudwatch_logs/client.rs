//! CloudWatch Logs Client Wrapper
//!
//! AWS SDK implementation of [`LogsInsightsApi`], one client per
//! `(environment, region)`, with credentials from the [`CredentialCoordinator`].

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_cloudwatchlogs as cloudwatchlogs;
use std::sync::Arc;

use crate::app::credentials::CredentialCoordinator;
use crate::app::error::QueryError;

use super::api::{LogsClientProvider, LogsInsightsApi};
use super::types::{
    LogGroupsPage, LogRecord, QueryHistoryEntry, QueryResultsPage, QueryStatistics, QueryStatus,
    ResultField, ResultRow, StartQueryRequest,
};

/// CloudWatch Logs client for one region
#[derive(Clone)]
pub struct CloudWatchLogsClient {
    client: cloudwatchlogs::Client,
    region: String,
}

impl CloudWatchLogsClient {
    /// Create a client from an already authenticated SDK config
    pub fn new(config: &aws_config::SdkConfig, region: &str) -> Self {
        Self {
            client: cloudwatchlogs::Client::new(config),
            region: region.to_string(),
        }
    }
}

fn remote_status(status: Option<&cloudwatchlogs::types::QueryStatus>) -> QueryStatus {
    status
        .map(|status| QueryStatus::from_remote(status.as_str()))
        .unwrap_or(QueryStatus::Unknown)
}

#[async_trait]
impl LogsInsightsApi for CloudWatchLogsClient {
    async fn describe_log_groups(&self, next_token: Option<String>) -> Result<LogGroupsPage> {
        let response = self
            .client
            .describe_log_groups()
            .set_next_token(next_token)
            .send()
            .await
            .with_context(|| format!("Failed to list log groups in {}", self.region))?;

        let mut names = Vec::new();

        if let Some(groups) = response.log_groups {
            for group in groups {
                if let Some(name) = group.log_group_name {
                    names.push(name);
                }
            }
        }

        Ok(LogGroupsPage {
            names,
            next_token: response.next_token,
        })
    }

    async fn start_query(&self, request: StartQueryRequest) -> Result<String> {
        let response = self
            .client
            .start_query()
            .query_string(request.query_string)
            .set_log_group_names(Some(request.log_group_names))
            .start_time(request.start_time)
            .end_time(request.end_time)
            .set_limit(request.limit)
            .send()
            .await
            .with_context(|| format!("StartQuery failed in {}", self.region))?;

        response
            .query_id
            .ok_or_else(|| anyhow!("StartQuery in {} returned no query id", self.region))
    }

    async fn get_query_results(&self, query_id: &str) -> Result<QueryResultsPage> {
        let response = self
            .client
            .get_query_results()
            .query_id(query_id)
            .send()
            .await
            .with_context(|| {
                format!(
                    "GetQueryResults failed for query {} in {}",
                    query_id, self.region
                )
            })?;

        let status = remote_status(response.status.as_ref());

        let mut rows = Vec::new();
        let mut value_rows = Vec::new();
        for cells in response.results.unwrap_or_default() {
            if !cells.is_empty() && cells.iter().all(|cell| cell.field.is_none()) {
                value_rows.push(
                    cells
                        .into_iter()
                        .map(|cell| cell.value.unwrap_or_default())
                        .collect(),
                );
                continue;
            }

            rows.push(ResultRow::new(
                cells
                    .into_iter()
                    .filter_map(|cell| {
                        let value = cell.value.unwrap_or_default();
                        cell.field.map(|field| ResultField::new(field, value))
                    })
                    .collect(),
            ));
        }

        let statistics = response.statistics.map(|stats| {
            QueryStatistics::new(
                stats.bytes_scanned,
                stats.records_matched,
                stats.records_scanned,
            )
        });

        Ok(QueryResultsPage {
            status,
            rows,
            value_rows,
            statistics,
        })
    }

    async fn stop_query(&self, query_id: &str) -> Result<bool> {
        let response = self
            .client
            .stop_query()
            .query_id(query_id)
            .send()
            .await
            .with_context(|| {
                format!("StopQuery failed for query {} in {}", query_id, self.region)
            })?;

        Ok(response.success)
    }

    async fn get_log_record(&self, pointer: &str) -> Result<LogRecord> {
        let response = self
            .client
            .get_log_record()
            .log_record_pointer(pointer)
            .send()
            .await
            .with_context(|| format!("GetLogRecord failed in {}", self.region))?;

        Ok(response
            .log_record
            .unwrap_or_default()
            .into_iter()
            .collect())
    }

    async fn describe_queries(&self) -> Result<Vec<QueryHistoryEntry>> {
        let response = self
            .client
            .describe_queries()
            .send()
            .await
            .with_context(|| format!("DescribeQueries failed in {}", self.region))?;

        Ok(response
            .queries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|query| {
                let status = remote_status(query.status.as_ref());
                query.query_string.map(|query_string| QueryHistoryEntry {
                    query_id: query.query_id,
                    query_string,
                    create_time: query.create_time,
                    status,
                })
            })
            .collect())
    }
}

/// Hands out SDK-backed clients authenticated through the coordinator
#[derive(Clone)]
pub struct AwsLogsClientProvider {
    credentials: Arc<CredentialCoordinator>,
}

impl AwsLogsClientProvider {
    pub fn new(credentials: Arc<CredentialCoordinator>) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl LogsClientProvider for AwsLogsClientProvider {
    async fn client(
        &self,
        environment: &str,
        region: &str,
    ) -> Result<Arc<dyn LogsInsightsApi>, QueryError> {
        let config = self.credentials.sdk_config(environment, region).await?;
        Ok(Arc::new(CloudWatchLogsClient::new(&config, region)))
    }
}
