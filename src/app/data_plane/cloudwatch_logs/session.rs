//! Results session protocol
//!
//! A session owns one results view: it runs a query block, streams the merged
//! rows to the display layer and answers the view's commands. Commands and
//! messages are plain serde enums tagged by `command`, so a display layer can
//! speak JSON lines to it.
//!
//! Only one execution runs at a time. `refresh` cancels the running execution,
//! waits for it to stop and starts over with the new text; `close` cancels and
//! ends the session. `duplicate` hands back a second, independent session
//! seeded with the current query and title; it shares the log group catalog
//! but nothing else.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::aggregator::{AggregatedResult, TerminalStatus};
use super::api::LogsClientProvider;
use super::executor::{execute_query, ExecutionOptions, ExecutionProgress, RegionLogGroups};
use super::log_groups::LogGroupCatalogCache;
use super::presentation::{format_raw_table, log_record_fields};
use super::types::{QueryStatistics, ResultRow};
use crate::app::query::{QueryDefinition, TimeRange};

/// Commands sent by the display layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionCommand {
    /// Run (or re-run) a query block
    Refresh { query: String },
    /// Rename the results view; the title survives refreshes
    ChangeTitle { title: String },
    /// Fetch the full record behind a row's `@ptr`
    GoToLog { pointer: String, region: String },
    /// Render the current rows as a text table
    OpenRaw,
    /// Open a second results view for the current query
    Duplicate,
    /// Cancel any running execution and end the session
    Close,
}

/// Messages sent to the display layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionMessage {
    Started {
        title: String,
        environment: String,
        time_range: TimeRange,
        log_groups: Vec<RegionLogGroups>,
        raw: String,
    },
    Results {
        field_names: Vec<String>,
        /// The field set changed since the previous `results` message
        field_refresh: bool,
        rows: Vec<ResultRow>,
        row_count: usize,
    },
    Finished {
        status: TerminalStatus,
        title: String,
        row_count: usize,
        statistics: QueryStatistics,
    },
    /// The view was renamed
    Title {
        title: String,
    },
    LogRecord {
        fields: Vec<(String, String)>,
    },
    RawTable {
        text: String,
    },
    Error {
        message: String,
    },
}

#[derive(Default)]
struct SessionState {
    definition: Option<QueryDefinition>,
    /// Title set through `change_title`, applied to every later definition
    title: Option<String>,
    latest: Option<Arc<AggregatedResult>>,
}

struct RunningExecution {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// What the caller should do after a command
pub enum SessionOutcome {
    /// Keep sending commands
    Continue,
    /// A new session seeded with this one's query; it runs on its own
    Duplicated {
        session: QuerySession,
        messages: mpsc::UnboundedReceiver<SessionMessage>,
    },
    /// The session was closed
    Closed,
}

impl SessionOutcome {
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionOutcome::Closed)
    }
}

/// One results view and the execution feeding it
pub struct QuerySession {
    provider: Arc<dyn LogsClientProvider>,
    catalog: LogGroupCatalogCache,
    options: ExecutionOptions,
    outgoing: mpsc::UnboundedSender<SessionMessage>,
    state: Arc<Mutex<SessionState>>,
    running: Option<RunningExecution>,
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn send(outgoing: &mpsc::UnboundedSender<SessionMessage>, message: SessionMessage) {
    if outgoing.send(message).is_err() {
        tracing::debug!("Session receiver dropped, discarding message");
    }
}

impl QuerySession {
    /// Create a session and the receiver its messages arrive on
    pub fn new(
        provider: Arc<dyn LogsClientProvider>,
        catalog: LogGroupCatalogCache,
        options: ExecutionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let (outgoing, incoming) = mpsc::unbounded_channel();
        let session = Self {
            provider,
            catalog,
            options,
            outgoing,
            state: Arc::new(Mutex::new(SessionState::default())),
            running: None,
        };
        (session, incoming)
    }

    /// Definition of the latest successful parse
    pub fn definition(&self) -> Option<QueryDefinition> {
        lock(&self.state).definition.clone()
    }

    /// Latest merged rows, also after cancellation
    pub fn latest(&self) -> Option<Arc<AggregatedResult>> {
        lock(&self.state).latest.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .map(|running| !running.handle.is_finished())
            .unwrap_or(false)
    }

    /// Handle one command
    pub async fn handle(&mut self, command: SessionCommand) -> SessionOutcome {
        tracing::debug!("Session command: {:?}", command);
        match command {
            SessionCommand::Refresh { query } => self.refresh(&query).await,
            SessionCommand::ChangeTitle { title } => self.change_title(title),
            SessionCommand::GoToLog { pointer, region } => self.go_to_log(&pointer, &region).await,
            SessionCommand::OpenRaw => self.open_raw(),
            SessionCommand::Duplicate => match self.duplicate() {
                Some((session, messages)) => {
                    return SessionOutcome::Duplicated { session, messages }
                }
                None => send(&self.outgoing, SessionMessage::Error {
                    message: "No query to duplicate".to_string(),
                }),
            },
            SessionCommand::Close => {
                self.cancel().await;
                return SessionOutcome::Closed;
            }
        }
        SessionOutcome::Continue
    }

    /// A new idle session holding the current definition and title.
    ///
    /// The copy announces its title and waits for its own `refresh`.
    pub fn duplicate(&self) -> Option<(QuerySession, mpsc::UnboundedReceiver<SessionMessage>)> {
        let (definition, title) = {
            let state = lock(&self.state);
            (state.definition.clone()?, state.title.clone())
        };

        let (session, messages) = QuerySession::new(
            self.provider.clone(),
            self.catalog.clone(),
            self.options.clone(),
        );
        send(&session.outgoing, SessionMessage::Title {
            title: definition.panel_title(0),
        });
        {
            let mut state = lock(&session.state);
            state.definition = Some(definition);
            state.title = title;
        }
        tracing::info!("Duplicated query session");
        Some((session, messages))
    }

    /// Cancel the running execution, if any, and wait for it to stop
    pub async fn cancel(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                tracing::error!("Query execution task failed: {}", e);
            }
        }
    }

    /// Wait for the running execution to finish on its own
    pub async fn wait(&mut self) {
        if let Some(running) = self.running.take() {
            if let Err(e) = running.handle.await {
                tracing::error!("Query execution task failed: {}", e);
            }
        }
    }

    /// Token of the running execution, for callers that cancel from elsewhere
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.running.as_ref().map(|running| running.cancel.clone())
    }

    async fn refresh(&mut self, query: &str) {
        self.cancel().await;

        let parsed = {
            let state = lock(&self.state);
            QueryDefinition::parse(query, state.definition.as_ref()).map(|mut definition| {
                if state.title.is_some() {
                    definition.title = state.title.clone();
                }
                definition
            })
        };

        let definition = match parsed {
            Ok(definition) => definition,
            Err(e) => {
                tracing::warn!("Rejected query block: {}", e);
                send(&self.outgoing, SessionMessage::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        {
            let mut state = lock(&self.state);
            state.definition = Some(definition.clone());
            state.latest = None;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_execution(
            definition,
            self.provider.clone(),
            self.catalog.clone(),
            self.options.clone(),
            cancel.clone(),
            self.outgoing.clone(),
            self.state.clone(),
        ));
        self.running = Some(RunningExecution { cancel, handle });
    }

    fn change_title(&mut self, title: String) {
        let mut state = lock(&self.state);
        state.title = Some(title.clone());
        let row_count = state
            .latest
            .as_ref()
            .map(|result| result.row_count())
            .unwrap_or(0);

        let panel_title = match state.definition.as_mut() {
            Some(definition) => {
                definition.title = Some(title);
                definition.panel_title(row_count)
            }
            None => title,
        };
        send(&self.outgoing, SessionMessage::Title { title: panel_title });
    }

    async fn go_to_log(&mut self, pointer: &str, region: &str) {
        let Some(environment) = lock(&self.state)
            .definition
            .as_ref()
            .map(|definition| definition.environment.clone())
        else {
            send(&self.outgoing, SessionMessage::Error {
                message: "No query has been run in this session".to_string(),
            });
            return;
        };

        let client = match self.provider.client(&environment, region).await {
            Ok(client) => client,
            Err(e) => {
                send(&self.outgoing, SessionMessage::Error {
                    message: e.to_string(),
                });
                return;
            }
        };

        match client.get_log_record(pointer).await {
            Ok(record) => send(&self.outgoing, SessionMessage::LogRecord {
                fields: log_record_fields(&record),
            }),
            Err(e) => {
                region_error!(region, "Failed to fetch log record: {:#}", e);
                send(&self.outgoing, SessionMessage::Error {
                    message: format!("Failed to fetch log record in {}: {:#}", region, e),
                });
            }
        }
    }

    fn open_raw(&self) {
        let state = lock(&self.state);
        let text = match (&state.latest, &state.definition) {
            (Some(result), Some(definition)) => {
                let columns = definition
                    .field_annotations()
                    .order_columns(&result.field_names);
                format_raw_table(&columns, &result.rows)
            }
            _ => String::new(),
        };
        send(&self.outgoing, SessionMessage::RawTable { text });
    }
}

/// Body of one spawned execution
async fn run_execution(
    definition: QueryDefinition,
    provider: Arc<dyn LogsClientProvider>,
    catalog: LogGroupCatalogCache,
    options: ExecutionOptions,
    cancel: CancellationToken,
    outgoing: mpsc::UnboundedSender<SessionMessage>,
    state: Arc<Mutex<SessionState>>,
) {
    let annotations = definition.field_annotations();

    let report = execute_query(
        &definition,
        provider.as_ref(),
        &catalog,
        &options,
        &cancel,
        |progress| match progress {
            ExecutionProgress::LogGroupsResolved { log_groups } => {
                send(&outgoing, SessionMessage::Started {
                    title: definition.panel_title(0),
                    environment: definition.environment.clone(),
                    time_range: definition.time_range,
                    log_groups,
                    raw: definition.raw_text.clone(),
                })
            }
            ExecutionProgress::QueriesStarted { query_ids } => {
                tracing::debug!("Queries started: {:?}", query_ids);
            }
            ExecutionProgress::Results {
                result,
                fields_changed,
            } => {
                lock(&state).latest = Some(result.clone());
                send(&outgoing, SessionMessage::Results {
                    field_names: annotations.order_columns(&result.field_names),
                    field_refresh: fields_changed,
                    rows: result.rows.clone(),
                    row_count: result.row_count(),
                })
            }
        },
    )
    .await;

    match report {
        Ok(report) => {
            let row_count = report.result.row_count();
            let title = {
                let mut state = lock(&state);
                if let Some(current) = state.definition.as_mut() {
                    current.field_names = report.field_names.clone();
                }
                state.latest = Some(Arc::new(report.result));
                state
                    .definition
                    .as_ref()
                    .map(|current| current.panel_title(row_count))
                    .unwrap_or_else(|| definition.panel_title(row_count))
            };
            send(&outgoing, SessionMessage::Finished {
                status: report.status,
                title,
                row_count,
                statistics: report.statistics,
            });
        }
        Err(e) => {
            tracing::error!("Query execution failed: {}", e);
            send(&outgoing, SessionMessage::Error {
                message: e.to_string(),
            });
        }
    }
}
