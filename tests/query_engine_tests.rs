mod common;

use common::{page, rows, ScriptedLogsApi, ScriptedProvider};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cwquery::app::data_plane::cloudwatch_logs::{
    execute_query, ExecutionOptions, ExecutionProgress, ExecutionReport, LogGroupCatalogCache,
    QueryResultsPage, QueryStatistics, QueryStatus, ResultRow, TerminalStatus,
};
use cwquery::app::query::QueryDefinition;
use cwquery::QueryError;

fn definition(settings: &str) -> QueryDefinition {
    QueryDefinition::parse(
        &format!("{}\nfields @timestamp, @message\n| sort @timestamp desc", settings),
        None,
    )
    .unwrap()
}

/// Run to completion, collecting `(row_count, fields_changed)` per update
async fn run(
    definition: &QueryDefinition,
    provider: &ScriptedProvider,
    catalog: &LogGroupCatalogCache,
) -> (Result<ExecutionReport, QueryError>, Vec<(usize, bool)>) {
    let mut updates = Vec::new();
    let report = execute_query(
        definition,
        provider,
        catalog,
        &ExecutionOptions::default(),
        &CancellationToken::new(),
        |progress| {
            if let ExecutionProgress::Results {
                result,
                fields_changed,
            } = progress
            {
                updates.push((result.row_count(), fields_changed));
            }
        },
    )
    .await;
    (report, updates)
}

fn two_region_provider() -> ScriptedProvider {
    ScriptedProvider::new(vec![
        ScriptedLogsApi::new("us-east-1")
            .with_polls(vec![page(QueryStatus::Complete, rows("us-east-1", 3))]),
        ScriptedLogsApi::new("us-west-2").with_polls(vec![
            page(QueryStatus::Running, rows("us-west-2", 1)),
            page(QueryStatus::Running, rows("us-west-2", 3)),
            page(QueryStatus::Complete, rows("us-west-2", 5)),
        ]),
    ])
}

#[tokio::test(start_paused = true)]
async fn test_regions_completing_at_different_times_are_merged() {
    let provider = two_region_provider();
    let definition = definition("prod;us-east-1,us-west-2;/svc/orders;1h");

    let (report, updates) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;
    let report = report.unwrap();

    assert_eq!(report.status, TerminalStatus::Completed);
    assert_eq!(updates, vec![(4, true), (6, false), (8, false)]);
    assert_eq!(report.result.row_count(), 8);
    assert_eq!(report.result.field_names, vec!["@timestamp", "@message"]);
    assert_eq!(report.result.region_of(2), Some("us-east-1"));
    assert_eq!(report.result.region_of(3), Some("us-west-2"));
    assert_eq!(
        report.field_names,
        Some(vec!["@timestamp".to_string(), "@message".to_string()])
    );

    // Settled regions are not polled again
    assert_eq!(provider.region("us-east-1").polls(), 1);
    assert_eq!(provider.region("us-west-2").polls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_submit_carries_query_and_time_range_in_seconds() {
    let provider = two_region_provider();
    let definition = QueryDefinition::parse_at(
        "prod;us-east-1,us-west-2;/svc/orders, /svc/billing;2023-01-01T00:00:00->2023-01-02T00:00:00;50\nfields @message",
        None,
        0,
    )
    .unwrap();

    run(&definition, &provider, &LogGroupCatalogCache::new())
        .await
        .0
        .unwrap();

    let requests = provider.region("us-west-2").started_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query_string, "fields @message");
    assert_eq!(requests[0].log_group_names, vec!["/svc/orders", "/svc/billing"]);
    assert_eq!(requests[0].start_time, 1_672_531_200);
    assert_eq!(requests[0].end_time, 1_672_617_600);
    assert_eq!(requests[0].limit, Some(50));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_second_poll_keeps_rows_gathered_so_far() {
    let provider = two_region_provider();
    let definition = definition("prod;us-east-1,us-west-2;/svc/orders;1h");
    let cancel = CancellationToken::new();
    let mut updates = 0;

    let report = execute_query(
        &definition,
        &provider,
        &LogGroupCatalogCache::new(),
        &ExecutionOptions::default(),
        &cancel,
        |progress| {
            if let ExecutionProgress::Results { .. } = progress {
                updates += 1;
                if updates == 2 {
                    cancel.cancel();
                }
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(report.status, TerminalStatus::Canceled);
    assert_eq!(updates, 2);
    assert_eq!(provider.region("us-west-2").polls(), 2);
    assert_eq!(report.result.row_count(), 6);
    assert!(report.result.row_count() < 8);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_sleep_stops_without_further_polls() {
    let provider = ScriptedProvider::new(vec![ScriptedLogsApi::new("us-east-1")
        .with_polls(vec![page(QueryStatus::Running, rows("us-east-1", 2))])]);
    let definition = definition("prod;us-east-1;/svc/orders;1h");
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            cancel.cancel();
        })
    };

    let report = execute_query(
        &definition,
        &provider,
        &LogGroupCatalogCache::new(),
        &ExecutionOptions::default(),
        &cancel,
        |_| {},
    )
    .await
    .unwrap();
    canceller.await.unwrap();

    assert_eq!(report.status, TerminalStatus::Canceled);
    // Polls at 0s, 1s and 2s; cancelled while sleeping towards 3s
    assert_eq!(provider.region("us-east-1").polls(), 3);
    assert_eq!(report.result.row_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_submit_failure_in_second_region_stops_everything() {
    let provider = ScriptedProvider::new(vec![
        ScriptedLogsApi::new("us-east-1"),
        ScriptedLogsApi::new("eu-west-1")
            .failing_start("MalformedQueryException: unexpected symbol"),
        ScriptedLogsApi::new("ap-south-1"),
    ]);
    let definition = definition("prod;us-east-1,eu-west-1,ap-south-1;/svc/orders;1h");

    let (report, updates) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;

    assert_eq!(
        report.unwrap_err(),
        QueryError::QuerySubmit {
            region: "eu-west-1".to_string(),
            message: "MalformedQueryException: unexpected symbol".to_string(),
        }
    );
    assert!(updates.is_empty());
    assert_eq!(provider.region("us-east-1").stops(), 1);
    assert_eq!(provider.region("ap-south-1").starts(), 0);
    for region in ["us-east-1", "eu-west-1", "ap-south-1"] {
        assert_eq!(provider.region(region).polls(), 0, "{} was polled", region);
    }
}

#[tokio::test(start_paused = true)]
async fn test_catalog_failure_aborts_before_any_submit() {
    let provider = ScriptedProvider::new(vec![
        ScriptedLogsApi::new("us-east-1").with_catalog(&[&["/svc/a-1"]]),
        ScriptedLogsApi::new("us-west-2").failing_catalog("AccessDeniedException"),
    ]);
    let definition = definition("prod;us-east-1,us-west-2;/svc/a-*;1h");

    let (report, _) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;

    match report.unwrap_err() {
        QueryError::LogGroupCatalogFetch { region, message } => {
            assert_eq!(region, "us-west-2");
            assert!(message.contains("AccessDeniedException"), "{}", message);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(provider.region("us-east-1").starts(), 0);
    assert_eq!(provider.region("us-west-2").starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wildcards_expand_against_every_catalog_page_once() {
    let provider = ScriptedProvider::new(vec![ScriptedLogsApi::new("us-east-1").with_catalog(&[
        &["/svc/a-1", "/other"],
        &["/SVC/A-2"],
        &["/svc/b-1"],
    ])]);
    let definition = definition("prod;us-east-1;/svc/a-*,/svc/b-1;1h");
    let catalog = LogGroupCatalogCache::new();

    let report = run(&definition, &provider, &catalog).await.0.unwrap();
    assert_eq!(report.log_groups[0].log_groups, vec!["/svc/a-1", "/SVC/A-2", "/svc/b-1"]);
    assert_eq!(provider.region("us-east-1").describes(), 3);

    // A second execution reuses the memoised catalog
    run(&definition, &provider, &catalog).await.0.unwrap();
    assert_eq!(provider.region("us-east-1").describes(), 3);

    let requests = provider.region("us-east-1").started_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].log_group_names, vec!["/svc/a-1", "/SVC/A-2", "/svc/b-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_literal_patterns_skip_the_catalog() {
    let provider = ScriptedProvider::new(vec![ScriptedLogsApi::new("us-east-1")]);
    let definition = definition("prod;us-east-1;/svc/a, /svc/b ,/svc/a;1h");

    let report = run(&definition, &provider, &LogGroupCatalogCache::new())
        .await
        .0
        .unwrap();

    assert_eq!(report.log_groups[0].log_groups, vec!["/svc/a", "/svc/b"]);
    assert_eq!(provider.region("us-east-1").describes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_error_aborts_after_streamed_updates() {
    let provider = ScriptedProvider::new(vec![
        ScriptedLogsApi::new("us-east-1")
            .with_polls(vec![page(QueryStatus::Running, rows("us-east-1", 2))])
            .failing_poll_at(1),
        ScriptedLogsApi::new("us-west-2")
            .with_polls(vec![page(QueryStatus::Running, rows("us-west-2", 1))]),
    ]);
    let definition = definition("prod;us-east-1,us-west-2;/svc/orders;1h");

    let (report, updates) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;

    assert_eq!(updates, vec![(3, true)]);
    match report.unwrap_err() {
        QueryError::QueryPoll {
            region, query_id, ..
        } => {
            assert_eq!(region, "us-east-1");
            assert_eq!(query_id, "query-us-east-1");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_region_settles_and_keeps_its_snapshot() {
    let provider = ScriptedProvider::new(vec![
        ScriptedLogsApi::new("us-east-1").with_polls(vec![
            page(QueryStatus::Running, rows("us-east-1", 1)),
            page(QueryStatus::Complete, rows("us-east-1", 2)),
        ]),
        ScriptedLogsApi::new("us-west-2").with_polls(vec![page(QueryStatus::Failed, Vec::new())]),
    ]);
    let definition = definition("prod;us-east-1,us-west-2;/svc/orders;1h");

    let (report, updates) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;
    let report = report.unwrap();

    assert_eq!(report.status, TerminalStatus::Completed);
    assert_eq!(report.failed_regions, vec!["us-west-2"]);
    assert_eq!(report.result.row_count(), 2);
    assert_eq!(updates.len(), 2);
    assert_eq!(provider.region("us-west-2").polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_field_set_change_is_flagged() {
    let provider = ScriptedProvider::new(vec![ScriptedLogsApi::new("us-east-1").with_polls(vec![
        page(
            QueryStatus::Running,
            vec![ResultRow::from_pairs([
                ("@message", "a"),
                ("@ptr", "p1"),
            ])],
        ),
        page(
            QueryStatus::Complete,
            vec![
                ResultRow::from_pairs([
                    ("@message", "a"),
                    ("@ptr", "p1"),
                ]),
                ResultRow::from_pairs([
                    ("level", "ERROR"),
                    ("@message", "b"),
                    ("@ptr", "p2"),
                ]),
            ],
        ),
    ])]);
    let definition = definition("prod;us-east-1;/svc/orders;1h");

    let (report, updates) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;

    assert_eq!(updates, vec![(1, true), (2, true)]);
    assert_eq!(report.unwrap().result.field_names, vec!["@message", "level"]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credentials_abort_before_any_call() {
    let provider = ScriptedProvider::new(vec![ScriptedLogsApi::new("us-east-1")]);
    let definition = definition("prod;us-east-1,sa-east-1;/svc/orders;1h");

    let (report, _) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;

    assert_eq!(report.unwrap_err().region(), Some("sa-east-1"));
    assert_eq!(provider.region("us-east-1").starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_value_list_rows_take_display_names() {
    let provider = ScriptedProvider::new(vec![ScriptedLogsApi::new("us-east-1").with_polls(
        vec![QueryResultsPage::from_values(
            QueryStatus::Complete,
            vec![
                vec!["disk full".to_string(), "2024-01-01 00:00:00".to_string()],
                vec!["retrying".to_string(), "2024-01-01 00:00:01".to_string()],
            ],
        )],
    )]);
    let definition = QueryDefinition::parse(
        "prod;us-east-1;/svc/orders;1h\nfields @timestamp, @message\n| display @message as msg, @timestamp",
        None,
    )
    .unwrap();

    let (report, updates) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;
    let report = report.unwrap();

    assert_eq!(updates, vec![(2, true)]);
    assert_eq!(report.result.field_names, vec!["msg", "@timestamp"]);
    assert_eq!(report.result.rows[1].get("msg"), Some("retrying"));
    assert_eq!(
        report.result.rows[0].get("@timestamp"),
        Some("2024-01-01 00:00:00")
    );
}

#[tokio::test(start_paused = true)]
async fn test_statistics_are_summed_over_latest_region_reports() {
    let provider = ScriptedProvider::new(vec![
        ScriptedLogsApi::new("us-east-1").with_polls(vec![page(
            QueryStatus::Complete,
            rows("us-east-1", 2),
        )
        .with_statistics(QueryStatistics::new(100.0, 2.0, 10.0))]),
        ScriptedLogsApi::new("us-west-2").with_polls(vec![
            page(QueryStatus::Running, Vec::new()),
            page(QueryStatus::Running, rows("us-west-2", 1))
                .with_statistics(QueryStatistics::new(50.0, 1.0, 3.0)),
            page(QueryStatus::Complete, rows("us-west-2", 1))
                .with_statistics(QueryStatistics::new(60.0, 1.0, 5.0)),
        ]),
    ]);
    let definition = definition("prod;us-east-1,us-west-2;/svc/orders;1h");

    let (report, _) = run(&definition, &provider, &LogGroupCatalogCache::new()).await;

    assert_eq!(
        report.unwrap().statistics,
        QueryStatistics::new(160.0, 3.0, 15.0)
    );
}
