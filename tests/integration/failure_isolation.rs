//! Unit-level failure isolation and retry classes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use workspace_harvester::collector::planner::ChunkWindow;
use workspace_harvester::collector::{CollectionOrchestrator, CollectorConfig};
use workspace_harvester::source::fixture::FixtureRoster;
use workspace_harvester::source::{FetchError, FetchPage, FetchResult, Fetcher, UnitMetadata};
use workspace_harvester::{CollectionUnit, TimeRange, UnitKind};

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn harvest_range() -> TimeRange {
    TimeRange::new(ts("2025-01-01T00:00:00Z"), ts("2025-01-02T00:00:00Z")).unwrap()
}

fn roster_of(unit_ids: &[&str]) -> FixtureRoster {
    let entities: BTreeMap<String, UnitMetadata> = unit_ids
        .iter()
        .map(|id| {
            (
                id.to_string(),
                UnitMetadata {
                    display_name: format!("{id}@example.com"),
                    kind: UnitKind::Calendar,
                },
            )
        })
        .collect();
    FixtureRoster::from_entities(entities)
}

fn event_page(unit_id: &str) -> FetchPage {
    FetchPage {
        items: vec![serde_json::json!({
            "id": format!("{unit_id}-evt"),
            "kind": "calendar#event",
            "summary": "weekly"
        })],
        next_page_token: None,
    }
}

/// Fetcher scripted per unit: permission failures, quota streaks, or
/// success, with call counting.
struct ScriptedFetcher {
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedFetcher {
    fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls_for(&self, unit_id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(unit_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        unit: &CollectionUnit,
        _window: &ChunkWindow,
        _page_token: Option<&str>,
        _page_size: usize,
    ) -> FetchResult<FetchPage> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(unit.unit_id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        match unit.unit_id.as_str() {
            "cal-denied" => Err(FetchError::PermissionDenied("calendar not shared".into())),
            "cal-flaky" if attempt <= 2 => Err(FetchError::QuotaExceeded),
            _ => Ok(event_page(&unit.unit_id)),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_one_denied_unit_never_aborts_the_run() {
    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-denied", "cal-flaky", "cal-good"]);
    let fetcher = ScriptedFetcher::new();

    let summary = CollectionOrchestrator::new(CollectorConfig::new(data.path(), harvest_range()))
        .run(&roster, &fetcher)
        .await
        .unwrap();

    // All three units completed: one failed, two collected.
    assert_eq!(summary.units_processed, 3);
    assert_eq!(
        summary.units_failed.get("cal-denied").map(String::as_str),
        Some("permission_denied")
    );
    assert_eq!(summary.units_failed.len(), 1);
    assert_eq!(summary.items_collected, 2);

    // The quota streak was retried at chunk level, not skipped.
    assert_eq!(summary.rate_limit_hits, 2);
    assert_eq!(fetcher.calls_for("cal-flaky"), 3);
    assert_eq!(fetcher.calls_for("cal-denied"), 1);

    let flaky_output = data.path().join("units").join("cal-flaky.jsonl");
    assert_eq!(
        std::fs::read_to_string(flaky_output).unwrap().lines().count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_quota_retry_budget_exhaustion_fails_the_unit() {
    struct AlwaysQuota;

    #[async_trait]
    impl Fetcher for AlwaysQuota {
        async fn fetch(
            &self,
            _unit: &CollectionUnit,
            _window: &ChunkWindow,
            _page_token: Option<&str>,
            _page_size: usize,
        ) -> FetchResult<FetchPage> {
            Err(FetchError::QuotaExceeded)
        }
    }

    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-a"]);

    let summary = CollectionOrchestrator::new(
        CollectorConfig::new(data.path(), harvest_range()).with_max_chunk_retries(2),
    )
    .run(&roster, &AlwaysQuota)
    .await
    .unwrap();

    assert_eq!(
        summary.units_failed.get("cal-a").map(String::as_str),
        Some("quota_exceeded")
    );
    assert_eq!(summary.rate_limit_hits, 3);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_call_is_abandoned_as_timeout() {
    struct HangingFetcher;

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn fetch(
            &self,
            unit: &CollectionUnit,
            _window: &ChunkWindow,
            _page_token: Option<&str>,
            _page_size: usize,
        ) -> FetchResult<FetchPage> {
            if unit.unit_id == "cal-hang" {
                std::future::pending::<()>().await;
            }
            Ok(event_page(&unit.unit_id))
        }
    }

    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-good", "cal-hang"]);

    let summary = CollectionOrchestrator::new(
        CollectorConfig::new(data.path(), harvest_range())
            .with_max_chunk_retries(1)
            .with_call_timeout(Duration::from_secs(60)),
    )
    .run(&roster, &HangingFetcher)
    .await
    .unwrap();

    assert_eq!(
        summary.units_failed.get("cal-hang").map(String::as_str),
        Some("timeout")
    );
    assert_eq!(summary.items_collected, 1);
}

#[tokio::test]
async fn test_authentication_failure_aborts_the_run() {
    struct AuthFailFetcher;

    #[async_trait]
    impl Fetcher for AuthFailFetcher {
        async fn fetch(
            &self,
            _unit: &CollectionUnit,
            _window: &ChunkWindow,
            _page_token: Option<&str>,
            _page_size: usize,
        ) -> FetchResult<FetchPage> {
            Err(FetchError::Authentication("token revoked".into()))
        }
    }

    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-a", "cal-b"]);

    let result = CollectionOrchestrator::new(CollectorConfig::new(data.path(), harvest_range()))
        .run(&roster, &AuthFailFetcher)
        .await;

    match result {
        Err(workspace_harvester::collector::CollectError::Authentication(message)) => {
            assert!(message.contains("token revoked"));
        }
        other => panic!("Expected authentication failure, got {other:?}"),
    }
    // No summary is written for an aborted run.
    assert!(!data.path().join("summary.json").exists());
}

#[tokio::test]
async fn test_malformed_items_are_skipped_not_fatal() {
    struct MixedPageFetcher;

    #[async_trait]
    impl Fetcher for MixedPageFetcher {
        async fn fetch(
            &self,
            _unit: &CollectionUnit,
            _window: &ChunkWindow,
            _page_token: Option<&str>,
            _page_size: usize,
        ) -> FetchResult<FetchPage> {
            Ok(FetchPage {
                items: vec![
                    serde_json::json!({"id": "good-1", "kind": "calendar#event"}),
                    serde_json::json!({"summary": "no id at all"}),
                    serde_json::json!({"id": "", "summary": "empty id"}),
                ],
                next_page_token: None,
            })
        }
    }

    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-a"]);

    let summary = CollectionOrchestrator::new(CollectorConfig::new(data.path(), harvest_range()))
        .run(&roster, &MixedPageFetcher)
        .await
        .unwrap();

    assert!(summary.units_failed.is_empty());
    assert_eq!(summary.items_collected, 1);
    assert_eq!(summary.items_malformed, 2);
}
