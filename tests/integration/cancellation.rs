//! Cooperative cancellation leaves a resumable checkpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use workspace_harvester::collector::orchestrator::CHECKPOINT_FILE;
use workspace_harvester::collector::planner::ChunkWindow;
use workspace_harvester::collector::{CollectError, CollectionOrchestrator, CollectorConfig};
use workspace_harvester::resume::CollectionCheckpoint;
use workspace_harvester::shutdown::{SharedShutdown, ShutdownCoordinator};
use workspace_harvester::source::fixture::FixtureRoster;
use workspace_harvester::source::{FetchPage, FetchResult, Fetcher, UnitMetadata};
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
            "kind": "calendar#event"
        })],
        next_page_token: None,
    }
}

/// Succeeds for every unit; the interrupt arrives during cal-b's fetch,
/// which then never completes (the user hit Ctrl+C mid-call).
struct InterruptingFetcher {
    shutdown: SharedShutdown,
}

#[async_trait]
impl Fetcher for InterruptingFetcher {
    async fn fetch(
        &self,
        unit: &CollectionUnit,
        _window: &ChunkWindow,
        _page_token: Option<&str>,
        _page_size: usize,
    ) -> FetchResult<FetchPage> {
        if unit.unit_id == "cal-b" {
            self.shutdown.trigger();
            std::future::pending::<()>().await;
        }
        Ok(event_page(&unit.unit_id))
    }
}

struct PlainFetcher;

#[async_trait]
impl Fetcher for PlainFetcher {
    async fn fetch(
        &self,
        unit: &CollectionUnit,
        _window: &ChunkWindow,
        _page_token: Option<&str>,
        _page_size: usize,
    ) -> FetchResult<FetchPage> {
        Ok(event_page(&unit.unit_id))
    }
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_flushes_checkpoint_and_resume_finishes() {
    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-a", "cal-b", "cal-c"]);
    let shutdown = ShutdownCoordinator::shared();
    let fetcher = InterruptingFetcher {
        shutdown: shutdown.clone(),
    };

    let result =
        CollectionOrchestrator::new(CollectorConfig::new(data.path(), harvest_range()))
            .with_shutdown(shutdown)
            .run(&roster, &fetcher)
            .await;

    match result {
        Err(CollectError::Cancelled) => {}
        other => panic!("Expected cancellation, got {other:?}"),
    }

    // The checkpoint was flushed before exit and marks the completed unit.
    let checkpoint = CollectionCheckpoint::load(&data.path().join(CHECKPOINT_FILE)).unwrap();
    assert!(checkpoint.is_processed("cal-a"));
    assert!(!checkpoint.is_processed("cal-b"));
    assert!(!checkpoint.is_processed("cal-c"));

    let cal_a_output = data.path().join("units").join("cal-a.jsonl");
    let lines_after_interrupt = std::fs::read_to_string(&cal_a_output)
        .unwrap()
        .lines()
        .count();
    assert_eq!(lines_after_interrupt, 1);

    // Resuming with a fresh coordinator finishes the remaining units and
    // leaves the completed unit's output untouched.
    let summary = CollectionOrchestrator::new(
        CollectorConfig::new(data.path(), harvest_range()).with_resume(true),
    )
    .with_shutdown(ShutdownCoordinator::shared())
    .run(&roster, &PlainFetcher)
    .await
    .unwrap();

    assert_eq!(summary.units_processed, 3);
    assert!(summary.units_failed.is_empty());
    assert_eq!(
        std::fs::read_to_string(&cal_a_output).unwrap().lines().count(),
        1
    );
}

#[tokio::test]
async fn test_interrupt_before_start_processes_nothing() {
    let data = tempfile::TempDir::new().unwrap();
    let roster = roster_of(&["cal-a", "cal-b"]);
    let shutdown = ShutdownCoordinator::shared();
    shutdown.trigger();

    let result =
        CollectionOrchestrator::new(CollectorConfig::new(data.path(), harvest_range()))
            .with_shutdown(shutdown)
            .run(&roster, &PlainFetcher)
            .await;

    assert!(matches!(result, Err(CollectError::Cancelled)));
    let checkpoint = CollectionCheckpoint::load(&data.path().join(CHECKPOINT_FILE)).unwrap();
    assert_eq!(checkpoint.units_processed(), 0);
}
