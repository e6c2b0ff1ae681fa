//! Checkpoint resumption across invocations.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use workspace_harvester::collector::orchestrator::CHECKPOINT_FILE;
use workspace_harvester::collector::{CollectionOrchestrator, CollectorConfig};
use workspace_harvester::resume::CollectionCheckpoint;
use workspace_harvester::source::fixture::{FixtureFetcher, FixtureRoster};
use workspace_harvester::TimeRange;

const UNIT_IDS: [&str; 5] = ["cal-u1", "cal-u2", "cal-u3", "cal-u4", "cal-u5"];

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn harvest_range() -> TimeRange {
    TimeRange::new(ts("2025-01-01T00:00:00Z"), ts("2025-01-04T00:00:00Z")).unwrap()
}

fn write_fixtures(dir: &Path) {
    let mut roster = serde_json::Map::new();
    for unit_id in UNIT_IDS {
        roster.insert(
            unit_id.to_string(),
            serde_json::json!({"display_name": format!("{unit_id}@example.com"), "kind": "calendar"}),
        );
        let mut file = std::fs::File::create(dir.join(format!("{unit_id}.jsonl"))).unwrap();
        writeln!(
            file,
            "{}",
            serde_json::json!({"id": format!("{unit_id}-evt"), "kind": "calendar#event",
                "start": {"dateTime": "2025-01-02T09:00:00Z"}})
        )
        .unwrap();
    }
    std::fs::write(
        dir.join("roster.json"),
        serde_json::Value::Object(roster).to_string(),
    )
    .unwrap();
}

fn unit_lines(data_dir: &Path, unit_id: &str) -> usize {
    let path = data_dir.join("units").join(format!("{unit_id}.jsonl"));
    if !path.exists() {
        return 0;
    }
    std::fs::read_to_string(path).unwrap().lines().count()
}

fn change_lines(data_dir: &Path) -> usize {
    std::fs::read_to_string(data_dir.join("catalog").join("changes.jsonl"))
        .unwrap()
        .lines()
        .count()
}

#[tokio::test]
async fn test_bounded_invocation_then_resume_completes_the_run() {
    let fixtures = tempfile::TempDir::new().unwrap();
    let data = tempfile::TempDir::new().unwrap();
    write_fixtures(fixtures.path());

    let roster = FixtureRoster::from_file(fixtures.path().join("roster.json")).unwrap();
    let fetcher = FixtureFetcher::new(fixtures.path());

    // First invocation is bounded to three units, standing in for a run
    // that stopped after unit 3 of 5.
    let first = CollectionOrchestrator::new(
        CollectorConfig::new(data.path(), harvest_range()).with_max_units(3),
    )
    .run(&roster, &fetcher)
    .await
    .unwrap();
    assert_eq!(first.units_processed, 3);

    for unit_id in &UNIT_IDS[..3] {
        assert_eq!(unit_lines(data.path(), unit_id), 1, "{unit_id} output");
    }
    for unit_id in &UNIT_IDS[3..] {
        assert_eq!(unit_lines(data.path(), unit_id), 0, "{unit_id} output");
    }
    assert_eq!(change_lines(data.path()), 3);

    let checkpoint = CollectionCheckpoint::load(&data.path().join(CHECKPOINT_FILE)).unwrap();
    assert_eq!(checkpoint.units_processed(), 3);
    assert!(checkpoint.is_processed("cal-u3"));
    assert!(!checkpoint.is_processed("cal-u4"));

    // Resume processes exactly the remaining units.
    let second = CollectionOrchestrator::new(
        CollectorConfig::new(data.path(), harvest_range()).with_resume(true),
    )
    .run(&roster, &fetcher)
    .await
    .unwrap();

    assert_eq!(second.units_processed, 5);
    assert_eq!(second.run_id, first.run_id);
    // Already-written units were not re-fetched or re-appended.
    for unit_id in UNIT_IDS {
        assert_eq!(unit_lines(data.path(), unit_id), 1, "{unit_id} output");
    }
    // No duplicate change records for already-classified items.
    assert_eq!(change_lines(data.path()), 5);
}

#[tokio::test]
async fn test_resume_without_checkpoint_starts_fresh() {
    let fixtures = tempfile::TempDir::new().unwrap();
    let data = tempfile::TempDir::new().unwrap();
    write_fixtures(fixtures.path());

    let roster = FixtureRoster::from_file(fixtures.path().join("roster.json")).unwrap();
    let fetcher = FixtureFetcher::new(fixtures.path());

    let summary = CollectionOrchestrator::new(
        CollectorConfig::new(data.path(), harvest_range()).with_resume(true),
    )
    .run(&roster, &fetcher)
    .await
    .unwrap();
    assert_eq!(summary.units_processed, 5);
}
