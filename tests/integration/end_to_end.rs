//! Full pipeline runs over fixture-backed sources.

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use workspace_harvester::collector::{CollectionOrchestrator, CollectionSummary, CollectorConfig};
use workspace_harvester::source::fixture::{FixtureFetcher, FixtureRoster};
use workspace_harvester::TimeRange;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn harvest_range() -> TimeRange {
    TimeRange::new(ts("2025-01-01T00:00:00Z"), ts("2025-01-11T00:00:00Z")).unwrap()
}

fn write_lines(path: &Path, lines: &[serde_json::Value]) {
    let mut file = std::fs::File::create(path).unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
}

fn write_fixtures(dir: &Path) {
    write_lines(
        &dir.join("roster.json"),
        &[serde_json::json!({
            "cal-alice": {"display_name": "alice@example.com", "kind": "calendar"},
            "drive-docs": {"display_name": "shared drive listing", "kind": "drive_query"}
        })],
    );
    write_lines(
        &dir.join("cal-alice.jsonl"),
        &[
            serde_json::json!({"id": "evt-1", "kind": "calendar#event", "summary": "standup",
                "start": {"dateTime": "2025-01-02T10:00:00Z"}, "end": {"dateTime": "2025-01-02T10:30:00Z"}}),
            serde_json::json!({"id": "evt-2", "kind": "calendar#event", "summary": "retro",
                "start": {"dateTime": "2025-01-09T15:00:00Z"}, "end": {"dateTime": "2025-01-09T16:00:00Z"}}),
        ],
    );
    write_lines(
        &dir.join("drive-docs.jsonl"),
        &[
            serde_json::json!({"id": "doc-1", "name": "roadmap",
                "mimeType": "application/vnd.google-apps.document", "size": "12000"}),
            serde_json::json!({"id": "pdf-1", "name": "contract.pdf",
                "mimeType": "application/pdf", "size": "450000"}),
            serde_json::json!({"id": "bin-1", "name": "dump.bin",
                "mimeType": "application/octet-stream", "size": "3000000"}),
        ],
    );
}

fn config(data_dir: &Path) -> CollectorConfig {
    CollectorConfig::new(data_dir, harvest_range())
        .with_max_chunk_span(chrono::Duration::days(7))
        .with_removal_detection(true)
}

#[tokio::test]
async fn test_full_collection_pipeline() {
    let fixtures = tempfile::TempDir::new().unwrap();
    let data = tempfile::TempDir::new().unwrap();
    write_fixtures(fixtures.path());

    let roster = FixtureRoster::from_file(fixtures.path().join("roster.json")).unwrap();
    let fetcher = FixtureFetcher::new(fixtures.path());
    let orchestrator = CollectionOrchestrator::new(config(data.path()));

    let summary = orchestrator.run(&roster, &fetcher).await.unwrap();

    assert_eq!(summary.units_total, 2);
    assert_eq!(summary.units_processed, 2);
    assert!(summary.units_failed.is_empty());
    assert_eq!(summary.items_collected, 5);
    assert_eq!(summary.items_malformed, 0);
    assert_eq!(summary.changes_added, 5);
    assert_eq!(summary.changes_modified, 0);
    assert_eq!(summary.changes_removed, 0);
    // One call per calendar chunk (7d + 3d) plus one for the drive query.
    assert_eq!(summary.api_calls, 3);

    assert_eq!(summary.categories.get("calendar_event"), Some(&2));
    assert_eq!(summary.categories.get("document"), Some(&1));
    assert_eq!(summary.categories.get("pdf"), Some(&1));
    assert_eq!(summary.categories.get("other"), Some(&1));
    // 2 events x1 + document x5 + pdf x8 + other x0
    assert_eq!(summary.estimated_processing_cost, 15);

    // Per-unit output carries the collection metadata on every line.
    let contents =
        std::fs::read_to_string(data.path().join("units").join("cal-alice.jsonl")).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["_unit_id"], "cal-alice");
        assert!(value["_collected_at"].is_string());
    }

    // The summary is also persisted for the status command.
    let persisted = CollectionSummary::load(data.path()).unwrap().unwrap();
    assert_eq!(persisted.run_id, summary.run_id);
}

#[tokio::test]
async fn test_rerun_detects_modifications_and_removals() {
    let fixtures = tempfile::TempDir::new().unwrap();
    let data = tempfile::TempDir::new().unwrap();
    write_fixtures(fixtures.path());

    let roster = FixtureRoster::from_file(fixtures.path().join("roster.json")).unwrap();
    let fetcher = FixtureFetcher::new(fixtures.path());

    CollectionOrchestrator::new(config(data.path()))
        .run(&roster, &fetcher)
        .await
        .unwrap();

    // The document is renamed and the pdf disappears from the listing.
    write_lines(
        &fixtures.path().join("drive-docs.jsonl"),
        &[
            serde_json::json!({"id": "doc-1", "name": "roadmap-v2",
                "mimeType": "application/vnd.google-apps.document", "size": "12000"}),
            serde_json::json!({"id": "bin-1", "name": "dump.bin",
                "mimeType": "application/octet-stream", "size": "3000000"}),
        ],
    );

    let summary = CollectionOrchestrator::new(config(data.path()))
        .run(&roster, &fetcher)
        .await
        .unwrap();

    assert_eq!(summary.items_collected, 4);
    assert_eq!(summary.changes_added, 0);
    assert_eq!(summary.changes_modified, 1);
    assert_eq!(summary.changes_removed, 1);

    // A fresh (non-resumed) run replaces per-unit output instead of
    // appending duplicates.
    let contents =
        std::fs::read_to_string(data.path().join("units").join("drive-docs.jsonl")).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[tokio::test]
async fn test_volatile_metadata_churn_produces_no_changes() {
    let fixtures = tempfile::TempDir::new().unwrap();
    let data = tempfile::TempDir::new().unwrap();
    write_fixtures(fixtures.path());

    let roster = FixtureRoster::from_file(fixtures.path().join("roster.json")).unwrap();
    let fetcher = FixtureFetcher::new(fixtures.path());

    CollectionOrchestrator::new(config(data.path()))
        .run(&roster, &fetcher)
        .await
        .unwrap();

    // Same content, fresh etags and view timestamps.
    write_lines(
        &fixtures.path().join("drive-docs.jsonl"),
        &[
            serde_json::json!({"id": "doc-1", "name": "roadmap",
                "mimeType": "application/vnd.google-apps.document", "size": "12000",
                "etag": "gen-2", "viewedByMeTime": "2025-01-10T08:00:00Z"}),
            serde_json::json!({"id": "pdf-1", "name": "contract.pdf",
                "mimeType": "application/pdf", "size": "450000", "etag": "gen-7"}),
            serde_json::json!({"id": "bin-1", "name": "dump.bin",
                "mimeType": "application/octet-stream", "size": "3000000"}),
        ],
    );

    let summary = CollectionOrchestrator::new(config(data.path()))
        .run(&roster, &fetcher)
        .await
        .unwrap();

    assert_eq!(summary.changes_added, 0);
    assert_eq!(summary.changes_modified, 0);
    assert_eq!(summary.changes_removed, 0);
}
