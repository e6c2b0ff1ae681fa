//! Chunk planning across a roster of units.

use chrono::{DateTime, Utc};
use workspace_harvester::collector::{plan, plan_for_unit};
use workspace_harvester::{CollectionUnit, TimeRange, UnitKind};

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

#[test]
fn test_three_units_over_ten_days_yield_six_chunks() {
    let range = TimeRange::new(ts("2025-01-01T00:00:00Z"), ts("2025-01-11T00:00:00Z")).unwrap();
    let units = [
        CollectionUnit::new("cal-amir", "amir@example.com", UnitKind::Calendar),
        CollectionUnit::new("cal-mei", "mei@example.com", UnitKind::Calendar),
        CollectionUnit::new("cal-zoe", "zoe@example.com", UnitKind::Calendar),
    ];

    let mut total_chunks = 0;
    for unit in &units {
        let windows = plan_for_unit(unit, range, chrono::Duration::days(7));
        assert_eq!(windows.len(), 2, "unit {} plan", unit.unit_id);
        assert_eq!(windows[0].range.duration(), chrono::Duration::days(7));
        assert_eq!(windows[1].range.duration(), chrono::Duration::days(3));
        total_chunks += windows.len();
    }
    assert_eq!(total_chunks, 6);
}

#[test]
fn test_union_of_windows_equals_input_range() {
    let range = TimeRange::new(ts("2025-02-03T09:15:00Z"), ts("2025-05-20T17:00:00Z")).unwrap();
    for span_days in [1, 3, 7, 30, 365] {
        let windows = plan(range, chrono::Duration::days(span_days));
        assert_eq!(windows.first().unwrap().range.start, range.start);
        assert_eq!(windows.last().unwrap().range.end, range.end);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].range.end, pair[1].range.start);
        }
    }
}

#[test]
fn test_repeated_planning_is_identical() {
    let range = TimeRange::new(ts("2025-01-01T00:00:00Z"), ts("2025-04-01T00:00:00Z")).unwrap();
    let first = plan(range, chrono::Duration::days(7));
    for _ in 0..10 {
        assert_eq!(plan(range, chrono::Duration::days(7)), first);
    }
}
