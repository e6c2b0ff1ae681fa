//! Quota backoff schedule behavior.

use std::time::Duration;
use workspace_harvester::collector::quota_backoff;

#[test]
fn test_five_consecutive_hits_double_to_the_cap() {
    let base = Duration::from_secs(3);
    let cap = Duration::from_secs(48);
    let delays: Vec<u64> = (1..=5)
        .map(|hits| quota_backoff(hits, base, cap).as_secs())
        .collect();
    assert_eq!(delays, vec![3, 6, 12, 24, 48]);
}

#[test]
fn test_backoff_never_exceeds_the_cap() {
    let base = Duration::from_secs(3);
    let cap = Duration::from_secs(120);
    let mut previous = Duration::ZERO;
    for hits in 1..=64 {
        let delay = quota_backoff(hits, base, cap);
        assert!(delay >= previous, "delay decreased at hit {hits}");
        assert!(delay <= cap, "delay exceeded cap at hit {hits}");
        previous = delay;
    }
}
