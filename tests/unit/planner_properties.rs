//! Coverage properties of the batch planner

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::BTreeSet;
use telemetry_client::{BatchPlanner, Limits, Query};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn planner(max_data: u64, max_cols: usize, interval: TimeDelta) -> BatchPlanner {
    BatchPlanner::new(Limits::new(max_data, max_cols), interval, now()).unwrap()
}

/// Expected leaves for an explicit range: ceil(samples / max_lines)
fn expected_leaves(span: TimeDelta, interval: TimeDelta, max_lines: i64) -> usize {
    let chunk = interval.num_seconds() * max_lines;
    ((span.num_seconds() + chunk - 1) / chunk) as usize
}

#[test]
fn test_ranges_are_covered_exactly_once() {
    let cases = [
        (TimeDelta::hours(1), TimeDelta::minutes(15), 100),
        (TimeDelta::days(2), TimeDelta::minutes(15), 10),
        (TimeDelta::days(30), TimeDelta::minutes(1), 1_000),
        (TimeDelta::minutes(61), TimeDelta::minutes(1), 60),
        (TimeDelta::days(365), TimeDelta::hours(1), 7),
    ];

    for (span, interval, max_data) in cases {
        let from = now() - span;
        let leaves = planner(max_data, 500, interval)
            .plan(Query::new("data").range(from, now()))
            .unwrap();

        assert_eq!(leaves.len(), expected_leaves(span, interval, max_data as i64));
        assert_eq!(leaves.first().unwrap().from_time(), Some(from));
        assert_eq!(leaves.last().unwrap().to_time(), Some(now()));

        for pair in leaves.windows(2) {
            assert_eq!(pair[0].to_time(), pair[1].from_time(), "gap or overlap");
        }
        for leaf in &leaves {
            let samples = (leaf.to_time().unwrap() - leaf.from_time().unwrap()).num_seconds()
                / interval.num_seconds();
            assert!(samples <= max_data as i64);
        }
    }
}

#[test]
fn test_measures_are_partitioned() {
    for (count, max_cols) in [(11, 10), (25, 10), (500, 500), (1_234, 500), (7, 1)] {
        let all: BTreeSet<String> = (0..count).map(|i| format!("M{i:05}")).collect();
        let leaves = planner(1_000_000, max_cols, TimeDelta::minutes(15))
            .plan(
                Query::new("data")
                    .measures(all.clone())
                    .range(now() - TimeDelta::hours(1), now()),
            )
            .unwrap();

        assert_eq!(leaves.len(), (count + max_cols - 1) / max_cols);

        let mut union = BTreeSet::new();
        for leaf in &leaves {
            let set = leaf.measure_set().unwrap();
            assert!(set.len() <= max_cols);
            assert!(union.is_disjoint(set));
            union.extend(set.iter().cloned());
        }
        assert_eq!(union, all);
    }
}

#[test]
fn test_end_to_end_leaf_count() {
    // maxData=100, maxCols=10, 15 min, 25 measures over 2 days (192 samples):
    // 10 measures -> 10 lines -> 20 leaves, twice; 5 measures -> 20 lines -> 10 leaves
    let measures: Vec<String> = (0..25).map(|i| format!("M{i}")).collect();
    let leaves = planner(100, 10, TimeDelta::minutes(15))
        .plan(
            Query::new("data")
                .measures(measures)
                .range(now() - TimeDelta::days(2), now()),
        )
        .unwrap();

    assert_eq!(leaves.len(), 50);
}

#[test]
fn test_very_long_last_hours_never_issues_last_hours() {
    let leaves = planner(100, 10, TimeDelta::minutes(15))
        .plan(Query::new("data").last_hours(5_000.0))
        .unwrap();

    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].last_hours_value(), None);
    assert_eq!(leaves[0].updated_since_time(), Some(now()));
    assert!(leaves[0].from_time().unwrap() < now());
}

#[test]
fn test_planning_is_deterministic() {
    let query = Query::new("data")
        .measures((0..30).map(|i| format!("M{i}")))
        .updated_since(now() - TimeDelta::days(4));
    let planner = planner(200, 8, TimeDelta::minutes(10));

    let first: Vec<String> = planner
        .plan(query.clone())
        .unwrap()
        .iter()
        .map(Query::to_resource_path)
        .collect();
    let second: Vec<String> = planner
        .plan(query)
        .unwrap()
        .iter()
        .map(Query::to_resource_path)
        .collect();

    assert_eq!(first, second);
    assert!(first.iter().all(|p| !p.contains("updatedSince")));
}
