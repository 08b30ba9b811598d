//! Checks the scenario files shipped with the repository.

use std::path::PathBuf;

use tilepath_core::prelude::*;
use tilepath_test_utils::fixtures::init_test_tracing;
use tilepath_tools::scenario::{blocking_checksums, run_scenario, Scenario};

fn scenario_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(name)
}

#[test]
fn test_wall_gap_scenario() {
    init_test_tracing();
    let scenario = Scenario::load(&scenario_path("wall_gap.ron")).unwrap();
    let report = run_scenario(&scenario, PathfindingConfig::inline()).unwrap();

    let statuses: Vec<_> = report.routes.iter().map(|r| (r.requester, r.status)).collect();
    assert_eq!(
        statuses,
        vec![
            (1, RouteStatus::Ok),
            (2, RouteStatus::Ok),
            (3, RouteStatus::Ok),
            (4, RouteStatus::Ok),
            (5, RouteStatus::Ok),
            (6, RouteStatus::Ok),
            (7, RouteStatus::Failed),
        ]
    );

    let through_gap = &report.routes[0];
    assert!(through_gap.tiles.contains(&(9, 0)) || through_gap.tiles.contains(&(9, 8)));
    let ai = &report.routes[4];
    assert!(ai.tiles.iter().all(|&(x, y)| !(13..16).contains(&x) || !(6..8).contains(&y)));
}

#[test]
fn test_threaded_run_matches_inline() {
    let scenario = Scenario::load(&scenario_path("wall_gap.ron")).unwrap();
    let inline = run_scenario(&scenario, PathfindingConfig::inline()).unwrap();
    let threaded = run_scenario(&scenario, PathfindingConfig::default()).unwrap();
    assert_eq!(inline, threaded);
}

#[test]
fn test_checksums_are_stable() {
    let scenario = Scenario::load(&scenario_path("wall_gap.ron")).unwrap();
    assert_eq!(
        blocking_checksums(&scenario).unwrap(),
        blocking_checksums(&scenario).unwrap()
    );
}

#[test]
fn test_missing_file() {
    let err = Scenario::load(&scenario_path("does_not_exist.ron")).unwrap_err();
    assert!(err.to_string().contains("does_not_exist.ron"));
}
