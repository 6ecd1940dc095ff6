// MPBench: Benchmarking Multipath TCP Schedulers under Controlled Network Impairments
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Tests of the matrix of trials.

use std::{sync::Arc, time::Duration};

use indicatif::ProgressBar;

use super::{testbed, Event, FakeFabric, FakeStack};
use crate::{
    experiments::{MatrixError, ResultMatrix, TrialError, SUMMARY_FILE},
    records::TrialRecord,
};

const PHASE: Duration = Duration::from_secs(10);

fn names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    names.into_iter().map(String::from).collect()
}

#[tokio::test(start_paused = true)]
async fn relative_performance_against_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = Arc::new(FakeFabric::new());
    fabric.push_bandwidth(900.0);
    fabric.push_bandwidth(450.0);
    let stack = Arc::new(FakeStack::new(["default"]));
    let mut testbed = testbed(&fabric, &stack, dir.path());

    let matrix = testbed
        .run_matrix(&names(["default"]), &[0, 5], PHASE)
        .await
        .unwrap();
    assert_eq!(matrix.len(), 2);
    assert_eq!(matrix.baseline("default"), 900.0);
    assert_eq!(matrix.get("default", 5).unwrap().avg_bandwidth_mbps, 450.0);
    assert_eq!(matrix.relative_performance("default", 5), Some(50.0));

    // trials never overlap
    let events = fabric.events();
    let builds: Vec<_> = events.iter().filter(|(_, e)| e == &Event::Build).collect();
    let teardowns: Vec<_> = events.iter().filter(|(_, e)| e == &Event::Teardown).collect();
    assert_eq!(builds.len(), 2);
    assert_eq!(teardowns.len(), 2);
    assert!(teardowns[0].0 <= builds[1].0);
}

#[tokio::test(start_paused = true)]
async fn unavailable_scheduler_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = Arc::new(FakeFabric::new());
    for bw in [10.0, 8.0] {
        fabric.push_bandwidth(bw);
    }
    let stack = Arc::new(FakeStack::new(["default"]));
    let bar = ProgressBar::hidden();
    let mut testbed = testbed(&fabric, &stack, dir.path()).with_progress(bar.clone());

    let matrix = testbed
        .run_matrix(&names(["blest", "default"]), &[5, 0], PHASE)
        .await
        .unwrap();

    assert_eq!(matrix.schedulers().collect::<Vec<_>>(), vec!["blest", "default"]);
    assert!(matrix.scheduler("blest").unwrap().is_empty());
    assert_eq!(matrix.get("blest", 0), None);
    assert_eq!(matrix.len(), 2);
    // executed in the given order, but the baseline is found regardless
    assert_eq!(matrix.get("default", 5).unwrap().avg_bandwidth_mbps, 10.0);
    assert_eq!(matrix.baseline("default"), 8.0);
    assert_eq!(matrix.relative_performance("default", 5), Some(125.0));
    assert_eq!(matrix.relative_performance("blest", 5), None);
    assert_eq!(bar.position(), 4);
    assert_eq!(stack.selected(), vec!["default", "default"]);
}

#[tokio::test(start_paused = true)]
async fn fabric_failure_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let mut fabric = FakeFabric::new();
    fabric.fail_build = true;
    let fabric = Arc::new(fabric);
    let stack = Arc::new(FakeStack::new(["default", "blest"]));
    let mut testbed = testbed(&fabric, &stack, dir.path());

    match testbed
        .run_matrix(&names(["default", "blest"]), &[0, 1, 5], PHASE)
        .await
    {
        Err(MatrixError::Aborted { trial, source }) => {
            assert_eq!(trial, "default_0pct_loss");
            assert!(matches!(source, TrialError::FabricUnavailable(_)));
        }
        x => panic!("unexpected result: {x:?}"),
    }
    assert_eq!(fabric.events(), vec![(Duration::ZERO, Event::Build)]);
}

#[tokio::test(start_paused = true)]
async fn hanging_trial_does_not_block_the_matrix() {
    let dir = tempfile::tempdir().unwrap();
    let mut fabric = FakeFabric::new();
    fabric.hang_inject = true;
    let fabric = Arc::new(fabric);
    fabric.push_bandwidth(10.0);
    fabric.push_bandwidth(10.0);
    let stack = Arc::new(FakeStack::new(["default"]));
    let mut testbed = testbed(&fabric, &stack, dir.path());

    let matrix = testbed
        .run_matrix(&names(["default"]), &[0, 5], PHASE)
        .await
        .unwrap();
    assert!(matrix.get("default", 0).is_some());
    assert!(matrix.get("default", 5).is_none());
    assert_eq!(
        fabric
            .events()
            .iter()
            .filter(|(_, e)| e == &Event::Teardown)
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn summary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = Arc::new(FakeFabric::new());
    for bw in [9.25, 4.5, 0.0] {
        fabric.push_bandwidth(bw);
    }
    let stack = Arc::new(FakeStack::new(["default"]));
    let mut testbed = testbed(&fabric, &stack, dir.path());

    let matrix = testbed
        .run_matrix(&names(["default"]), &[0, 10, 2], PHASE)
        .await
        .unwrap();
    let summary = matrix.summary();
    let path = dir.path().join(SUMMARY_FILE);
    summary.save(&path).unwrap();

    let back = ResultMatrix::<TrialRecord>::load(&path).unwrap();
    assert_eq!(back, summary);
    assert_eq!(
        back.scheduler("default")
            .unwrap()
            .keys()
            .copied()
            .collect::<Vec<_>>(),
        vec![0, 2, 10]
    );
    assert_eq!(back.get("default", 10).unwrap().avg_bandwidth_mbps, 4.5);
    assert_eq!(back.get("default", 2).unwrap().avg_bandwidth_mbps, 0.0);
    assert_eq!(back.relative_performance("default", 10), Some(4.5 / 9.25 * 100.0));

    let records = back.records();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].loss_rate, 0);
    assert_eq!(records[0].relative_performance, 100.0);
    assert_eq!(records[2].loss_rate, 10);
}
