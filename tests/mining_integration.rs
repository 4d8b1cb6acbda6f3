//! End-to-end mining runs on a local cluster.

use ind_miner::prelude::*;
use ind_miner::{ColumnIdentity, TaskId, TraceEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn ident(file: &str, name: &str) -> ColumnIdentity {
    ColumnIdentity {
        file_name: file.to_string(),
        name: name.to_string(),
    }
}

/// Fails if any worker was handed a task while it still held one.
fn assert_one_in_flight_per_worker(traces: &[TraceEntry]) {
    let mut holding: HashMap<_, TaskId> = HashMap::new();
    for entry in traces {
        match entry.kind {
            TraceKind::Dispatched => {
                let task = entry.task_id.expect("dispatch without a task");
                if let Some(previous) = holding.insert(entry.worker, task) {
                    panic!(
                        "worker {} got task {} while holding {}",
                        entry.worker, task, previous
                    );
                }
            }
            TraceKind::Completed | TraceKind::Requeued => {
                holding.remove(&entry.worker);
            }
            TraceKind::WorkerLost => {}
        }
    }
}

#[tokio::test]
async fn test_subset_column_across_two_files() {
    let report = LocalCluster::default()
        .with_workers(2)
        .with_source(MemorySource::from_columns(
            "first.csv",
            vec![("A", vec!["1", "2", "3"])],
        ))
        .with_source(MemorySource::from_columns(
            "second.csv",
            vec![("B", vec!["1", "2", "3", "4"])],
        ))
        .run()
        .await
        .unwrap();

    assert_eq!(report.tasks_total, 2);
    assert_eq!(report.tasks_completed, 2);
    assert_eq!(report.dependencies.len(), 1);
    assert_eq!(report.dependencies[0].dependent, ident("first.csv", "A"));
    assert_eq!(report.dependencies[0].referenced, ident("second.csv", "B"));
    assert_eq!(
        report.dependencies[0].to_string(),
        "first.csv -> [A] ⊆ second.csv -> [B]"
    );
}

#[tokio::test]
async fn test_unrelated_columns_yield_nothing() {
    let report = LocalCluster::default()
        .with_workers(3)
        .with_source(MemorySource::from_columns(
            "t.csv",
            vec![
                ("x", vec!["1", "2"]),
                ("y", vec!["2", "3"]),
                ("z", vec!["3", "1"]),
            ],
        ))
        .run()
        .await
        .unwrap();

    assert_eq!(report.tasks_total, 6);
    assert_eq!(report.tasks_completed, 6);
    assert!(report.dependencies.is_empty());
}

#[tokio::test]
async fn test_same_column_name_is_merged_across_files() {
    // "id" gets {1,2,3} from both files together, so "ref" ⊆ "id" only after merging
    let report = LocalCluster::default()
        .with_workers(1)
        .with_source(MemorySource::from_columns(
            "a.csv",
            vec![("id", vec!["1", "2"]), ("ref", vec!["3", "1"])],
        ))
        .with_source(MemorySource::from_columns("b.csv", vec![("id", vec!["3"])]))
        .run()
        .await
        .unwrap();

    assert_eq!(report.tasks_total, 2);
    assert_eq!(report.dependencies.len(), 1);
    assert_eq!(report.dependencies[0].dependent.name, "ref");
    assert_eq!(report.dependencies[0].referenced.name, "id");
}

#[tokio::test]
async fn test_terminates_after_every_ordered_pair() {
    let columns: Vec<(&str, Vec<&str>)> = vec![
        ("c1", vec!["a", "b", "c"]),
        ("c2", vec!["a", "b", "c"]),
        ("c3", vec!["a", "b", "x"]),
        ("c4", vec!["a", "a", "a"]),
        ("c5", vec!["y", "z", "a"]),
    ];
    let n = columns.len();

    for workers in [1, 4] {
        let report = LocalCluster::default()
            .with_workers(workers)
            .with_source(MemorySource::from_columns("wide.csv", columns.clone()))
            .run()
            .await
            .unwrap();

        assert_eq!(report.tasks_total, n * (n - 1));
        assert_eq!(report.tasks_completed, n * (n - 1));
        assert_eq!(report.tasks_requeued, 0);
        assert!(report.workers_seen >= 1 && report.workers_seen <= workers);

        // c1 and c2 include each other, c4 = {a} sits inside c1, c2, c3 and c5
        assert_eq!(report.dependencies.len(), 6);
    }
}

#[tokio::test]
async fn test_no_worker_holds_two_tasks() {
    let telemetry = Arc::new(MemoryTelemetry::new());
    let values: Vec<String> = (0..50).map(|i| i.to_string()).collect();
    let mut source = MemorySource::new(
        "numbers.csv",
        ["all", "even", "odd", "small", "tens"],
    );
    for (i, value) in values.iter().enumerate() {
        let pick = |keep: bool| if keep { value.clone() } else { "0".to_string() };
        source = source.with_row([
            value.clone(),
            pick(i % 2 == 0),
            pick(i % 2 == 1),
            pick(i < 5),
            pick(i % 10 == 0),
        ]);
    }

    let report = LocalCluster::default()
        .with_workers(3)
        .with_source(source)
        .with_telemetry(telemetry.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.tasks_completed, 20);
    let traces = telemetry.get_traces();
    assert_eq!(
        traces.iter().filter(|t| t.kind == TraceKind::Dispatched).count(),
        20
    );
    assert_one_in_flight_per_worker(&traces);
}

#[tokio::test]
async fn test_tiny_frames_still_deliver_large_columns() {
    let big: Vec<String> = (0..500).map(|i| format!("value-{:04}", i)).collect();
    let half: Vec<String> = big.iter().step_by(2).cloned().collect();

    let mut wide = MemorySource::new("big.csv", ["big"]);
    for value in &big {
        wide = wide.with_row([value.clone()]);
    }
    let mut narrow = MemorySource::new("half.csv", ["half"]);
    for value in &half {
        narrow = narrow.with_row([value.clone()]);
    }

    let config = MinerConfig::new()
        .with_batch_size(64)
        .with_transport(TransportConfig::default().with_max_frame_bytes(48));
    let report = LocalCluster::new(config)
        .with_workers(2)
        .with_source(wide)
        .with_source(narrow)
        .run()
        .await
        .unwrap();

    assert_eq!(report.dependencies.len(), 1);
    assert_eq!(report.dependencies[0].dependent, ident("half.csv", "half"));
    assert_eq!(report.dependencies[0].referenced, ident("big.csv", "big"));
}

#[tokio::test]
async fn test_late_joiner_picks_up_work() {
    let network = Network::new(1024);
    let telemetry = Arc::new(MemoryTelemetry::new());
    let sources: Vec<Box<dyn InputSource>> = vec![Box::new(MemorySource::from_columns(
        "t.csv",
        vec![("p", vec!["1", "1"]), ("q", vec!["1", "2"]), ("r", vec!["2", "2"])],
    ))];
    let coordinator = Coordinator::bind(&network, MinerConfig::new(), sources)
        .unwrap()
        .with_telemetry(telemetry.clone());
    let handle = coordinator.handle();
    let mining = tokio::spawn(coordinator.run());

    // nobody is registered while the index is built and scheduled
    handle.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let worker = Worker::new(&network, handle.address(), TransportConfig::default());
    let late = worker.id();
    let summary = worker.spawn();

    let report = mining.await.unwrap().unwrap();
    assert_eq!(report.tasks_completed, 6);
    assert_eq!(report.workers_seen, 1);
    assert_eq!(summary.await.unwrap().unwrap().tasks_completed, 6);
    assert!(
        telemetry
            .get_traces()
            .iter()
            .filter(|t| t.kind == TraceKind::Completed)
            .all(|t| t.worker == late)
    );
}

#[tokio::test]
async fn test_checkers_agree_end_to_end() {
    let build = || {
        MemorySource::from_columns(
            "t.csv",
            vec![
                ("a", vec!["k", "l", "m", "n"]),
                ("b", vec!["l", "m", "l", "m"]),
                ("c", vec!["n", "o", "k", "l"]),
            ],
        )
    };

    let hashed = LocalCluster::default()
        .with_workers(2)
        .with_source(build())
        .run()
        .await
        .unwrap();
    let merged = LocalCluster::default()
        .with_workers(2)
        .with_checker(Arc::new(SortedMergeContainment))
        .with_source(build())
        .run()
        .await
        .unwrap();

    let mut left: Vec<String> = hashed.dependencies.iter().map(|d| d.to_string()).collect();
    let mut right: Vec<String> = merged.dependencies.iter().map(|d| d.to_string()).collect();
    left.sort();
    right.sort();
    assert_eq!(left, right);
    assert_eq!(left, vec!["t.csv -> [b] ⊆ t.csv -> [a]".to_string()]);
}
