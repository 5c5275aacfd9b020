mod utils;
#[allow(unused)]
use utils::*;

use ledgerload::prelude::*;
use mock_connector::{workloads, MockLedger, MockSettings};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn ledger() -> MockLedger {
    MockLedger::new(MockSettings {
        latency: Duration::from_millis(2),
        ..Default::default()
    })
}

fn engine(ledger: &MockLedger, workers: usize, rounds: Value, workspace: &Path) -> Engine {
    Engine::new(
        benchmark(workers, rounds),
        network(Value::Null, Value::Null),
        ledger.clone(),
    )
    .with_config(Config::new().with("workspace", workspace.to_string_lossy().to_string()))
    .with_workloads(workloads())
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn count_based_rounds_commit_every_transaction() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger();
    let engine = engine(
        &ledger,
        2,
        json!([
            {
                "label": "single",
                "txNumber": 20,
                "rateControl": { "type": "fixed-rate", "opts": { "tps": 200 } },
                "workload": { "module": "transfer" }
            },
            {
                "label": "batched",
                "txNumber": 4,
                "rateControl": { "type": "fixed-load", "opts": { "transactionLoad": 2 } },
                "workload": { "module": "transfer", "arguments": { "batchSize": 5 } }
            }
        ]),
        dir.path(),
    );

    assert_eq!(engine.run().await, RESULT_SUCCESS);
    assert_eq!(ledger.committed(), 20 + 4 * 5);
    assert!(ledger.is_installed());
    // Manager plus one init per worker.
    assert_eq!(ledger.initialized(), 3);
    assert_eq!(ledger.open_contexts(), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn recorded_schedule_is_replayed() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger();
    let engine = engine(
        &ledger,
        1,
        json!([
            {
                "label": "record",
                "txNumber": 5,
                "rateControl": {
                    "type": "record-rate",
                    "opts": {
                        "rateController": { "type": "fixed-rate", "opts": { "tps": 50 } },
                        "pathTemplate": "traces/worker-<C>.txt",
                        "logEnd": true
                    }
                },
                "workload": { "module": "transfer" }
            },
            {
                "label": "replay",
                "txNumber": 5,
                "rateControl": {
                    "type": "replay-rate",
                    "opts": { "pathTemplate": "traces/worker-<C>.txt" }
                },
                "workload": { "module": "transfer" }
            }
        ]),
        dir.path(),
    );

    assert_eq!(engine.run().await, RESULT_SUCCESS);
    assert_eq!(ledger.committed(), 10);

    let trace = std::fs::read_to_string(dir.path().join("traces/worker-0.txt")).unwrap();
    let offsets: Vec<u64> = trace.lines().map(|l| l.parse().unwrap()).collect();
    assert_eq!(offsets.len(), 5);
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    assert!(offsets[4] >= 70);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn missing_replay_trace_fails_the_test_phase() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger();
    let engine = engine(
        &ledger,
        1,
        json!([{
            "label": "replay",
            "txNumber": 5,
            "rateControl": { "type": "replay-rate", "opts": { "pathTemplate": "nope-<C>.txt" } },
            "workload": { "module": "transfer" }
        }]),
        dir.path(),
    );

    assert_eq!(engine.run().await, 6);
    assert_eq!(ledger.committed(), 0);
    assert_eq!(ledger.open_contexts(), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn failed_worker_setup_releases_contexts() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger();
    let engine = engine(
        &ledger,
        2,
        json!([{
            "label": "unknown",
            "txNumber": 4,
            "rateControl": { "type": "fixed-rate" },
            "workload": { "module": "mint" }
        }]),
        dir.path(),
    );

    assert_eq!(engine.run().await, 6);
    assert_eq!(ledger.open_contexts(), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn linear_rate_is_not_slowed_by_latency() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = MockLedger::new(MockSettings {
        latency: Duration::from_millis(150),
        ..Default::default()
    });
    let engine = engine(
        &ledger,
        1,
        json!([{
            "label": "steady",
            "txDuration": 2,
            "rateControl": {
                "type": "linear-rate",
                "opts": { "startingTps": 5, "finishingTps": 5 }
            },
            "workload": { "module": "transfer" }
        }]),
        dir.path(),
    );

    assert_eq!(engine.run().await, RESULT_SUCCESS);
    // One send every 200ms for 2s, regardless of the 150ms commit latency.
    assert!(
        (9..=11).contains(&ledger.committed()),
        "committed {}",
        ledger.committed()
    );
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stop_ends_a_long_round() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = ledger();
    let engine = Arc::new(engine(
        &ledger,
        2,
        json!([{
            "label": "long",
            "txDuration": 60,
            "rateControl": { "type": "fixed-rate", "opts": { "tps": 100 } },
            "workload": { "module": "transfer" }
        }]),
        dir.path(),
    ));

    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run().await }
    });
    tokio::time::sleep(Duration::from_millis(300)).await;
    engine.stop();

    assert_eq!(running.await.unwrap(), RESULT_SUCCESS);
    assert!(ledger.committed() > 0);
    assert!(ledger.committed() < 100 * 60);
    assert_eq!(ledger.open_contexts(), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn rejected_transactions_do_not_fail_the_run() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let ledger = MockLedger::new(MockSettings {
        latency: Duration::from_millis(1),
        failure_rate: 1.,
        ..Default::default()
    });
    let engine = engine(
        &ledger,
        1,
        json!([{
            "label": "doomed",
            "txNumber": 10,
            "rateControl": { "type": "fixed-rate", "opts": { "tps": 500 } },
            "workload": { "module": "transfer" }
        }]),
        dir.path(),
    );

    assert_eq!(engine.run().await, RESULT_SUCCESS);
    assert_eq!(ledger.committed(), 0);
    assert_eq!(ledger.rejected(), 10);
}
