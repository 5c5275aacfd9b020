mod utils;
#[allow(unused)]
use utils::*;

use ledgerload::prelude::*;
use metrics_exporter_prometheus::PrometheusBuilder;
use mock_connector::{workloads, MockLedger, MockSettings};
use serde_json::{json, Value};
use std::time::Duration;

#[tokio::test]
#[ntest::timeout(10_000)]
async fn submissions_are_exported() {
    init();
    let handle = PrometheusBuilder::new().install_recorder().unwrap();

    let ledger = MockLedger::new(MockSettings {
        latency: Duration::from_millis(1),
        ..Default::default()
    });
    let engine = Engine::new(
        benchmark(
            1,
            json!([{
                "label": "exported",
                "txNumber": 5,
                "rateControl": { "type": "fixed-load", "opts": { "transactionLoad": 1 } },
                "workload": { "module": "transfer" }
            }]),
        ),
        network(Value::Null, Value::Null),
        ledger.clone(),
    )
    .with_workloads(workloads());

    assert_eq!(engine.run().await, RESULT_SUCCESS);

    let rendered = handle.render();
    assert!(rendered.contains("ledgerload_tx_submitted{connector=\"mock-ledger\"} 5"));
    assert!(rendered.contains("ledgerload_tx_success 5"));
    assert!(rendered.contains("mock_ledger_committed 5"));
    assert!(rendered.contains("ledgerload_tx_latency"));
}
