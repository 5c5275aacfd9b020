use ledgerload::prelude::*;
use mock_connector::{workloads, MockLedger, MockSettings};
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let ledger = MockLedger::new(MockSettings {
        latency: Duration::from_millis(25),
        jitter: Duration::from_millis(5),
        max_tps: NonZeroU32::new(400),
        failure_rate: 0.01,
    });

    let benchmark = serde_json::from_value::<BenchmarkConfig>(json!({
        "test": {
            "name": "mock-ledger",
            "description": "Transfers against the in-memory ledger",
            "workers": { "number": 4 },
            "rounds": [
                {
                    "label": "warmup",
                    "txNumber": 200,
                    "rateControl": { "type": "fixed-rate", "opts": { "tps": 100 } },
                    "workload": { "module": "transfer" }
                },
                {
                    "label": "ramp",
                    "txDuration": 10,
                    "rateControl": {
                        "type": "linear-rate",
                        "opts": { "startingTps": 50, "finishingTps": 500 }
                    },
                    "workload": { "module": "transfer", "arguments": { "accounts": 1000 } }
                },
                {
                    "label": "batched",
                    "txDuration": 5,
                    "rateControl": { "type": "fixed-load", "opts": { "transactionLoad": 20 } },
                    "workload": { "module": "transfer", "arguments": { "batchSize": 5 } }
                }
            ]
        }
    }));
    let benchmark = match benchmark {
        Ok(benchmark) => benchmark,
        Err(err) => {
            eprintln!("Invalid benchmark descriptor: {err}");
            std::process::exit(1);
        }
    };

    let network = NetworkConfig {
        blockchain: "mock-ledger".to_string(),
        ..Default::default()
    };

    let engine = Engine::new(benchmark, network, ledger.clone()).with_workloads(workloads());
    let code = engine.run().await;

    println!(
        "committed={} rejected={} code={code}",
        ledger.committed(),
        ledger.rejected()
    );
    std::process::exit(code);
}
