mod utils;
#[allow(unused)]
use utils::*;

use async_trait::async_trait;
use ledgerload::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct Calls {
    acquired: AtomicUsize,
    init: AtomicUsize,
    install: AtomicUsize,
}

struct Scripted {
    calls: Arc<Calls>,
    fail_init: bool,
    fail_install: bool,
}

#[async_trait]
impl Connector for Scripted {
    fn connector_type(&self) -> &str {
        "scripted"
    }

    fn worker_index(&self) -> Option<usize> {
        None
    }

    async fn init(&self, _worker_init: bool) -> Result<(), ConnectorError> {
        self.calls.init.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(ConnectorError::Request("peer unreachable".to_string()));
        }
        Ok(())
    }

    async fn install_smart_contract(&self) -> Result<(), ConnectorError> {
        self.calls.install.fetch_add(1, Ordering::SeqCst);
        if self.fail_install {
            return Err(ConnectorError::Request("chaincode rejected".to_string()));
        }
        Ok(())
    }

    async fn send_single_request(&self, _request: &Value) -> Result<TxStatus, ConnectorError> {
        Ok(TxStatus::new("unused"))
    }
}

#[derive(Clone, Copy, Default)]
struct Script {
    fail_acquire: bool,
    fail_init: bool,
    fail_install: bool,
    fail_test: bool,
}

struct Harness {
    engine: Engine,
    calls: Arc<Calls>,
    executor: RecordingExecutor,
    probe: OrchestratorProbe,
}

fn harness(network: NetworkConfig, executor: RecordingExecutor, script: Script) -> Harness {
    let calls = Arc::new(Calls::default());
    let probe = OrchestratorProbe::default();

    let factory = {
        let calls = calls.clone();
        move |_worker: Option<usize>| {
            calls.acquired.fetch_add(1, Ordering::SeqCst);
            let connector = Scripted {
                calls: calls.clone(),
                fail_init: script.fail_init,
                fail_install: script.fail_install,
            };
            async move {
                if script.fail_acquire {
                    Err(ConnectorError::Request("no such network".to_string()))
                } else {
                    Ok(Arc::new(connector) as Arc<dyn Connector>)
                }
            }
        }
    };

    let engine = Engine::new(benchmark(1, json!([])), network, factory)
        .with_config(Config::new().with("workspace", "/srv/bench"))
        .with_executor(executor.clone())
        .with_orchestrator(probe.builder(script.fail_test));

    Harness {
        engine,
        calls,
        executor,
        probe,
    }
}

fn commands() -> NetworkConfig {
    network(json!("docker compose up -d"), json!("docker compose down"))
}

#[tokio::test]
async fn successful_run() {
    init();
    let h = harness(commands(), RecordingExecutor::default(), Script::default());

    assert_eq!(h.engine.run().await, RESULT_SUCCESS);
    assert_eq!(h.engine.result_code(), RESULT_SUCCESS);
    assert_eq!(
        h.executor.commands(),
        vec![
            "docker compose up -d".to_string(),
            "cd /srv/bench; docker compose down".to_string()
        ]
    );
    assert_eq!(h.calls.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.init.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.install.load(Ordering::SeqCst), 1);
    assert_eq!(h.probe.runs(), 1);
}

#[tokio::test]
async fn non_string_start_command() {
    let h = harness(
        network(json!({ "cmd": "up" }), Value::Null),
        RecordingExecutor::default(),
        Script::default(),
    );

    assert_eq!(h.engine.run().await, 1);
    assert!(h.executor.commands().is_empty());
    assert_eq!(h.probe.runs(), 1);
}

#[tokio::test]
async fn blank_start_command() {
    let h = harness(
        network(json!("   "), Value::Null),
        RecordingExecutor::default(),
        Script::default(),
    );

    assert_eq!(h.engine.run().await, 2);
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn failing_start_command() {
    let h = harness(
        commands(),
        RecordingExecutor::failing_on("up -d"),
        Script::default(),
    );

    assert_eq!(h.engine.run().await, 3);
    assert_eq!(h.executor.commands().len(), 2);
}

#[tokio::test]
async fn failing_init_keeps_its_code_after_a_successful_end() {
    let h = harness(
        commands(),
        RecordingExecutor::default(),
        Script {
            fail_init: true,
            ..Default::default()
        },
    );

    assert_eq!(h.engine.run().await, 4);
    let ends = h
        .executor
        .commands()
        .into_iter()
        .filter(|c| c.ends_with("docker compose down"))
        .count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn failing_install() {
    let h = harness(
        commands(),
        RecordingExecutor::default(),
        Script {
            fail_install: true,
            ..Default::default()
        },
    );

    assert_eq!(h.engine.run().await, 5);
}

#[tokio::test]
async fn failing_acquisition_skips_install_and_test() {
    let h = harness(
        commands(),
        RecordingExecutor::default(),
        Script {
            fail_acquire: true,
            ..Default::default()
        },
    );

    assert_eq!(h.engine.run().await, 6);
    assert_eq!(h.calls.install.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.runs(), 0);
    assert_eq!(h.executor.commands().len(), 2);
}

#[tokio::test]
async fn failing_test_rounds() {
    let h = harness(
        commands(),
        RecordingExecutor::default(),
        Script {
            fail_test: true,
            ..Default::default()
        },
    );

    assert_eq!(h.engine.run().await, 6);
}

#[tokio::test]
async fn failing_end_command() {
    let h = harness(
        commands(),
        RecordingExecutor::failing_on("down"),
        Script::default(),
    );

    assert_eq!(h.engine.run().await, 9);
}

#[tokio::test]
async fn non_string_end_command() {
    let h = harness(
        network(Value::Null, json!(42)),
        RecordingExecutor::default(),
        Script::default(),
    );

    assert_eq!(h.engine.run().await, 9);
    assert!(h.executor.commands().is_empty());
}

#[tokio::test]
async fn first_failure_is_sticky() {
    let h = harness(
        commands(),
        RecordingExecutor::failing_on("down"),
        Script {
            fail_install: true,
            ..Default::default()
        },
    );

    assert_eq!(h.engine.run().await, 5);
}

#[tokio::test]
async fn disabled_phases_do_nothing() {
    let h = harness(commands(), RecordingExecutor::default(), Script::default());
    let engine = h.engine.with_flow(FlowOptions::none());

    assert_eq!(engine.run().await, RESULT_SUCCESS);
    assert!(h.executor.commands().is_empty());
    assert_eq!(h.calls.acquired.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.runs(), 0);
}

#[tokio::test]
async fn flow_flags_from_configuration() {
    let h = harness(commands(), RecordingExecutor::default(), Script::default());
    let engine = h.engine.with_config(
        Config::new()
            .with("workspace", "/srv/bench")
            .with("flow-only-test", true),
    );

    assert_eq!(engine.run().await, RESULT_SUCCESS);
    assert!(h.executor.commands().is_empty());
    assert_eq!(h.calls.init.load(Ordering::SeqCst), 0);
    assert_eq!(h.probe.runs(), 1);
}

#[tokio::test]
async fn stop_before_run_is_a_noop() {
    let h = harness(commands(), RecordingExecutor::default(), Script::default());

    h.engine.stop();
    assert_eq!(h.engine.result_code(), RESULT_NOT_RUN);
    assert_eq!(h.probe.stops(), 0);
}

#[tokio::test]
async fn stop_after_test_delegates_once() {
    let h = harness(commands(), RecordingExecutor::default(), Script::default());

    h.engine.run().await;
    h.engine.stop();
    assert_eq!(h.probe.stops(), 1);
}
