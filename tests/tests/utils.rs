use async_trait::async_trait;
use ledgerload::prelude::*;
use ledgerload::CommandError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_env_filter("ledgerload=debug,mock_connector=debug")
            .init();
    });
}

/// Records every command and fails those containing `fail_on`.
#[allow(unused)]
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    pub commands: Arc<Mutex<Vec<String>>>,
    pub fail_on: Option<&'static str>,
}

#[allow(unused)]
impl RecordingExecutor {
    pub fn failing_on(pattern: &'static str) -> Self {
        Self {
            fail_on: Some(pattern),
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(&self, command: &str) -> Result<(), CommandError> {
        self.commands.lock().unwrap().push(command.to_string());
        match self.fail_on {
            Some(pattern) if command.contains(pattern) => {
                Err(CommandError::Other(format!("{pattern} refused")))
            }
            _ => Ok(()),
        }
    }
}

/// Counts calls into an orchestrator built by the engine.
#[allow(unused)]
#[derive(Clone, Default)]
pub struct OrchestratorProbe {
    pub built: Arc<AtomicUsize>,
    pub runs: Arc<AtomicUsize>,
    pub stops: Arc<AtomicUsize>,
}

#[allow(unused)]
impl OrchestratorProbe {
    pub fn builder(
        &self,
        fail: bool,
    ) -> impl Fn(OrchestratorContext) -> Box<dyn RoundOrchestrator> + Send + Sync + 'static {
        let probe = self.clone();
        move |_ctx: OrchestratorContext| {
            probe.built.fetch_add(1, Ordering::SeqCst);
            Box::new(ProbeOrchestrator {
                probe: probe.clone(),
                fail,
            }) as Box<dyn RoundOrchestrator>
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[allow(unused)]
struct ProbeOrchestrator {
    probe: OrchestratorProbe,
    fail: bool,
}

#[async_trait]
impl RoundOrchestrator for ProbeOrchestrator {
    async fn run(&self) -> Result<Vec<RoundStatistics>, ledgerload::OrchestratorError> {
        self.probe.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ledgerload::OrchestratorError::WorkerArguments {
                expected: 1,
                actual: 0,
            })
        } else {
            Ok(vec![])
        }
    }

    fn stop(&self) {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[allow(unused)]
pub fn network(start: Value, end: Value) -> NetworkConfig {
    serde_json::from_value(json!({
        "blockchain": "mock-ledger",
        "command": { "start": start, "end": end }
    }))
    .unwrap()
}

#[allow(unused)]
pub fn benchmark(workers: usize, rounds: Value) -> BenchmarkConfig {
    serde_json::from_value(json!({
        "test": {
            "name": "integration",
            "workers": { "number": workers },
            "rounds": rounds
        }
    }))
    .unwrap()
}
