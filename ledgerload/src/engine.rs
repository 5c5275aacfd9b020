use crate::command::{CommandExecutor, ShellExecutor};
use crate::connector::{Connector, ConnectorFactory};
use crate::controllers::RateControllerRegistry;
use crate::error::EngineError;
use crate::orchestrator::{
    LocalOrchestrator, OrchestratorBuilder, OrchestratorContext, RoundOrchestrator,
};
use crate::workload::WorkloadFactory;
use arc_swap::ArcSwapOption;
use futures_util::FutureExt;
use ledgerload_core::{BenchmarkConfig, Config, FlowOptions, NetworkConfig};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Result code before [`Engine::run`] completed.
pub const RESULT_NOT_RUN: i32 = -1;
pub const RESULT_SUCCESS: i32 = 0;

/// Drives one benchmark through the Start, Init, Install, Test and End phases.
///
/// Every phase can be switched off through [`FlowOptions`]. The first failing phase decides the
/// result code (see [`EngineError::code`]); later failures are only logged. End runs whenever it
/// is enabled, even after earlier failures.
pub struct Engine {
    benchmark: BenchmarkConfig,
    network: NetworkConfig,
    config: Config,
    flow: Option<FlowOptions>,
    connector_factory: Arc<dyn ConnectorFactory>,
    executor: Arc<dyn CommandExecutor>,
    workloads: Arc<WorkloadFactory>,
    rate_controllers: Arc<RateControllerRegistry>,
    orchestrator_builder: Option<OrchestratorBuilder>,
    orchestrator: ArcSwapOption<Box<dyn RoundOrchestrator>>,
    result_code: AtomicI32,
}

impl Engine {
    pub fn new(
        benchmark: BenchmarkConfig,
        network: NetworkConfig,
        connector_factory: impl ConnectorFactory + 'static,
    ) -> Self {
        Self {
            benchmark,
            network,
            config: Config::new(),
            flow: None,
            connector_factory: Arc::new(connector_factory),
            executor: Arc::new(ShellExecutor::default()),
            workloads: Arc::new(WorkloadFactory::new()),
            rate_controllers: Arc::new(RateControllerRegistry::default()),
            orchestrator_builder: None,
            orchestrator: ArcSwapOption::empty(),
            result_code: AtomicI32::new(RESULT_NOT_RUN),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use `flow` instead of the `flow-*` keys of the configuration.
    pub fn with_flow(mut self, flow: FlowOptions) -> Self {
        self.flow = Some(flow);
        self
    }

    pub fn with_executor(mut self, executor: impl CommandExecutor + 'static) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn with_workloads(mut self, workloads: WorkloadFactory) -> Self {
        self.workloads = Arc::new(workloads);
        self
    }

    pub fn with_rate_controllers(mut self, rate_controllers: RateControllerRegistry) -> Self {
        self.rate_controllers = Arc::new(rate_controllers);
        self
    }

    /// Replace the in-process [`LocalOrchestrator`].
    pub fn with_orchestrator<F>(mut self, builder: F) -> Self
    where
        F: Fn(OrchestratorContext) -> Box<dyn RoundOrchestrator> + Send + Sync + 'static,
    {
        self.orchestrator_builder = Some(Box::new(builder));
        self
    }

    pub fn result_code(&self) -> i32 {
        self.result_code.load(Ordering::SeqCst)
    }

    #[instrument(name = "engine", skip_all, fields(benchmark = %self.benchmark.test.name))]
    pub async fn run(&self) -> i32 {
        let flow = self
            .flow
            .unwrap_or_else(|| FlowOptions::from_config(&self.config));
        debug!("Resolved flow: {flow:?}");

        let mut outcome = Outcome::default();

        if flow.start {
            outcome.record(guarded("start", self.start()).await);
        } else {
            info!("Skipping start phase");
        }

        let connector = if flow.init || flow.install || flow.test {
            outcome.record(guarded("init", self.acquire_connector()).await)
        } else {
            None
        };

        match &connector {
            Some(connector) => {
                if flow.init {
                    outcome.record(guarded("init", self.init(connector)).await);
                } else {
                    info!("Skipping init phase");
                }
                if flow.install {
                    outcome.record(guarded("install", self.install(connector)).await);
                } else {
                    info!("Skipping install phase");
                }
                if flow.test {
                    outcome.record(guarded("test", self.test(connector)).await);
                } else {
                    info!("Skipping test phase");
                }
            }
            None if flow.init || flow.install || flow.test => {
                warn!("No connector available; skipping the remaining connector phases");
            }
            None => {}
        }

        if flow.end {
            outcome.record(guarded("end", self.end()).await);
        } else {
            info!("Skipping end phase");
        }
        drop(connector);

        let code = outcome.code.unwrap_or(RESULT_SUCCESS);
        self.result_code.store(code, Ordering::SeqCst);
        if code == RESULT_SUCCESS {
            info!("Benchmark run succeeded");
        } else {
            error!("Benchmark run failed with code {code}");
        }
        code
    }

    /// Ask a running Test phase to stop. Does nothing before an orchestrator was built.
    pub fn stop(&self) {
        match self.orchestrator.load_full() {
            None => debug!("No orchestrator to stop"),
            Some(orchestrator) => {
                if std::panic::catch_unwind(AssertUnwindSafe(|| orchestrator.stop())).is_err() {
                    warn!("Orchestrator panicked while stopping");
                }
            }
        }
    }

    async fn start(&self) -> Result<(), EngineError> {
        match &self.network.command.start {
            None | Some(Value::Null) => {
                info!("No start command configured, skipping");
                Ok(())
            }
            Some(Value::String(command)) if command.trim().is_empty() => {
                Err(EngineError::StartCommandBlank)
            }
            Some(Value::String(command)) => self
                .executor
                .execute(command)
                .await
                .map_err(EngineError::StartCommand),
            Some(other) => Err(EngineError::StartCommandNotString(json_type(other))),
        }
    }

    async fn acquire_connector(&self) -> Result<Arc<dyn Connector>, EngineError> {
        let connector = self
            .connector_factory
            .create(None)
            .await
            .map_err(EngineError::ConnectorAcquisition)?;
        debug!("Acquired {} connector", connector.connector_type());
        Ok(connector)
    }

    async fn init(&self, connector: &Arc<dyn Connector>) -> Result<(), EngineError> {
        connector
            .init(false)
            .await
            .map_err(EngineError::ConnectorInit)?;
        info!("Connector initialized");
        Ok(())
    }

    async fn install(&self, connector: &Arc<dyn Connector>) -> Result<(), EngineError> {
        connector
            .install_smart_contract()
            .await
            .map_err(EngineError::Install)?;
        info!("Smart contracts installed");
        Ok(())
    }

    async fn test(&self, connector: &Arc<dyn Connector>) -> Result<(), EngineError> {
        let ctx = OrchestratorContext {
            connector: connector.clone(),
            connector_factory: self.connector_factory.clone(),
            benchmark: self.benchmark.clone(),
            config: self.config.clone(),
            worker_count: self.benchmark.worker_count(),
            workloads: self.workloads.clone(),
            rate_controllers: self.rate_controllers.clone(),
        };
        let orchestrator: Box<dyn RoundOrchestrator> = match &self.orchestrator_builder {
            Some(builder) => builder(ctx),
            None => Box::new(LocalOrchestrator::new(ctx)),
        };
        let orchestrator = Arc::new(orchestrator);
        self.orchestrator.store(Some(orchestrator.clone()));

        let reports = orchestrator.run().await.map_err(EngineError::Test)?;
        info!("Benchmark rounds finished with {} report(s)", reports.len());
        Ok(())
    }

    async fn end(&self) -> Result<(), EngineError> {
        match &self.network.command.end {
            None | Some(Value::Null) => {
                info!("No end command configured, skipping");
                Ok(())
            }
            Some(Value::String(command)) if command.trim().is_empty() => {
                info!("End command is empty, skipping");
                Ok(())
            }
            Some(Value::String(command)) => {
                let command = format!("cd {}; {command}", self.config.workspace().display());
                self.executor
                    .execute(&command)
                    .await
                    .map_err(EngineError::EndCommand)
            }
            Some(other) => Err(EngineError::EndCommandNotString(json_type(other))),
        }
    }
}

/// First failure wins.
#[derive(Default)]
struct Outcome {
    code: Option<i32>,
}

impl Outcome {
    fn record<T>(&mut self, res: Result<T, EngineError>) -> Option<T> {
        match res {
            Ok(value) => Some(value),
            Err(err) => {
                match self.code {
                    None => {
                        error!("{err}");
                        self.code = Some(err.code());
                    }
                    Some(code) => error!("{err} (result code stays {code})"),
                }
                None
            }
        }
    }
}

async fn guarded<T, F>(phase: &'static str, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(EngineError::Unexpected(format!(
            "{phase} phase panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
