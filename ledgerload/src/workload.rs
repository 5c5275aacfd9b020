use crate::connector::Dispatcher;
use crate::error::WorkloadError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// What a workload module learns about its worker and round before the first submission.
#[derive(Clone, Debug)]
pub struct WorkloadContext {
    pub worker_index: usize,
    pub total_workers: usize,
    pub round_index: usize,
    pub round_label: String,
    pub arguments: Value,
    /// Value returned by the worker connector's `get_context`.
    pub connector_context: Value,
}

/// Produces the requests of one round on one worker.
#[async_trait]
pub trait WorkloadModule: Send + Sync {
    async fn init(&mut self, _ctx: &WorkloadContext) -> Result<(), WorkloadError> {
        Ok(())
    }

    /// Submit one unit of work. May issue any number of requests through `dispatcher`.
    async fn submit_transaction(&self, dispatcher: &Dispatcher) -> Result<(), WorkloadError>;

    async fn cleanup(&self) -> Result<(), WorkloadError> {
        Ok(())
    }
}

pub type WorkloadBuilder =
    Box<dyn Fn(&Value) -> Result<Box<dyn WorkloadModule>, WorkloadError> + Send + Sync>;

/// Maps a round's `workload.module` name to a module constructor. Constructors receive the
/// round's `workload.arguments`.
#[derive(Default)]
pub struct WorkloadFactory {
    builders: HashMap<String, WorkloadBuilder>,
}

impl WorkloadFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, module: &str, builder: F)
    where
        F: Fn(&Value) -> Result<Box<dyn WorkloadModule>, WorkloadError> + Send + Sync + 'static,
    {
        self.builders.insert(module.to_string(), Box::new(builder));
    }

    pub fn with<F>(mut self, module: &str, builder: F) -> Self
    where
        F: Fn(&Value) -> Result<Box<dyn WorkloadModule>, WorkloadError> + Send + Sync + 'static,
    {
        self.register(module, builder);
        self
    }

    pub fn contains(&self, module: &str) -> bool {
        self.builders.contains_key(module)
    }

    pub fn create(
        &self,
        module: &str,
        arguments: &Value,
    ) -> Result<Box<dyn WorkloadModule>, WorkloadError> {
        let builder = self
            .builders
            .get(module)
            .ok_or_else(|| WorkloadError::UnknownModule(module.to_string()))?;
        builder(arguments)
    }
}

impl std::fmt::Debug for WorkloadFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut modules: Vec<_> = self.builders.keys().collect();
        modules.sort();
        f.debug_struct("WorkloadFactory")
            .field("modules", &modules)
            .finish()
    }
}
