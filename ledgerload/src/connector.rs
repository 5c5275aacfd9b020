//! Connector contract and the shared dispatch layer
//!
//! A [`Connector`] adapts generic benchmark requests to one target system. Only
//! [`Connector::send_single_request`] must be written by an adapter; every other capability has
//! a default which either fails with [`ConnectorError::NotImplemented`] naming the missing
//! method, or (for [`Connector::prepare_worker_arguments`]) does the obvious thing.
//!
//! Batching, telemetry and partial-failure handling live in [`Dispatcher`], which wraps any
//! connector.
use crate::error::ConnectorError;
use async_trait::async_trait;
use ledgerload_core::TxStatus;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

mod dispatch;
mod events;

pub use dispatch::{Dispatched, Dispatcher, Requests};
pub use events::{Finished, Telemetry, TxEvent, TxEventListener};

/// A connector-specific request. The workload produces it, the connector interprets it.
pub type Request = Value;

/// Per-worker arguments produced on the manager side and handed to each worker's
/// [`Connector::get_context`].
pub type WorkerArgs = Value;

/// Capability interface every target-system adapter exposes.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Identifier of the target system, e.g. `"fabric"`.
    fn connector_type(&self) -> &str;

    /// Index of the owning worker; `None` for the manager-side instance.
    fn worker_index(&self) -> Option<usize>;

    async fn init(&self, _worker_init: bool) -> Result<(), ConnectorError> {
        Err(ConnectorError::NotImplemented("init"))
    }

    async fn install_smart_contract(&self) -> Result<(), ConnectorError> {
        Err(ConnectorError::NotImplemented("install_smart_contract"))
    }

    /// Produce one argument object per worker. Defaults to empty objects.
    async fn prepare_worker_arguments(
        &self,
        worker_count: usize,
    ) -> Result<Vec<WorkerArgs>, ConnectorError> {
        Ok(vec![Value::Object(Map::new()); worker_count])
    }

    async fn get_context(
        &self,
        _round_index: usize,
        _args: WorkerArgs,
    ) -> Result<Value, ConnectorError> {
        Err(ConnectorError::NotImplemented("get_context"))
    }

    async fn release_context(&self) -> Result<(), ConnectorError> {
        Err(ConnectorError::NotImplemented("release_context"))
    }

    /// Submit one request and describe its outcome.
    async fn send_single_request(&self, request: &Request) -> Result<TxStatus, ConnectorError>;
}

/// Produces connectors: `None` asks for the manager-side instance, `Some(i)` for worker `i`.
///
/// Implemented for any `Fn(Option<usize>) -> impl Future<Output = Result<..>>`, so a plain
/// closure works. Synchronous factories can return `std::future::ready(..)`.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn create(&self, worker_index: Option<usize>)
        -> Result<Arc<dyn Connector>, ConnectorError>;
}

#[async_trait]
impl<F, Fut> ConnectorFactory for F
where
    F: Fn(Option<usize>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Arc<dyn Connector>, ConnectorError>> + Send + 'static,
{
    async fn create(
        &self,
        worker_index: Option<usize>,
    ) -> Result<Arc<dyn Connector>, ConnectorError> {
        self(worker_index).await
    }
}
