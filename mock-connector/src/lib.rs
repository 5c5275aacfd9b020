//! An in-memory ledger to benchmark against.
//!
//! Requests take a sampled latency, may be throttled by a throughput cap and may be rejected at a
//! configurable rate. Requests carrying `"fail": true` make the connector itself error.
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use ledgerload::prelude::*;
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const CONNECTOR_TYPE: &str = "mock-ledger";

#[derive(Clone, Debug)]
pub struct MockSettings {
    /// Mean request latency.
    pub latency: Duration,
    /// Standard deviation of the request latency.
    pub jitter: Duration,
    /// Ledger-wide commit cap. Requests above it are rejected.
    pub max_tps: Option<NonZeroU32>,
    /// Share of requests rejected regardless of load.
    pub failure_rate: f64,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            jitter: Duration::ZERO,
            max_tps: None,
            failure_rate: 0.,
        }
    }
}

struct LedgerState {
    limiter: Option<DefaultDirectRateLimiter>,
    latency: Option<Normal<f64>>,
    settings: MockSettings,
    next_id: AtomicU64,
    committed: AtomicU64,
    rejected: AtomicU64,
    installed: AtomicBool,
    initialized: AtomicU64,
    contexts: AtomicU64,
}

/// The shared ledger. Hands out one [`MockConnector`] per worker, all writing to the same state.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<LedgerState>,
}

impl MockLedger {
    pub fn new(settings: MockSettings) -> Self {
        let latency = Normal::new(
            settings.latency.as_secs_f64() * 1e3,
            settings.jitter.as_secs_f64() * 1e3,
        )
        .ok();

        Self {
            state: Arc::new(LedgerState {
                limiter: settings.max_tps.map(|tps| RateLimiter::direct(Quota::per_second(tps))),
                latency,
                settings,
                next_id: AtomicU64::new(0),
                committed: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
                installed: AtomicBool::new(false),
                initialized: AtomicU64::new(0),
                contexts: AtomicU64::new(0),
            }),
        }
    }

    pub fn connector(&self, worker_index: Option<usize>) -> MockConnector {
        MockConnector {
            state: self.state.clone(),
            worker_index,
        }
    }

    pub fn committed(&self) -> u64 {
        self.state.committed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.state.rejected.load(Ordering::Relaxed)
    }

    pub fn is_installed(&self) -> bool {
        self.state.installed.load(Ordering::Relaxed)
    }

    /// Number of `init` calls across all connectors.
    pub fn initialized(&self) -> u64 {
        self.state.initialized.load(Ordering::Relaxed)
    }

    /// Worker contexts currently held.
    pub fn open_contexts(&self) -> u64 {
        self.state.contexts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ConnectorFactory for MockLedger {
    async fn create(
        &self,
        worker_index: Option<usize>,
    ) -> Result<Arc<dyn Connector>, ConnectorError> {
        Ok(Arc::new(self.connector(worker_index)))
    }
}

pub struct MockConnector {
    state: Arc<LedgerState>,
    worker_index: Option<usize>,
}

impl MockConnector {
    fn sample_latency(&self) -> Duration {
        match &self.state.latency {
            Some(normal) => {
                Duration::from_secs_f64(normal.sample(&mut rand::thread_rng()).max(0.) / 1e3)
            }
            None => self.state.settings.latency,
        }
    }

    fn reject(&self) -> Option<&'static str> {
        if let Some(limiter) = &self.state.limiter {
            if limiter.check().is_err() {
                return Some("ledger is over capacity");
            }
        }
        let failure_rate = self.state.settings.failure_rate.clamp(0., 1.);
        if failure_rate > 0. && rand::thread_rng().gen_bool(failure_rate) {
            return Some("transaction rejected by endorsement");
        }
        None
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn connector_type(&self) -> &str {
        CONNECTOR_TYPE
    }

    fn worker_index(&self) -> Option<usize> {
        self.worker_index
    }

    async fn init(&self, worker_init: bool) -> Result<(), ConnectorError> {
        debug!("Mock ledger init (worker: {worker_init})");
        self.state.initialized.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn install_smart_contract(&self) -> Result<(), ConnectorError> {
        self.state.installed.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn prepare_worker_arguments(
        &self,
        worker_count: usize,
    ) -> Result<Vec<WorkerArgs>, ConnectorError> {
        Ok((0..worker_count)
            .map(|i| json!({ "accountPrefix": format!("acc-{i}-") }))
            .collect())
    }

    async fn get_context(
        &self,
        round_index: usize,
        args: WorkerArgs,
    ) -> Result<Value, ConnectorError> {
        self.state.contexts.fetch_add(1, Ordering::Relaxed);
        Ok(json!({ "round": round_index, "accountPrefix": args["accountPrefix"] }))
    }

    async fn release_context(&self) -> Result<(), ConnectorError> {
        self.state.contexts.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    async fn send_single_request(&self, request: &Request) -> Result<TxStatus, ConnectorError> {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let mut record = TxStatus::new(format!("tx-{id}"));

        let latency = self.sample_latency();
        tokio::time::sleep(latency).await;

        if request["fail"].as_bool().unwrap_or(false) {
            return Err(ConnectorError::Request(format!("tx-{id} could not be sent")));
        }

        match self.reject() {
            Some(reason) => {
                self.state.rejected.fetch_add(1, Ordering::Relaxed);
                counter!("mock_ledger_rejected").increment(1);
                record.set_failed(None);
                record.set_error_message(0, reason);
            }
            None => {
                self.state.committed.fetch_add(1, Ordering::Relaxed);
                counter!("mock_ledger_committed").increment(1);
                record.set_success(None);
                record.set_result(request.clone());
            }
        }
        Ok(record)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferArguments {
    #[serde(default = "default_accounts")]
    accounts: u32,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
}

fn default_accounts() -> u32 {
    100
}

fn default_batch_size() -> usize {
    1
}

/// Moves funds between random accounts, one request or one batch per submission.
pub struct TransferWorkload {
    args: TransferArguments,
    prefix: String,
}

impl TransferWorkload {
    fn transfer(&self) -> Request {
        let mut rng = rand::thread_rng();
        let from = rng.gen_range(0..self.args.accounts);
        let to = rng.gen_range(0..self.args.accounts);
        json!({
            "op": "transfer",
            "from": format!("{}{from}", self.prefix),
            "to": format!("{}{to}", self.prefix),
            "amount": rng.gen_range(1..100),
        })
    }
}

#[async_trait]
impl WorkloadModule for TransferWorkload {
    async fn init(&mut self, ctx: &WorkloadContext) -> Result<(), WorkloadError> {
        self.prefix = ctx.connector_context["accountPrefix"]
            .as_str()
            .unwrap_or("acc-")
            .to_string();
        Ok(())
    }

    async fn submit_transaction(&self, dispatcher: &Dispatcher) -> Result<(), WorkloadError> {
        if self.args.batch_size > 1 {
            let batch: Vec<_> = (0..self.args.batch_size).map(|_| self.transfer()).collect();
            dispatcher.send_requests(batch).await?;
        } else {
            let request = self.transfer();
            dispatcher.send_requests(request).await?;
        }
        Ok(())
    }
}

/// Workload factory with the `transfer` module registered.
pub fn workloads() -> WorkloadFactory {
    WorkloadFactory::new().with("transfer", |args| {
        let args: TransferArguments = match args {
            Value::Null => serde_json::from_value(json!({}))?,
            args => serde_json::from_value(args.clone())?,
        };
        if args.accounts == 0 {
            return Err(WorkloadError::Other("accounts must be at least 1".to_string()));
        }
        Ok(Box::new(TransferWorkload {
            args,
            prefix: String::new(),
        }) as Box<dyn WorkloadModule>)
    })
}
