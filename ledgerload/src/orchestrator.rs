//! Round orchestration
//!
//! The engine only sees [`RoundOrchestrator`]. [`LocalOrchestrator`] runs every worker as a
//! tokio task inside the current process.
use crate::connector::{Connector, ConnectorFactory, Dispatcher, WorkerArgs};
use crate::controllers::{RateController, RateControllerRegistry};
use crate::error::{OrchestratorError, WorkloadError};
use crate::workload::{WorkloadContext, WorkloadFactory, WorkloadModule};
use async_trait::async_trait;
use futures_util::{stream::FuturesUnordered, FutureExt, StreamExt};
use ledgerload_core::{BenchmarkConfig, Config, RoundConfig, RoundStatistics, TxStatistics};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
#[allow(unused)]
use tracing::{debug, error, info, instrument, trace, warn, Instrument};

#[async_trait]
pub trait RoundOrchestrator: Send + Sync {
    /// Run every round in order, returning one report per worker and round.
    async fn run(&self) -> Result<Vec<RoundStatistics>, OrchestratorError>;

    /// Ask a running orchestrator to wind down. Must not block.
    fn stop(&self);
}

/// What the engine hands to an orchestrator builder.
pub struct OrchestratorContext {
    /// Manager-side connector, already initialized.
    pub connector: Arc<dyn Connector>,
    pub connector_factory: Arc<dyn ConnectorFactory>,
    pub benchmark: BenchmarkConfig,
    pub config: Config,
    pub worker_count: usize,
    pub workloads: Arc<WorkloadFactory>,
    pub rate_controllers: Arc<RateControllerRegistry>,
}

pub type OrchestratorBuilder =
    Box<dyn Fn(OrchestratorContext) -> Box<dyn RoundOrchestrator> + Send + Sync>;

pub struct LocalOrchestrator {
    connector: Arc<dyn Connector>,
    connector_factory: Arc<dyn ConnectorFactory>,
    benchmark: BenchmarkConfig,
    config: Arc<Config>,
    worker_count: usize,
    workloads: Arc<WorkloadFactory>,
    rate_controllers: Arc<RateControllerRegistry>,
    cancel: CancellationToken,
}

impl LocalOrchestrator {
    pub fn new(ctx: OrchestratorContext) -> Self {
        Self {
            connector: ctx.connector,
            connector_factory: ctx.connector_factory,
            benchmark: ctx.benchmark,
            config: Arc::new(ctx.config),
            worker_count: ctx.worker_count,
            workloads: ctx.workloads,
            rate_controllers: ctx.rate_controllers,
            cancel: CancellationToken::new(),
        }
    }

    async fn worker_connectors(&self) -> Result<Vec<Arc<dyn Connector>>, OrchestratorError> {
        let mut connectors = Vec::with_capacity(self.worker_count);
        for worker_index in 0..self.worker_count {
            let connector = self.connector_factory.create(Some(worker_index)).await?;
            connector.init(true).await?;
            connectors.push(connector);
        }
        Ok(connectors)
    }

    async fn run_round(
        &self,
        round: &RoundConfig,
        connectors: &[Arc<dyn Connector>],
        args: &[WorkerArgs],
    ) -> Result<Vec<RoundStatistics>, OrchestratorError> {
        let round_cancel = self.cancel.child_token();
        let mut set = JoinSet::new();

        for (index, (connector, args)) in connectors.iter().zip(args).enumerate() {
            let worker = Worker {
                index,
                connector: connector.clone(),
                args: args.clone(),
                round: round.clone(),
                config: self.config.clone(),
                workloads: self.workloads.clone(),
                rate_controllers: self.rate_controllers.clone(),
                cancel: round_cancel.clone(),
            };
            set.spawn(worker.run());
        }

        let mut reports = Vec::with_capacity(connectors.len());
        let mut first_error = None;
        while let Some(res) = set.join_next().await {
            match res.map_err(OrchestratorError::from).and_then(|r| r) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!("Worker failed in round {}: {err}", round.label);
                    round_cancel.cancel();
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                reports.sort_by_key(|r| r.worker_index);
                Ok(reports)
            }
        }
    }
}

#[async_trait]
impl RoundOrchestrator for LocalOrchestrator {
    #[instrument(name = "orchestrator", skip_all, fields(workers = self.worker_count))]
    async fn run(&self) -> Result<Vec<RoundStatistics>, OrchestratorError> {
        let rounds = self.benchmark.rounds()?;

        let args = self
            .connector
            .prepare_worker_arguments(self.worker_count)
            .await?;
        if args.len() != self.worker_count {
            return Err(OrchestratorError::WorkerArguments {
                expected: self.worker_count,
                actual: args.len(),
            });
        }

        let connectors = self.worker_connectors().await?;

        let mut reports = vec![];
        for round in &rounds {
            if self.cancel.is_cancelled() {
                warn!(
                    "Benchmark stopped; skipping {} remaining round(s)",
                    rounds.len() - round.round_index
                );
                break;
            }

            info!(
                "Round {} \"{}\" started with {} worker(s) for {}",
                round.round_index, round.label, self.worker_count, round.length
            );
            let round_reports = self.run_round(round, &connectors, &args).await?;
            for report in &round_reports {
                info!("{report}");
            }
            reports.extend(round_reports);
        }

        Ok(reports)
    }

    fn stop(&self) {
        info!("Stopping benchmark rounds");
        self.cancel.cancel();
    }
}

struct Worker {
    index: usize,
    connector: Arc<dyn Connector>,
    args: WorkerArgs,
    round: RoundConfig,
    config: Arc<Config>,
    workloads: Arc<WorkloadFactory>,
    rate_controllers: Arc<RateControllerRegistry>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> Result<RoundStatistics, OrchestratorError> {
        let span = tracing::info_span!("worker", index = self.index, round = self.round.round_index);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&self) -> Result<RoundStatistics, OrchestratorError> {
        let connector_context = self
            .connector
            .get_context(self.round.round_index, self.args.clone())
            .await?;

        let res = self.run_with_context(connector_context).await;
        let released = self.connector.release_context().await;
        match (res, released) {
            (Ok(report), released) => released.map(|_| report).map_err(OrchestratorError::from),
            (Err(err), Err(release_err)) => {
                warn!("Releasing the connector context failed: {release_err}");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }

    async fn run_with_context(
        &self,
        connector_context: Value,
    ) -> Result<RoundStatistics, OrchestratorError> {
        let dispatcher = Dispatcher::new(self.connector.clone());
        let stats = TxStatistics::new(self.index, self.round.round_index);
        dispatcher.telemetry().subscribe(Arc::new(stats.clone()));

        let mut controller = self.rate_controllers.create(
            self.round.clone(),
            self.index,
            stats.clone(),
            &self.config,
        )?;

        let mut workload = self
            .workloads
            .create(&self.round.workload.module, &self.round.workload.arguments)?;
        workload
            .init(&WorkloadContext {
                worker_index: self.index,
                total_workers: self.round.total_workers,
                round_index: self.round.round_index,
                round_label: self.round.label.clone(),
                arguments: self.round.workload.arguments.clone(),
                connector_context,
            })
            .await?;

        stats.activate();
        self.submit_loop(controller.as_mut(), workload.as_ref(), &dispatcher)
            .await;
        stats.deactivate();

        let ended = controller.end().await.map_err(OrchestratorError::from);
        let cleaned = workload.cleanup().await.map_err(OrchestratorError::from);
        ended.and(cleaned)?;

        let report = stats.summary();
        debug!("Worker finished: {report}");
        Ok(report)
    }

    async fn submit_loop(
        &self,
        controller: &mut dyn RateController,
        workload: &dyn WorkloadModule,
        dispatcher: &Dispatcher,
    ) {
        let deadline = self.round.duration().map(|d| Instant::now() + d);
        let limit = self.round.worker_tx_number(self.index);
        let mut in_flight = FuturesUnordered::new();
        let mut issued = 0u64;

        loop {
            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            let exhausted = limit.is_some_and(|l| issued >= l);
            if self.cancel.is_cancelled() || expired || exhausted {
                break;
            }

            let deadline_reached = async {
                match deadline {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = deadline_reached => break,
                Some(res) = in_flight.next(), if !in_flight.is_empty() => {
                    log_submission(res);
                    continue;
                }
                _ = controller.apply_rate_control() => {}
            }

            in_flight.push(workload.submit_transaction(dispatcher));
            issued += 1;

            // Poll the new submission once so its submitted event precedes the next pacing decision.
            while let Some(Some(res)) = in_flight.next().now_or_never() {
                log_submission(res);
            }
        }

        trace!("Draining {} in-flight submission(s)", in_flight.len());
        while let Some(res) = in_flight.next().await {
            log_submission(res);
        }
    }
}

fn log_submission(res: Result<(), WorkloadError>) {
    if let Err(err) = res {
        debug!("Submission failed: {err}");
    }
}
