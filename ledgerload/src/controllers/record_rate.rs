use super::trace::{self, TraceFormat};
use super::{parse_opts, RateControlContext, RateController, RECORD_RATE};
use crate::error::RateControlError;
use async_trait::async_trait;
use ledgerload_core::{RateControlConfig, RoundConfig, TxStatistics};
use serde::Deserialize;
use std::path::PathBuf;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRateOptions {
    rate_controller: RateControlConfig,
    path_template: String,
    #[serde(default)]
    output_format: TraceFormat,
    #[serde(default)]
    log_end: bool,
}

/// Wraps another controller and records when each submission was released.
///
/// The recording is written on [`RateController::end`] in a format `replay-rate` can read back.
pub struct RecordRateController {
    inner: Box<dyn RateController>,
    stats: TxStatistics,
    path: PathBuf,
    format: TraceFormat,
    log_end: bool,
    records: Vec<u64>,
}

impl RecordRateController {
    pub fn new(ctx: RateControlContext<'_>) -> Result<Self, RateControlError> {
        let opts: RecordRateOptions = parse_opts(RECORD_RATE, &ctx.round.rate_control.opts)?;
        let path = trace::resolve_template(
            &opts.path_template,
            ctx.worker_index,
            ctx.round.round_index,
            ctx.config,
        );
        let capacity = ctx
            .round
            .worker_tx_number(ctx.worker_index)
            .unwrap_or_default() as usize;

        let inner_round = RoundConfig {
            rate_control: opts.rate_controller,
            ..ctx.round.clone()
        };
        let inner = ctx.registry.build(RateControlContext {
            round: inner_round,
            worker_index: ctx.worker_index,
            stats: ctx.stats.clone(),
            config: ctx.config,
            registry: ctx.registry,
        })?;

        Ok(Self {
            inner,
            stats: ctx.stats,
            path,
            format: opts.output_format,
            log_end: opts.log_end,
            records: Vec::with_capacity(capacity),
        })
    }

    pub fn records(&self) -> &[u64] {
        &self.records
    }
}

#[async_trait]
impl RateController for RecordRateController {
    async fn apply_rate_control(&mut self) {
        self.inner.apply_rate_control().await;

        let n = self.stats.total_submitted() as usize;
        let offset = self.stats.elapsed().as_millis() as u64;
        if n >= self.records.len() {
            self.records.resize(n + 1, 0);
        }
        self.records[n] = offset;
    }

    async fn end(&mut self) -> Result<(), RateControlError> {
        self.inner.end().await?;

        let io_err = |source| RateControlError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&self.path, trace::encode(&self.records, self.format))
            .await
            .map_err(io_err)?;

        if self.log_end {
            info!(
                "Recorded {} submission times to {}",
                self.records.len(),
                self.path.display()
            );
        }
        Ok(())
    }
}
