use super::{
    offset_instant, parse_opts, positive_rate, RateControlContext, RateController, FIXED_RATE,
};
use crate::error::RateControlError;
use async_trait::async_trait;
use ledgerload_core::{TxStatistics, DEFAULT_FIXED_TPS};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FixedRateOptions {
    #[serde(default = "default_tps")]
    tps: f64,
}

fn default_tps() -> f64 {
    DEFAULT_FIXED_TPS
}

/// Sends at a constant rate. The configured `tps` is shared evenly between workers.
pub struct FixedRateController {
    stats: TxStatistics,
    worker_tps: f64,
}

impl FixedRateController {
    pub fn new(ctx: RateControlContext<'_>) -> Result<Self, RateControlError> {
        let opts: FixedRateOptions = parse_opts(FIXED_RATE, &ctx.round.rate_control.opts)?;
        let tps = positive_rate(FIXED_RATE, "tps", opts.tps)?;

        Ok(Self {
            stats: ctx.stats,
            worker_tps: tps / ctx.round.total_workers.max(1) as f64,
        })
    }

    pub fn worker_tps(&self) -> f64 {
        self.worker_tps
    }
}

#[async_trait]
impl RateController for FixedRateController {
    async fn apply_rate_control(&mut self) {
        let Some(start) = self.stats.started_at() else {
            return;
        };

        let ideal = self.stats.total_submitted() as f64 / self.worker_tps;
        match offset_instant(start, ideal) {
            Some(due) => tokio::time::sleep_until(due).await,
            // Beyond any clock; only the round deadline or a stop ends the wait.
            None => std::future::pending().await,
        }
    }
}
