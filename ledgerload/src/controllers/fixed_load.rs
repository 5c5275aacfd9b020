use super::{parse_opts, RateControlContext, RateController, FIXED_LOAD};
use crate::error::RateControlError;
use async_trait::async_trait;
use ledgerload_core::{TxStatistics, DEFAULT_TRANSACTION_LOAD};
use serde::Deserialize;
use std::time::Duration;

const MIN_WAIT: Duration = Duration::from_millis(1);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixedLoadOptions {
    #[serde(default = "default_load")]
    transaction_load: u64,
}

fn default_load() -> u64 {
    DEFAULT_TRANSACTION_LOAD
}

/// Keeps a constant number of unfinished transactions in flight.
pub struct FixedLoadController {
    stats: TxStatistics,
    target_backlog: u64,
}

impl FixedLoadController {
    pub fn new(ctx: RateControlContext<'_>) -> Result<Self, RateControlError> {
        let opts: FixedLoadOptions = parse_opts(FIXED_LOAD, &ctx.round.rate_control.opts)?;
        if opts.transaction_load == 0 {
            return Err(RateControlError::InvalidValue {
                kind: FIXED_LOAD.to_string(),
                reason: "transactionLoad must be at least 1".to_string(),
            });
        }

        let workers = ctx.round.total_workers.max(1) as u64;
        Ok(Self {
            stats: ctx.stats,
            target_backlog: opts.transaction_load.div_ceil(workers).max(1),
        })
    }

    pub fn target_backlog(&self) -> u64 {
        self.target_backlog
    }
}

#[async_trait]
impl RateController for FixedLoadController {
    async fn apply_rate_control(&mut self) {
        while self.stats.backlog() >= self.target_backlog {
            let wait = self.stats.average_latency().unwrap_or(MIN_WAIT).max(MIN_WAIT);
            tokio::time::sleep(wait).await;
        }
    }
}
