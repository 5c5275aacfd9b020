use super::{
    offset_instant, parse_opts, positive_rate, RateControlContext, RateController, LINEAR_RATE,
};
use crate::error::RateControlError;
use async_trait::async_trait;
use ledgerload_core::{RoundLength, TxStatistics};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinearRateOptions {
    starting_tps: f64,
    finishing_tps: f64,
}

/// Ramps the send rate linearly from `startingTps` to `finishingTps` over the round.
pub struct LinearRateController {
    stats: TxStatistics,
    length: Progress,
    starting_tps: f64,
    finishing_tps: f64,
    /// Send time of the next submission, keyed by the submitted count it was computed for.
    due: Option<(u64, Option<Instant>)>,
}

enum Progress {
    Elapsed(Duration),
    Submitted(u64),
}

impl LinearRateController {
    pub fn new(ctx: RateControlContext<'_>) -> Result<Self, RateControlError> {
        let opts: LinearRateOptions = parse_opts(LINEAR_RATE, &ctx.round.rate_control.opts)?;
        let workers = ctx.round.total_workers.max(1) as f64;

        let length = match ctx.round.length {
            RoundLength::Duration(d) => Progress::Elapsed(d),
            RoundLength::TxNumber(_) => Progress::Submitted(
                ctx.round
                    .worker_tx_number(ctx.worker_index)
                    .unwrap_or_default(),
            ),
        };

        Ok(Self {
            stats: ctx.stats,
            length,
            starting_tps: positive_rate(LINEAR_RATE, "startingTps", opts.starting_tps)? / workers,
            finishing_tps: positive_rate(LINEAR_RATE, "finishingTps", opts.finishing_tps)?
                / workers,
            due: None,
        })
    }

    fn progress(&self) -> f64 {
        let progress = match self.length {
            Progress::Elapsed(total) if !total.is_zero() => {
                self.stats.elapsed().as_secs_f64() / total.as_secs_f64()
            }
            Progress::Submitted(total) if total > 0 => {
                self.stats.total_submitted() as f64 / total as f64
            }
            _ => 1.,
        };
        progress.clamp(0., 1.)
    }

    /// Per-worker rate at the current point of the round.
    pub fn current_tps(&self) -> f64 {
        self.starting_tps + (self.finishing_tps - self.starting_tps) * self.progress()
    }
}

#[async_trait]
impl RateController for LinearRateController {
    async fn apply_rate_control(&mut self) {
        let submitted = self.stats.total_submitted();
        if submitted == 0 {
            return;
        }

        // An interrupted wait resumes towards the same send time.
        let due = match self.due {
            Some((count, due)) if count == submitted => due,
            _ => {
                let due = offset_instant(Instant::now(), self.current_tps().recip());
                self.due = Some((submitted, due));
                due
            }
        };
        match due {
            Some(due) => tokio::time::sleep_until(due).await,
            None => std::future::pending().await,
        }
    }
}
