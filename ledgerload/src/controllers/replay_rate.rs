use super::trace::{self, TraceFormat};
use super::{parse_opts, RateControlContext, RateController, REPLAY_RATE};
use crate::error::RateControlError;
use async_trait::async_trait;
use ledgerload_core::TxStatistics;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayRateOptions {
    path_template: String,
    #[serde(default)]
    input_format: TraceFormat,
    #[serde(default)]
    log_warnings: bool,
}

/// Replays recorded submission times from a trace file.
///
/// Submission `N` is released at `offset[N]` milliseconds after the round start. Past the end of
/// the trace the last recorded interval is repeated.
pub struct ReplayRateController {
    stats: TxStatistics,
    path: PathBuf,
    offsets: Vec<u64>,
    log_warnings: bool,
    overflowed: bool,
}

impl ReplayRateController {
    pub fn new(ctx: RateControlContext<'_>) -> Result<Self, RateControlError> {
        let opts: ReplayRateOptions = parse_opts(REPLAY_RATE, &ctx.round.rate_control.opts)?;
        let path = trace::resolve_template(
            &opts.path_template,
            ctx.worker_index,
            ctx.round.round_index,
            ctx.config,
        );
        let offsets = trace::load(&path, opts.input_format)?;
        debug!(
            "Loaded {} replay offsets for worker {} from {}",
            offsets.len(),
            ctx.worker_index,
            path.display()
        );

        Ok(Self {
            stats: ctx.stats,
            path,
            offsets,
            log_warnings: opts.log_warnings,
            overflowed: false,
        })
    }

    pub fn trace_len(&self) -> usize {
        self.offsets.len()
    }

    /// Offset of the `n`th submission, `None` for an empty trace.
    pub fn offset(&self, n: usize) -> Option<u64> {
        if let Some(offset) = self.offsets.get(n) {
            return Some(*offset);
        }

        let len = self.offsets.len();
        let last = *self.offsets.last()?;
        let interval = match len {
            1 => last,
            _ => last.saturating_sub(self.offsets[len - 2]),
        };
        let extra = (n - len + 1) as u64;
        Some(last.saturating_add(extra.saturating_mul(interval)))
    }
}

#[async_trait]
impl RateController for ReplayRateController {
    async fn apply_rate_control(&mut self) {
        let Some(start) = self.stats.started_at() else {
            return;
        };

        let n = self.stats.total_submitted() as usize;
        if n >= self.offsets.len() && !self.overflowed {
            self.overflowed = true;
            if self.log_warnings {
                warn!(
                    "Replay trace {} exhausted after {} submissions; repeating the last interval",
                    self.path.display(),
                    self.offsets.len()
                );
            }
        }

        if let Some(offset) = self.offset(n) {
            match start.checked_add(Duration::from_millis(offset)) {
                Some(due) => tokio::time::sleep_until(due).await,
                None => std::future::pending().await,
            }
        }
    }
}
