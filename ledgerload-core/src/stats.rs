use crate::{now_ms, TxState, TxStatus};
use serde::Serialize;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::time::Instant;

const UNSET: u64 = u64::MAX;

/// Per-worker, per-round transaction counters.
///
/// Cheap to clone; clones share the same counters. The dispatch path writes through
/// [`TxStatistics::tx_submitted`] and [`TxStatistics::tx_finished`] while the collector is
/// active; rate controllers only read.
#[derive(Clone, Debug)]
pub struct TxStatistics {
    inner: Arc<StatisticsAtomics>,
}

#[derive(Debug)]
struct StatisticsAtomics {
    worker_index: usize,
    round_index: usize,
    epoch: Instant,
    active: AtomicBool,
    started_nanos: AtomicU64,
    round_start_ms: AtomicU64,
    round_finish_ms: AtomicU64,
    submitted: AtomicU64,
    finished: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_min_ms: AtomicU64,
    latency_max_ms: AtomicU64,
}

impl TxStatistics {
    pub fn new(worker_index: usize, round_index: usize) -> Self {
        Self {
            inner: Arc::new(StatisticsAtomics {
                worker_index,
                round_index,
                epoch: Instant::now(),
                active: AtomicBool::new(false),
                started_nanos: AtomicU64::new(UNSET),
                round_start_ms: AtomicU64::new(0),
                round_finish_ms: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                finished: AtomicU64::new(0),
                successful: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                latency_total_ms: AtomicU64::new(0),
                latency_min_ms: AtomicU64::new(UNSET),
                latency_max_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn worker_index(&self) -> usize {
        self.inner.worker_index
    }

    pub fn round_index(&self) -> usize {
        self.inner.round_index
    }

    /// Start counting and stamp the round start.
    pub fn activate(&self) {
        let nanos = self.inner.epoch.elapsed().as_nanos() as u64;
        self.inner.started_nanos.store(nanos, Ordering::Relaxed);
        self.inner.round_start_ms.store(now_ms(), Ordering::Relaxed);
        self.inner.active.store(true, Ordering::Release);
    }

    /// Stop counting and stamp the round finish.
    pub fn deactivate(&self) {
        self.inner.active.store(false, Ordering::Release);
        self.inner.round_finish_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn tx_submitted(&self, count: u64) {
        if !self.is_active() {
            return;
        }
        self.inner.submitted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn tx_finished(&self, results: &[TxStatus]) {
        if !self.is_active() {
            return;
        }

        for result in results {
            self.inner.finished.fetch_add(1, Ordering::Relaxed);
            match result.status() {
                TxState::Success => {
                    self.inner.successful.fetch_add(1, Ordering::Relaxed);
                    if let Some(latency) = result.latency_ms() {
                        self.record_latency(latency);
                    }
                }
                TxState::Failed => {
                    self.inner.failed.fetch_add(1, Ordering::Relaxed);
                }
                // NOTE: A non-terminal record reported as finished still counts as finished.
                TxState::Created => {}
            }
        }
    }

    fn record_latency(&self, latency: u64) {
        self.inner
            .latency_total_ms
            .fetch_add(latency, Ordering::Relaxed);
        self.inner
            .latency_min_ms
            .fetch_min(latency, Ordering::Relaxed);
        self.inner
            .latency_max_ms
            .fetch_max(latency, Ordering::Relaxed);
    }

    pub fn total_submitted(&self) -> u64 {
        self.inner.submitted.load(Ordering::Relaxed)
    }

    pub fn total_finished(&self) -> u64 {
        self.inner.finished.load(Ordering::Relaxed)
    }

    pub fn total_successful(&self) -> u64 {
        self.inner.successful.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Submitted transactions that have not finished yet.
    pub fn backlog(&self) -> u64 {
        self.total_submitted()
            .saturating_sub(self.total_finished())
    }

    /// Round start in milliseconds since the Unix epoch, 0 before activation.
    pub fn round_start_ms(&self) -> u64 {
        self.inner.round_start_ms.load(Ordering::Relaxed)
    }

    /// Round finish in milliseconds since the Unix epoch, 0 before deactivation.
    pub fn round_finish_ms(&self) -> u64 {
        self.inner.round_finish_ms.load(Ordering::Relaxed)
    }

    /// Monotonic round start, used as the pacing anchor.
    pub fn started_at(&self) -> Option<Instant> {
        match self.inner.started_nanos.load(Ordering::Relaxed) {
            UNSET => None,
            nanos => Some(self.inner.epoch + Duration::from_nanos(nanos)),
        }
    }

    /// Time since the round started, zero before activation.
    pub fn elapsed(&self) -> Duration {
        self.started_at()
            .map(|start| start.elapsed())
            .unwrap_or_default()
    }

    pub fn average_latency(&self) -> Option<Duration> {
        let successful = self.total_successful();
        (successful > 0).then(|| {
            let total = self.inner.latency_total_ms.load(Ordering::Relaxed);
            Duration::from_millis(total / successful)
        })
    }

    pub fn min_latency(&self) -> Option<Duration> {
        match self.inner.latency_min_ms.load(Ordering::Relaxed) {
            UNSET => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn max_latency(&self) -> Option<Duration> {
        (self.total_successful() > 0).then(|| {
            Duration::from_millis(self.inner.latency_max_ms.load(Ordering::Relaxed))
        })
    }

    pub fn summary(&self) -> RoundStatistics {
        RoundStatistics {
            worker_index: self.worker_index(),
            round_index: self.round_index(),
            submitted: self.total_submitted(),
            successful: self.total_successful(),
            failed: self.total_failed(),
            round_start_ms: self.round_start_ms(),
            round_finish_ms: self.round_finish_ms(),
            average_latency: self.average_latency(),
            min_latency: self.min_latency(),
            max_latency: self.max_latency(),
        }
    }
}

/// Snapshot of one worker's round.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoundStatistics {
    pub worker_index: usize,
    pub round_index: usize,
    pub submitted: u64,
    pub successful: u64,
    pub failed: u64,
    pub round_start_ms: u64,
    pub round_finish_ms: u64,
    pub average_latency: Option<Duration>,
    pub min_latency: Option<Duration>,
    pub max_latency: Option<Duration>,
}

impl RoundStatistics {
    pub fn send_rate(&self) -> f64 {
        let elapsed_ms = self.round_finish_ms.saturating_sub(self.round_start_ms);
        if elapsed_ms == 0 {
            0.
        } else {
            self.submitted as f64 / elapsed_ms as f64 * 1e3
        }
    }
}

impl fmt::Display for RoundStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let latency = |d: Option<Duration>| {
            d.map(|d| humantime::format_duration(d).to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        write!(
            f,
            "worker={} round={} submitted={} succ={} fail={} rate={:.2}TPS avg={} min={} max={}",
            self.worker_index,
            self.round_index,
            self.submitted,
            self.successful,
            self.failed,
            self.send_rate(),
            latency(self.average_latency),
            latency(self.min_latency),
            latency(self.max_latency),
        )
    }
}
