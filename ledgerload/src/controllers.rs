//! Rate control
//!
//! A [`RateController`] paces one worker during one round. Controllers are looked up by the
//! round's `rateControl.type` tag in a [`RateControllerRegistry`], which comes pre-populated with
//! the built-in controllers and accepts custom ones through [`RateControllerRegistry::register`].
mod fixed_load;
mod fixed_rate;
mod linear_rate;
mod record_rate;
mod replay_rate;
pub mod trace;

pub use fixed_load::FixedLoadController;
pub use fixed_rate::FixedRateController;
pub use linear_rate::LinearRateController;
pub use record_rate::RecordRateController;
pub use replay_rate::ReplayRateController;

use crate::error::RateControlError;
use async_trait::async_trait;
use ledgerload_core::{Config, RoundConfig, TxStatistics};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

pub const FIXED_RATE: &str = "fixed-rate";
pub const LINEAR_RATE: &str = "linear-rate";
pub const FIXED_LOAD: &str = "fixed-load";
pub const REPLAY_RATE: &str = "replay-rate";
pub const RECORD_RATE: &str = "record-rate";

#[async_trait]
pub trait RateController: Send {
    /// Suspend until the next submission is due. Never mutates the statistics it reads.
    async fn apply_rate_control(&mut self);

    /// Called once after the worker's last submission of the round.
    async fn end(&mut self) -> Result<(), RateControlError> {
        Ok(())
    }
}

/// Everything a controller may look at while being built.
pub struct RateControlContext<'a> {
    pub round: RoundConfig,
    pub worker_index: usize,
    pub stats: TxStatistics,
    pub config: &'a Config,
    /// Lets wrapping controllers build the controller they wrap.
    pub registry: &'a RateControllerRegistry,
}

pub type RateControllerBuilder = Box<
    dyn for<'a> Fn(RateControlContext<'a>) -> Result<Box<dyn RateController>, RateControlError>
        + Send
        + Sync,
>;

pub struct RateControllerRegistry {
    builders: HashMap<String, RateControllerBuilder>,
}

impl Default for RateControllerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(FIXED_RATE, |ctx| boxed(FixedRateController::new(ctx)));
        registry.register(LINEAR_RATE, |ctx| boxed(LinearRateController::new(ctx)));
        registry.register(FIXED_LOAD, |ctx| boxed(FixedLoadController::new(ctx)));
        registry.register(REPLAY_RATE, |ctx| boxed(ReplayRateController::new(ctx)));
        registry.register(RECORD_RATE, |ctx| boxed(RecordRateController::new(ctx)));
        registry
    }
}

impl RateControllerRegistry {
    /// A registry without any controller.
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Register a controller under `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: &str, builder: F)
    where
        F: for<'a> Fn(RateControlContext<'a>) -> Result<Box<dyn RateController>, RateControlError>
            + Send
            + Sync
            + 'static,
    {
        if self
            .builders
            .insert(kind.to_string(), Box::new(builder))
            .is_some()
        {
            debug!("Replaced rate controller \"{kind}\"");
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.builders.contains_key(kind)
    }

    pub fn create(
        &self,
        round: RoundConfig,
        worker_index: usize,
        stats: TxStatistics,
        config: &Config,
    ) -> Result<Box<dyn RateController>, RateControlError> {
        self.build(RateControlContext {
            round,
            worker_index,
            stats,
            config,
            registry: self,
        })
    }

    pub fn build(
        &self,
        ctx: RateControlContext<'_>,
    ) -> Result<Box<dyn RateController>, RateControlError> {
        let kind = ctx.round.rate_control.kind.as_str();
        let builder = self
            .builders
            .get(kind)
            .ok_or_else(|| RateControlError::UnknownType(kind.to_string()))?;

        trace!(
            "Building {kind} controller for worker {} round {}",
            ctx.worker_index,
            ctx.round.round_index
        );
        builder(ctx)
    }
}

impl std::fmt::Debug for RateControllerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.builders.keys().collect();
        kinds.sort();
        f.debug_struct("RateControllerRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

fn boxed<C: RateController + 'static>(
    controller: Result<C, RateControlError>,
) -> Result<Box<dyn RateController>, RateControlError> {
    controller.map(|c| Box::new(c) as Box<dyn RateController>)
}

/// Deserialize controller options. Missing options are treated as an empty object.
pub(crate) fn parse_opts<T: DeserializeOwned>(
    kind: &str,
    opts: &Value,
) -> Result<T, RateControlError> {
    let opts = match opts {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(opts).map_err(|source| RateControlError::InvalidOptions {
        kind: kind.to_string(),
        source,
    })
}

/// A rate is usable when it is positive and one send interval (`1 / rate` seconds) fits a
/// [`Duration`].
pub(crate) fn positive_rate(kind: &str, name: &str, value: f64) -> Result<f64, RateControlError> {
    let invalid = |reason: String| RateControlError::InvalidValue {
        kind: kind.to_string(),
        reason,
    };
    if !(value.is_finite() && value > 0.) {
        return Err(invalid(format!("{name} must be a positive number, found {value}")));
    }
    if Duration::try_from_secs_f64(value.recip()).is_err() {
        return Err(invalid(format!("{name} of {value} is too small to pace with")));
    }
    Ok(value)
}

/// Instant `secs` after `start`, or `None` when it cannot be represented.
pub(crate) fn offset_instant(start: Instant, secs: f64) -> Option<Instant> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .and_then(|d| start.checked_add(d))
}
