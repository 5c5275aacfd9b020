use crate::{ConfigError, DEFAULT_WORKSPACE, FLOW_ONLY_PREFIX, FLOW_SKIP_PREFIX, WORKSPACE_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DurationSeconds};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Key-value runtime configuration.
///
/// Threaded explicitly through the engine and the rate controllers. The only key the engine itself
/// interprets is [`WORKSPACE_KEY`], plus the `flow-*` keys read by [`FlowOptions::from_config`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: HashMap<String, Value>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Reads a flag, accepting both JSON booleans and the strings `"true"`/`"false"`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn workspace(&self) -> PathBuf {
        PathBuf::from(self.get_str(WORKSPACE_KEY).unwrap_or(DEFAULT_WORKSPACE))
    }

    /// Resolve a path against the workspace. Absolute paths are returned unchanged.
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace().join(path)
        }
    }
}

/// Which phases of a run are enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowOptions {
    pub start: bool,
    pub init: bool,
    pub install: bool,
    pub test: bool,
    pub end: bool,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            start: true,
            init: true,
            install: true,
            test: true,
            end: true,
        }
    }
}

impl FlowOptions {
    pub fn none() -> Self {
        Self {
            start: false,
            init: false,
            install: false,
            test: false,
            end: false,
        }
    }

    /// Resolve the flow from `flow-only-<phase>` and `flow-skip-<phase>` keys.
    ///
    /// If any `only` flag is set, exactly those phases run and `skip` flags are ignored.
    pub fn from_config(config: &Config) -> Self {
        let flag = |prefix: &str, phase: &str| {
            config
                .get_bool(&format!("{prefix}{phase}"))
                .unwrap_or(false)
        };
        let only = |phase| flag(FLOW_ONLY_PREFIX, phase);
        let skip = |phase| flag(FLOW_SKIP_PREFIX, phase);

        let phases = ["start", "init", "install", "test", "end"];
        if phases.into_iter().any(|p| only(p)) {
            Self {
                start: only("start"),
                init: only("init"),
                install: only("install"),
                test: only("test"),
                end: only("end"),
            }
        } else {
            Self {
                start: !skip("start"),
                init: !skip("init"),
                install: !skip("install"),
                test: !skip("test"),
                end: !skip("end"),
            }
        }
    }
}

/// Network descriptor: which system is under test and how to bring it up and down.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub blockchain: String,
    #[serde(default)]
    pub command: CommandConfig,
}

/// Start and end commands. Kept as raw values so a non-string command can be reported as such.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
}

/// Benchmark descriptor.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub test: TestConfig,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TestConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub rounds: Vec<RoundSpec>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub number: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self { number: 1 }
    }
}

/// One round as written in the benchmark descriptor.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSpec {
    pub label: String,
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub tx_duration: Option<Duration>,
    #[serde(default)]
    pub tx_number: Option<u64>,
    pub rate_control: RateControlConfig,
    pub workload: WorkloadConfig,
}

/// Rate controller selector: a registry tag plus controller specific options.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateControlConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub opts: Value,
}

impl RateControlConfig {
    pub fn new(kind: &str, opts: Value) -> Self {
        Self {
            kind: kind.to_string(),
            opts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    pub module: String,
    #[serde(default)]
    pub arguments: Value,
}

/// How long a round lasts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundLength {
    Duration(Duration),
    TxNumber(u64),
}

impl std::fmt::Display for RoundLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundLength::Duration(d) => write!(f, "{}", humantime::format_duration(*d)),
            RoundLength::TxNumber(n) => write!(f, "{n} transactions"),
        }
    }
}

/// Round descriptor handed to rate controllers and workloads. Immutable once built.
#[derive(Clone, Debug)]
pub struct RoundConfig {
    pub label: String,
    pub rate_control: RateControlConfig,
    pub workload: WorkloadConfig,
    pub round_index: usize,
    pub length: RoundLength,
    pub total_workers: usize,
}

impl RoundConfig {
    pub fn duration(&self) -> Option<Duration> {
        match self.length {
            RoundLength::Duration(d) => Some(d),
            RoundLength::TxNumber(_) => None,
        }
    }

    /// Share of a count-based round assigned to one worker. Earlier workers absorb the remainder.
    pub fn worker_tx_number(&self, worker_index: usize) -> Option<u64> {
        match self.length {
            RoundLength::TxNumber(total) => {
                let workers = self.total_workers.max(1) as u64;
                let base = total / workers;
                let extra = u64::from((worker_index as u64) < total % workers);
                Some(base + extra)
            }
            RoundLength::Duration(_) => None,
        }
    }
}

impl BenchmarkConfig {
    pub fn worker_count(&self) -> usize {
        self.test.workers.number
    }

    pub fn rounds(&self) -> Result<Vec<RoundConfig>, ConfigError> {
        let total_workers = self.worker_count();
        if total_workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        self.test
            .rounds
            .iter()
            .enumerate()
            .map(|(round_index, spec)| {
                let length = match (spec.tx_duration, spec.tx_number) {
                    (Some(d), None) => RoundLength::Duration(d),
                    (None, Some(n)) => RoundLength::TxNumber(n),
                    (None, None) => return Err(ConfigError::MissingRoundLength(spec.label.clone())),
                    (Some(_), Some(_)) => {
                        return Err(ConfigError::AmbiguousRoundLength(spec.label.clone()))
                    }
                };

                Ok(RoundConfig {
                    label: spec.label.clone(),
                    rate_control: spec.rate_control.clone(),
                    workload: spec.workload.clone(),
                    round_index,
                    length,
                    total_workers,
                })
            })
            .collect()
    }
}
