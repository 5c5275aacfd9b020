/// Configuration key holding the benchmark workspace directory.
pub const WORKSPACE_KEY: &str = "workspace";

/// Workspace used when the configuration does not name one.
pub const DEFAULT_WORKSPACE: &str = ".";

/// Placeholder replaced by the worker index in trace path templates.
pub const WORKER_INDEX_PLACEHOLDER: &str = "<C>";

/// Placeholder replaced by the round index in trace path templates.
pub const ROUND_INDEX_PLACEHOLDER: &str = "<R>";

/// Prefix of the configuration keys which skip a phase, e.g. `flow-skip-install`.
pub const FLOW_SKIP_PREFIX: &str = "flow-skip-";

/// Prefix of the configuration keys which restrict the run to the given phases.
pub const FLOW_ONLY_PREFIX: &str = "flow-only-";

/// TPS used by `fixed-rate` when the round does not configure one.
pub const DEFAULT_FIXED_TPS: f64 = 10.;

/// Backlog used by `fixed-load` when the round does not configure one.
pub const DEFAULT_TRANSACTION_LOAD: u64 = 10;
