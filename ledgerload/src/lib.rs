#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod command;
pub mod connector;
pub mod controllers;
pub mod engine;
pub mod orchestrator;
pub mod workload;

mod error;

pub use error::{
    CommandError, ConnectorError, EngineError, OrchestratorError, RateControlError, WorkloadError,
};

pub use engine::Engine;

pub mod prelude {
    pub use crate::command::{CommandExecutor, ShellExecutor};
    pub use crate::connector::{
        Connector, ConnectorFactory, Dispatched, Dispatcher, Request, Requests, TxEvent,
        TxEventListener, WorkerArgs,
    };
    pub use crate::controllers::{RateControlContext, RateController, RateControllerRegistry};
    pub use crate::engine::{Engine, RESULT_NOT_RUN, RESULT_SUCCESS};
    pub use crate::orchestrator::{LocalOrchestrator, OrchestratorContext, RoundOrchestrator};
    pub use crate::workload::{WorkloadContext, WorkloadFactory, WorkloadModule};
    pub use crate::{ConnectorError, EngineError, WorkloadError};

    pub use ledgerload_core::{
        BenchmarkConfig, Config, FlowOptions, NetworkConfig, RoundStatistics, TxState,
        TxStatistics, TxStatus,
    };
}
