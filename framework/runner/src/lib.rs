mod arrival;
mod cli;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod policy;
mod progress;
mod ramping;
mod report;
mod run;
mod scenario;
mod scheduler;
mod shutdown;
mod types;
mod weighted;
mod worker;

pub mod prelude {
    pub use crate::cli::PassLoadCli;
    pub use crate::context::{RunnerContext, UserValuesConstraint, WorkerContext};
    pub use crate::definition::{DroppedIterations, HookResult, RunDefinitionBuilder};
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::policy::{ArrivalPolicy, ArrivalRate, RampMode, RampingVus, Stage};
    pub use crate::report::{RunReport, ScenarioReport, THRESHOLD_FAILURE_EXIT_CODE};
    pub use crate::run::run;
    pub use crate::scenario::{ScenarioPhase, ScenarioSpec};
    pub use crate::types::PassLoadResult;
    pub use crate::weighted::{WeightError, WeightedChoice};

    pub use pass_load_core::prelude::ShutdownSignalError;
    pub use pass_load_instruments::prelude::*;
    pub use pass_load_instruments::ThresholdParseError;
}
