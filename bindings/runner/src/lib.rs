mod common;
mod config;
mod fixtures;
mod runner_context;
mod weights;
mod workloads;

pub mod prelude {
    /// Common operations for pass services scenarios.
    ///
    /// This is a good place to start if you are getting started writing scenarios.
    pub use crate::common::*;

    pub use crate::config::{ConfigError, LoadConfig, RateConfig};
    pub use crate::fixtures::Fixtures;
    pub use crate::runner_context::{PassRunnerContext, PassWorkerContext};
    pub use crate::weights::{
        ImageBranch, PassesBranch, SlowSummary, SummaryBranch, WorkloadChoices, WorkloadKind,
        WorkloadWeights,
    };
    pub use crate::workloads::*;

    /// Re-export of the `pass_load_runner` prelude.
    ///
    /// This is for convenience so that you can depend on a single crate for the runner in your scenarios.
    pub use pass_load_runner::prelude::*;

    /// Re-export of the instrumented client for convenience.
    pub use pass_services_client::prelude::*;
}
