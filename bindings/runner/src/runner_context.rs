use std::sync::Arc;

use anyhow::Context;
use pass_load_runner::prelude::{UserValuesConstraint, WorkerContext};
use pass_services_client::prelude::PassServicesClient;

use crate::fixtures::Fixtures;
use crate::weights::WorkloadChoices;

/// Values shared by every worker of a pass services run, filled in by the setup hook.
///
/// See [crate::prelude::configure_runner_context].
#[derive(Default, Debug)]
pub struct PassRunnerContext {
    pub client: Option<Arc<PassServicesClient>>,
    pub fixtures: Option<Arc<Fixtures>>,
    pub choices: Option<Arc<WorkloadChoices>>,
}

impl UserValuesConstraint for PassRunnerContext {}

const NOT_CONFIGURED: &str =
    "Runner context is not configured, call configure_runner_context in the setup hook";

impl PassRunnerContext {
    pub fn client(&self) -> anyhow::Result<Arc<PassServicesClient>> {
        self.client.clone().context(NOT_CONFIGURED)
    }

    pub fn fixtures(&self) -> anyhow::Result<Arc<Fixtures>> {
        self.fixtures.clone().context(NOT_CONFIGURED)
    }

    pub fn choices(&self) -> anyhow::Result<Arc<WorkloadChoices>> {
        self.choices.clone().context(NOT_CONFIGURED)
    }
}

/// The worker context used by every pass services workload. Workers keep no state of their own
/// between iterations.
pub type PassWorkerContext = WorkerContext<PassRunnerContext, ()>;
