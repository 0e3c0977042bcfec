use std::sync::Arc;

use anyhow::Context;
use pass_load_runner::prelude::{PassLoadResult, RunnerContext};
use pass_services_client::prelude::PassServicesClient;

use crate::config::LoadConfig;
use crate::fixtures::Fixtures;
use crate::runner_context::PassRunnerContext;
use crate::weights::{WorkloadChoices, WorkloadWeights};

/// Reads the service locations from the environment and fills in the [PassRunnerContext].
///
/// Call this from the setup hook of a scenario:
/// ```rust
/// use pass_services_runner::prelude::*;
///
/// fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
///     configure_runner_context(ctx, WorkloadWeights::main())?;
///     Ok(())
/// }
/// ```
pub fn configure_runner_context(
    ctx: &mut RunnerContext<PassRunnerContext>,
    weights: WorkloadWeights,
) -> PassLoadResult<()> {
    let config = LoadConfig::from_env().context("Invalid load test configuration")?;
    configure_runner_context_with(ctx, &config, weights)
}

/// Same as [configure_runner_context] but with an explicit config instead of the environment.
///
/// The workloads use the sample [Fixtures].
pub fn configure_runner_context_with(
    ctx: &mut RunnerContext<PassRunnerContext>,
    config: &LoadConfig,
    weights: WorkloadWeights,
) -> PassLoadResult<()> {
    let targets = config.targets()?;
    log::info!(
        "Targeting pass-api at {}, pass-image-api at {} and pass-summary-api at {}",
        targets.pass_api(),
        targets.image_api(),
        targets.summary_api()
    );

    let client = PassServicesClient::new(targets, ctx.reporter())
        .context("Failed to build the HTTP client")?;
    let choices = WorkloadChoices::new(&weights).context("Invalid workload weights")?;
    let fixtures = Fixtures::sample().context("Invalid sample fixtures")?;

    let values = ctx.get_mut();
    values.client = Some(Arc::new(client));
    values.fixtures = Some(Arc::new(fixtures));
    values.choices = Some(Arc::new(choices));

    Ok(())
}
