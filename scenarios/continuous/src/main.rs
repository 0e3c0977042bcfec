use std::process::ExitCode;

use anyhow::Context;
use pass_services_runner::prelude::*;

fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
    configure_runner_context(ctx, WorkloadWeights::continuous())?;
    Ok(())
}

fn main() -> PassLoadResult<ExitCode> {
    let cli = init();
    let config = LoadConfig::from_env().context("Invalid load test configuration")?;

    let rate = config.continuous_rate();
    log::info!("Continuous traffic at {rate} iterations per second");

    let builder = RunDefinitionBuilder::<PassRunnerContext, ()>::new(env!("CARGO_PKG_NAME"), cli)
        .use_setup(setup)
        .with_scenario(
            ScenarioSpec::continuous(
                "continuous",
                continuous_workflow,
                ArrivalRate::continuous(f64::from(rate)),
            )
            .with_tag("mode", "continuous"),
        )
        .with_default_threshold(ThresholdRule::parse("http_req_duration", "p(95)<500")?);

    let report = run(builder)?;

    Ok(report.exit_code())
}
