use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use pass_services_runner::prelude::*;

/// Length of each of the staggered phases unless `--duration` is given.
const PHASE: Duration = Duration::from_secs(30);

const PRE_ALLOCATED_VUS: usize = 5;

fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
    configure_runner_context(ctx, WorkloadWeights::main())?;
    Ok(())
}

fn pass_api(ctx: &mut PassWorkerContext) -> HookResult {
    passes_workload(ctx)?;
    ctx.think(Duration::from_secs(1))
}

fn pass_image_api(ctx: &mut PassWorkerContext) -> HookResult {
    image_workload(ctx)?;
    ctx.think(Duration::from_secs(1))
}

fn pass_summary_api(ctx: &mut PassWorkerContext) -> HookResult {
    summary_workload(ctx)?;
    ctx.think(Duration::from_secs(1))
}

fn combined(ctx: &mut PassWorkerContext) -> HookResult {
    combined_workflow(ctx)?;
    ctx.think(Duration::from_secs(2))
}

fn main() -> PassLoadResult<ExitCode> {
    let cli = init();
    let config = LoadConfig::from_env().context("Invalid load test configuration")?;

    let builder =
        RunDefinitionBuilder::<PassRunnerContext, ()>::new(env!("CARGO_PKG_NAME"), cli);

    // Each scenario starts once the previous one has finished.
    let phase = builder.duration_override().unwrap_or(PHASE);
    log::info!("Scenarios start {}s apart", phase.as_secs());

    let builder = builder
        .use_setup(setup)
        .with_scenario(
            ScenarioSpec::constant_arrival_rate(
                "pass_api",
                pass_api,
                config.pass_api.arrival_rate(PRE_ALLOCATED_VUS),
                PHASE,
            )
            .with_tag("service", "pass-api"),
        )
        .with_scenario(
            ScenarioSpec::constant_arrival_rate(
                "pass_image_api",
                pass_image_api,
                config.image_api.arrival_rate(PRE_ALLOCATED_VUS),
                PHASE,
            )
            .with_start_offset(phase)
            .with_tag("service", "pass-image-api"),
        )
        .with_scenario(
            ScenarioSpec::constant_arrival_rate(
                "pass_summary_api",
                pass_summary_api,
                config.summary_api.arrival_rate(PRE_ALLOCATED_VUS),
                PHASE,
            )
            .with_start_offset(phase * 2)
            .with_tag("service", "pass-summary-api"),
        )
        .with_scenario(
            ScenarioSpec::ramping_vus(
                "combined_workflow",
                combined,
                RampingVus::new(1)
                    .with_stage(Duration::from_secs(15), 5)
                    .with_stage(Duration::from_secs(30), 5)
                    .with_stage(Duration::from_secs(15), 0),
            )
            .with_start_offset(phase * 3)
            .with_tag("service", "combined"),
        )
        .with_default_threshold(ThresholdRule::parse("http_req_duration", "p(95)<500")?);

    let report = run(builder)?;

    Ok(report.exit_code())
}
