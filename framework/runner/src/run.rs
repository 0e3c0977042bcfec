use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::report::RunReport;
use crate::scheduler::ScenarioRunner;
use crate::{
    context::{RunnerContext, UserValuesConstraint},
    definition::RunDefinitionBuilder,
    executor::Executor,
    shutdown::start_shutdown_listener,
};

/// Run every scenario of the definition and evaluate its thresholds.
///
/// Errors are only returned if the run could not be carried out, for example because the setup
/// hook failed. Failing checks and thresholds are reported through the returned [RunReport].
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: RunDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunReport> {
    let definition = definition.build()?;

    log::info!(
        "Running {} with {} scenarios, run id {}",
        definition.name,
        definition.scenarios.len(),
        definition.run_id
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let print_report = definition.report_config.is_summary_enabled();
    let reporter = Arc::new(definition.report_config.clone().init());
    let mut runner_context = RunnerContext::new(
        executor,
        reporter,
        shutdown_handle.clone(),
        definition.run_id.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    if let Some(planned_runtime) = definition.planned_runtime() {
        if !definition.no_progress {
            start_progress(planned_runtime, shutdown_handle.new_listener())
                .context("Failed to start progress bar")?;
        }
    }

    // Ready to start spawning workers so start the resource monitor to report high usage which
    // might lead to a misleading outcome.
    start_monitor(shutdown_handle.new_listener()).context("Failed to start resource monitor")?;

    let runner_context = Arc::new(runner_context);
    let run_started = Instant::now();

    let mut handles = Vec::new();
    for (scenario_index, scenario) in definition.scenarios.into_iter().enumerate() {
        let scenario_name = scenario.name().to_string();
        let scenario_runner = ScenarioRunner {
            scenario: Arc::new(scenario),
            scenario_index,
            runner_context: runner_context.clone(),
            run_started,
            soak: definition.soak,
            seed: definition.seed,
            dropped_iterations: definition.dropped_iterations,
        };

        let handle = std::thread::Builder::new()
            .name(format!("scenario-{scenario_name}"))
            .spawn(move || scenario_runner.run());

        match handle {
            Ok(handle) => handles.push((scenario_name, handle)),
            Err(e) => {
                // Stop the scenarios that were already started before giving up.
                shutdown_handle.shutdown();
                for (_, handle) in handles {
                    let _ = handle.join();
                }
                return Err(anyhow::anyhow!(
                    "Failed to spawn thread for scenario [{scenario_name}]: {e}"
                ));
            }
        }
    }

    let mut scenario_reports = Vec::with_capacity(handles.len());
    for (scenario_name, handle) in handles {
        let report = handle.join().map_err(|e| {
            anyhow::anyhow!("Error joining thread for scenario [{scenario_name}]: {e:?}")
        })?;
        scenario_reports.push(report);
    }

    // Every scenario is complete, stop the progress bar and the monitor.
    shutdown_handle.shutdown();

    let metrics = runner_context.reporter().finalize();
    let thresholds = definition
        .thresholds
        .iter()
        .map(|rule| rule.evaluate(&metrics))
        .collect::<Vec<_>>();

    for threshold in thresholds.iter().filter(|t| !t.passed) {
        log::error!(
            "Threshold [{}] failed, observed {:?}",
            threshold.rule,
            threshold.observed
        );
    }

    let report = RunReport::new(
        definition.run_id,
        definition.name,
        scenario_reports,
        thresholds,
        metrics,
    );

    if print_report {
        report.print();
    }

    log::info!(
        "Run {} {}",
        report.run_id(),
        if report.passed() { "passed" } else { "failed" }
    );

    Ok(report)
}
