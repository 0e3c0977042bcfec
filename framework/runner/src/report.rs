use std::process::ExitCode;
use std::time::Duration;

use itertools::Itertools;
use pass_load_instruments::prelude::{RunMetrics, ThresholdResult};
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::worker::StatsSnapshot;

/// Exit code used when the run completed but at least one threshold failed.
pub const THRESHOLD_FAILURE_EXIT_CODE: u8 = 99;

/// What happened to a single scenario during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub name: String,
    /// When the scenario became active, relative to the run start. `None` if the run was stopped
    /// while the scenario was still pending.
    pub started_at: Option<Duration>,
    /// When the scenario completed, relative to the run start.
    pub finished_at: Duration,
    pub iterations_started: u64,
    pub iterations_completed: u64,
    pub iterations_failed: u64,
    /// Iterations cancelled by a shutdown or interrupt, which are not failures.
    pub iterations_cancelled: u64,
    pub dropped_iterations: u64,
    pub interrupted_iterations: u64,
    pub peak_in_flight: usize,
    pub peak_workers: usize,
}

impl ScenarioReport {
    pub(crate) fn new(
        name: &str,
        started_at: Option<Duration>,
        finished_at: Duration,
        stats: StatsSnapshot,
    ) -> Self {
        Self {
            name: name.to_string(),
            started_at,
            finished_at,
            iterations_started: stats.started,
            iterations_completed: stats.completed,
            iterations_failed: stats.failed,
            iterations_cancelled: stats.cancelled,
            dropped_iterations: stats.dropped,
            interrupted_iterations: stats.interrupted,
            peak_in_flight: stats.peak_in_flight,
            peak_workers: stats.peak_workers,
        }
    }
}

/// The outcome of a run, returned by [crate::run::run].
#[derive(Debug)]
pub struct RunReport {
    run_id: String,
    name: String,
    scenarios: Vec<ScenarioReport>,
    thresholds: Vec<ThresholdResult>,
    metrics: RunMetrics,
}

impl RunReport {
    pub(crate) fn new(
        run_id: String,
        name: String,
        scenarios: Vec<ScenarioReport>,
        thresholds: Vec<ThresholdResult>,
        metrics: RunMetrics,
    ) -> Self {
        Self {
            run_id,
            name,
            scenarios,
            thresholds,
            metrics,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scenarios(&self) -> &[ScenarioReport] {
        &self.scenarios
    }

    pub fn scenario(&self, name: &str) -> Option<&ScenarioReport> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    pub fn thresholds(&self) -> &[ThresholdResult] {
        &self.thresholds
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// True if every threshold passed. A run without thresholds passes.
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.passed() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(THRESHOLD_FAILURE_EXIT_CODE)
        }
    }

    pub(crate) fn print(&self) {
        let scenario_rows = self
            .scenarios
            .iter()
            .sorted_by(|a, b| a.started_at.cmp(&b.started_at).then(a.name.cmp(&b.name)))
            .map(ScenarioRow::from)
            .collect::<Vec<_>>();

        println!("\nSummary of scenarios for run {}", self.run_id);
        let mut table = Table::new(&scenario_rows);
        table.with(Style::modern());
        println!("{table}");

        if self.thresholds.is_empty() {
            return;
        }

        let threshold_rows = self
            .thresholds
            .iter()
            .map(|t| ThresholdRow {
                threshold: t.rule.to_string(),
                observed: t
                    .observed
                    .map_or_else(|| "no samples".to_string(), |v| format!("{v:.2}")),
                result: if t.passed { "pass" } else { "fail" }.to_string(),
            })
            .collect::<Vec<_>>();

        println!("\nThresholds");
        let mut table = Table::new(&threshold_rows);
        table.with(Style::modern());
        println!("{table}");
    }
}

#[derive(Tabled)]
struct ScenarioRow {
    scenario: String,
    #[tabled(display = "seconds")]
    started_at: Option<Duration>,
    started: u64,
    completed: u64,
    failed: u64,
    dropped: u64,
    interrupted: u64,
    peak_in_flight: usize,
    peak_workers: usize,
}

impl From<&ScenarioReport> for ScenarioRow {
    fn from(report: &ScenarioReport) -> Self {
        Self {
            scenario: report.name.clone(),
            started_at: report.started_at,
            started: report.iterations_started,
            completed: report.iterations_completed,
            failed: report.iterations_failed,
            dropped: report.dropped_iterations,
            interrupted: report.interrupted_iterations,
            peak_in_flight: report.peak_in_flight,
            peak_workers: report.peak_workers,
        }
    }
}

#[derive(Tabled)]
struct ThresholdRow {
    threshold: String,
    observed: String,
    result: String,
}

fn seconds(d: &Option<Duration>) -> String {
    d.map_or_else(|| "-".to_string(), |d| format!("{:.1}s", d.as_secs_f64()))
}
