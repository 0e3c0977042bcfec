use std::collections::HashSet;
use std::time::Duration;

use pass_load_instruments::prelude::{ReportConfig, ThresholdRule};

use crate::cli::PassLoadCli;
use crate::context::{RunnerContext, UserValuesConstraint, WorkerContext};
use crate::scenario::ScenarioSpec;

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type WorkerHookMut<RV, V> = fn(&mut WorkerContext<RV, V>) -> HookResult;

/// What to do with iterations that are due while every worker is busy and the pool is at its
/// maximum size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DroppedIterations {
    /// Count them in the `dropped_iterations` metric and warn about them.
    #[default]
    Record,
    /// Only log them at debug level.
    Ignore,
}

/// The builder for a run definition.
///
/// This must be used at the start of a test to define the scenarios that you want to run.
pub struct RunDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the run, which is used in logs and the summary.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// Command line options, normally from [crate::init::init].
    cli: PassLoadCli,
    /// Global setup hook for this run. It will be run once, before any scenario is started.
    setup_fn: Option<GlobalHookMut<RV>>,
    scenarios: Vec<ScenarioSpec<RV, V>>,
    /// Thresholds to evaluate when no thresholds are given on the command line.
    default_thresholds: Vec<ThresholdRule>,
    report_config: ReportConfig,
    dropped_iterations: DroppedIterations,
}

pub(crate) struct RunDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) run_id: String,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) scenarios: Vec<ScenarioSpec<RV, V>>,
    pub(crate) thresholds: Vec<ThresholdRule>,
    pub(crate) report_config: ReportConfig,
    pub(crate) dropped_iterations: DroppedIterations,
    pub(crate) soak: bool,
    pub(crate) seed: Option<u64>,
    pub(crate) no_progress: bool,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> RunDefinition<RV, V> {
    /// How long the run takes if nothing stops it early, or `None` for a soak run.
    pub(crate) fn planned_runtime(&self) -> Option<Duration> {
        if self.soak {
            return None;
        }

        self.scenarios
            .iter()
            .map(|s| s.start_offset() + s.duration())
            .max()
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> RunDefinitionBuilder<RV, V> {
    /// Initialise a new run definition from the run name and command line arguments.
    pub fn new(name: &str, cli: PassLoadCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            setup_fn: None,
            scenarios: Vec::new(),
            default_thresholds: Vec::new(),
            report_config: ReportConfig::default().enable_summary(),
            dropped_iterations: DroppedIterations::default(),
        }
    }

    /// Set the global setup hook [RunDefinitionBuilder::setup_fn] for this run.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Add a scenario to the run. Every scenario runs concurrently with the others once its
    /// start offset has elapsed.
    pub fn with_scenario(mut self, scenario: ScenarioSpec<RV, V>) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_default_threshold(mut self, threshold: ThresholdRule) -> Self {
        self.default_thresholds.push(threshold);
        self
    }

    pub fn with_report_config(mut self, report_config: ReportConfig) -> Self {
        self.report_config = report_config;
        self
    }

    /// Choose how dropped iterations are handled. The `--ignore-dropped-iterations` flag takes
    /// precedence over this setting.
    pub fn with_dropped_iterations(mut self, dropped_iterations: DroppedIterations) -> Self {
        self.dropped_iterations = dropped_iterations;
        self
    }

    /// The scenario duration requested on the command line, if any.
    ///
    /// Profiles that stagger their scenarios should compute start offsets from this so that the
    /// scenarios still follow each other. The override itself is applied to every scenario when
    /// the run starts.
    pub fn duration_override(&self) -> Option<Duration> {
        self.cli.duration.map(Duration::from_secs)
    }

    pub fn is_soak(&self) -> bool {
        self.cli.soak
    }

    pub(crate) fn build(self) -> anyhow::Result<RunDefinition<RV, V>> {
        if self.scenarios.is_empty() {
            anyhow::bail!("Run [{}] has no scenarios", self.name);
        }

        let mut names = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !names.insert(scenario.name().to_string()) {
                anyhow::bail!("Scenario [{}] is defined more than once", scenario.name());
            }
        }

        let duration_override = self.duration_override();
        let scenarios = self
            .scenarios
            .into_iter()
            .map(|s| match duration_override {
                Some(duration) => s.with_duration(duration),
                None => s,
            })
            .collect();

        let thresholds = if self.cli.thresholds.is_empty() {
            self.default_thresholds
        } else {
            self.cli.thresholds
        };

        let dropped_iterations = if self.cli.ignore_dropped_iterations {
            DroppedIterations::Ignore
        } else {
            self.dropped_iterations
        };

        Ok(RunDefinition {
            name: self.name,
            run_id: self.cli.run_id.unwrap_or_else(|| nanoid::nanoid!()),
            setup_fn: self.setup_fn,
            scenarios,
            thresholds,
            report_config: self.report_config,
            dropped_iterations,
            soak: self.cli.soak,
            seed: self.cli.seed,
            no_progress: self.cli.no_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ArrivalRate, RampingVus};
    use clap::Parser;

    fn behaviour(_ctx: &mut WorkerContext<(), ()>) -> HookResult {
        Ok(())
    }

    fn cli(args: &[&str]) -> PassLoadCli {
        PassLoadCli::try_parse_from(std::iter::once("test").chain(args.iter().copied())).unwrap()
    }

    fn constant(name: &str, offset: u64) -> ScenarioSpec<(), ()> {
        ScenarioSpec::constant_arrival_rate(
            name,
            behaviour,
            ArrivalRate::per_second(1.0),
            Duration::from_secs(30),
        )
        .with_start_offset(Duration::from_secs(offset))
    }

    #[test]
    fn cli_thresholds_replace_defaults() {
        let definition = RunDefinitionBuilder::<(), ()>::new(
            "test",
            cli(&["--threshold", "checks:rate>0.9"]),
        )
        .with_scenario(constant("a", 0))
        .with_default_threshold("http_req_duration:p(95)<500".parse().unwrap())
        .build()
        .unwrap();

        assert_eq!(definition.thresholds.len(), 1);
        assert_eq!(definition.thresholds[0].to_string(), "checks:rate>0.9");

        let definition = RunDefinitionBuilder::<(), ()>::new("test", cli(&[]))
            .with_scenario(constant("a", 0))
            .with_default_threshold("http_req_duration:p(95)<500".parse().unwrap())
            .build()
            .unwrap();
        assert_eq!(
            definition.thresholds[0].to_string(),
            "http_req_duration:p(95)<500"
        );
    }

    #[test]
    fn duplicate_and_missing_scenarios_are_rejected() {
        assert!(RunDefinitionBuilder::<(), ()>::new("test", cli(&[]))
            .build()
            .is_err());

        assert!(RunDefinitionBuilder::<(), ()>::new("test", cli(&[]))
            .with_scenario(constant("a", 0))
            .with_scenario(constant("a", 30))
            .build()
            .is_err());
    }

    #[test]
    fn planned_runtime_covers_the_latest_scenario() {
        let definition = RunDefinitionBuilder::<(), ()>::new("test", cli(&[]))
            .with_scenario(constant("a", 0))
            .with_scenario(constant("b", 60))
            .with_scenario(ScenarioSpec::ramping_vus(
                "c",
                behaviour,
                RampingVus::new(1).with_stage(Duration::from_secs(10), 2),
            ))
            .build()
            .unwrap();
        assert_eq!(definition.planned_runtime(), Some(Duration::from_secs(90)));

        let definition = RunDefinitionBuilder::<(), ()>::new("test", cli(&["--soak"]))
            .with_scenario(constant("a", 0))
            .build()
            .unwrap();
        assert_eq!(definition.planned_runtime(), None);
    }

    #[test]
    fn duration_override_applies_to_every_scenario() {
        let definition =
            RunDefinitionBuilder::<(), ()>::new("test", cli(&["--duration", "5", "--run-id", "r1"]))
                .with_scenario(constant("a", 0))
                .with_scenario(ScenarioSpec::ramping_vus(
                    "b",
                    behaviour,
                    RampingVus::new(1).with_stage(Duration::from_secs(60), 2),
                ))
                .build()
                .unwrap();

        assert!(definition
            .scenarios
            .iter()
            .all(|s| s.duration() == Duration::from_secs(5)));
        assert_eq!(definition.run_id, "r1");
    }

    #[test]
    fn flag_selects_ignored_dropped_iterations() {
        let definition =
            RunDefinitionBuilder::<(), ()>::new("test", cli(&["--ignore-dropped-iterations"]))
                .with_scenario(constant("a", 0))
                .build()
                .unwrap();
        assert_eq!(definition.dropped_iterations, DroppedIterations::Ignore);
    }
}
