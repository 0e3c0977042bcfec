use std::sync::Arc;
use std::time::{Duration, Instant};

use pass_load_core::prelude::DelegatedShutdownListener;
use pass_load_instruments::prelude::CounterRecord;

use crate::arrival;
use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::DroppedIterations;
use crate::policy::ArrivalPolicy;
use crate::ramping;
use crate::report::ScenarioReport;
use crate::scenario::{ScenarioClock, ScenarioPhase, ScenarioSpec};
use crate::worker::{ScenarioStats, WorkerPool, WorkerSetup};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Block the current thread until `deadline`, waking regularly to check for shutdown.
///
/// Returns false if the listener was signalled before the deadline.
pub(crate) fn sleep_until(deadline: Instant, listener: &DelegatedShutdownListener) -> bool {
    loop {
        if listener.should_shutdown() {
            return false;
        }

        let now = Instant::now();
        if now >= deadline {
            return true;
        }

        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Drives one scenario through its phases on the current thread.
pub(crate) struct ScenarioRunner<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) scenario: Arc<ScenarioSpec<RV, V>>,
    pub(crate) scenario_index: usize,
    pub(crate) runner_context: Arc<RunnerContext<RV>>,
    pub(crate) run_started: Instant,
    pub(crate) soak: bool,
    pub(crate) seed: Option<u64>,
    pub(crate) dropped_iterations: DroppedIterations,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioRunner<RV, V> {
    pub(crate) fn run(self) -> ScenarioReport {
        let name = self.scenario.name().to_string();
        let clock = ScenarioClock::new(
            self.scenario.start_offset(),
            (!self.soak).then(|| self.scenario.duration()),
        );

        let stop_handle = self.runner_context.shutdown_handle().new_child();
        let interrupt_handle = self.runner_context.shutdown_handle().new_child();
        let stop_listener = stop_handle.new_listener();
        let stats = Arc::new(ScenarioStats::default());

        if clock.phase_at(self.run_started.elapsed()) == ScenarioPhase::Pending {
            log::info!(
                "Scenario [{name}] is {}, starting in {:?}",
                ScenarioPhase::Pending,
                clock.start_offset()
            );
        }
        if !sleep_until(self.run_started + clock.start_offset(), &stop_listener) {
            log::info!("Scenario [{name}] stopped before it started");
            return self.complete(&name, None, &stats);
        }

        let started = Instant::now();
        let mut pool = WorkerPool::new(WorkerSetup {
            scenario: self.scenario.clone(),
            scenario_index: self.scenario_index,
            runner_context: self.runner_context.clone(),
            stop_handle,
            interrupt_handle,
            seed: self.seed,
            stats: stats.clone(),
        });

        let active_until = clock.ends_at().map(|end| self.run_started + end);
        match clock.phase_at(started - self.run_started) {
            ScenarioPhase::Active => {
                log::info!("Scenario [{name}] is {}", ScenarioPhase::Active);
                self.drive(&mut pool, started, active_until, &stop_listener, &name);
            }
            phase => {
                log::debug!("Scenario [{name}] is {phase} before starting, nothing to run");
            }
        }

        log::info!("Scenario [{name}] is {}", ScenarioPhase::Draining);
        pool.drain(self.scenario.graceful_stop());

        self.complete(&name, Some(started), &stats)
    }

    fn drive(
        &self,
        pool: &mut WorkerPool<RV, V>,
        started: Instant,
        active_until: Option<Instant>,
        stop_listener: &DelegatedShutdownListener,
        name: &str,
    ) {
        match self.scenario.policy() {
            ArrivalPolicy::ConstantArrivalRate(rate) | ArrivalPolicy::Continuous(rate) => {
                arrival::dispatch(
                    pool,
                    rate,
                    started,
                    active_until,
                    stop_listener,
                    self.dropped_iterations,
                    name,
                )
            }
            ArrivalPolicy::RampingVus(ramp) => {
                ramping::control(pool, ramp, started, active_until, stop_listener, name)
            }
        }
    }

    fn complete(&self, name: &str, started: Option<Instant>, stats: &ScenarioStats) -> ScenarioReport {
        let snapshot = stats.snapshot();
        let tags = self.scenario.metric_tags();
        let reporter = self.runner_context.reporter();

        reporter.add_counter(&CounterRecord::new(
            tags.clone(),
            "iterations",
            snapshot.started,
        ));
        match self.dropped_iterations {
            DroppedIterations::Record => {
                reporter.add_counter(&CounterRecord::new(
                    tags,
                    "dropped_iterations",
                    snapshot.dropped,
                ));
                if snapshot.dropped > 0 {
                    log::warn!(
                        "Scenario [{name}] dropped {} iterations",
                        snapshot.dropped
                    );
                }
            }
            DroppedIterations::Ignore => {
                log::debug!(
                    "Scenario [{name}] dropped {} iterations",
                    snapshot.dropped
                );
            }
        }

        log::info!(
            "Scenario [{name}] is {}, {} iterations completed, {} failed",
            ScenarioPhase::Complete,
            snapshot.completed,
            snapshot.failed
        );

        ScenarioReport::new(
            name,
            started.map(|s| s - self.run_started),
            self.run_started.elapsed(),
            snapshot,
        )
    }
}
