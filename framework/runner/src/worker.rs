use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use pass_load_core::prelude::{ShutdownHandle, ShutdownSignalError};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::context::{RunnerContext, UserValuesConstraint, WorkerContext};
use crate::definition::WorkerHookMut;
use crate::scenario::ScenarioSpec;

/// How long interrupted workers get to react before they are abandoned.
const INTERRUPT_GRACE: Duration = Duration::from_secs(1);

/// Counters for a single scenario, updated by its workers and its scheduler.
#[derive(Debug, Default)]
pub(crate) struct ScenarioStats {
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    dropped: AtomicU64,
    interrupted: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    peak_workers: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct StatsSnapshot {
    pub(crate) started: u64,
    pub(crate) completed: u64,
    pub(crate) failed: u64,
    pub(crate) cancelled: u64,
    pub(crate) dropped: u64,
    pub(crate) interrupted: u64,
    pub(crate) peak_in_flight: usize,
    pub(crate) peak_workers: usize,
}

enum IterationOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl ScenarioStats {
    fn begin_iteration(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::AcqRel);
    }

    fn end_iteration(&self, outcome: IterationOutcome) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        let counter = match outcome {
            IterationOutcome::Completed => &self.completed,
            IterationOutcome::Failed => &self.failed,
            IterationOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Count a dropped iteration, returning the total dropped so far.
    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_interrupted(&self, count: u64) {
        self.interrupted.fetch_add(count, Ordering::Relaxed);
    }

    fn record_worker_count(&self, workers: usize) {
        self.peak_workers.fetch_max(workers, Ordering::AcqRel);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started: self.started.load(Ordering::Acquire),
            completed: self.completed.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            cancelled: self.cancelled.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            interrupted: self.interrupted.load(Ordering::Acquire),
            peak_in_flight: self.peak_in_flight.load(Ordering::Acquire),
            peak_workers: self.peak_workers.load(Ordering::Acquire),
        }
    }
}

/// Everything a worker thread needs from its scenario.
pub(crate) struct WorkerSetup<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) scenario: Arc<ScenarioSpec<RV, V>>,
    pub(crate) scenario_index: usize,
    pub(crate) runner_context: Arc<RunnerContext<RV>>,
    /// Signalled when the scenario stops starting iterations.
    pub(crate) stop_handle: ShutdownHandle,
    /// Signalled when in-flight iterations should be cancelled.
    pub(crate) interrupt_handle: ShutdownHandle,
    pub(crate) seed: Option<u64>,
    pub(crate) stats: Arc<ScenarioStats>,
}

enum WorkerKind {
    /// Runs one iteration per message received, until the channel is disconnected.
    Arrival {
        work: Receiver<u64>,
        first: Option<u64>,
    },
    /// Runs iterations back to back until asked to stop.
    Looping,
}

struct WorkerHandle {
    worker_id: String,
    stop_handle: ShutdownHandle,
    /// Never sent on, disconnects when the worker thread exits.
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    fn is_finished(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    fn join(self) {
        if let Err(e) = self.thread.join() {
            log::error!(
                "Error joining thread for worker {}: {}",
                self.worker_id,
                panic_message(&e)
            );
        }
    }
}

/// The worker threads of one scenario.
pub(crate) struct WorkerPool<RV: UserValuesConstraint, V: UserValuesConstraint> {
    setup: WorkerSetup<RV, V>,
    workers: Vec<WorkerHandle>,
    retired: Vec<WorkerHandle>,
    next_worker_index: usize,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> WorkerPool<RV, V> {
    pub(crate) fn new(setup: WorkerSetup<RV, V>) -> Self {
        Self {
            setup,
            workers: Vec::new(),
            retired: Vec::new(),
            next_worker_index: 0,
        }
    }

    /// The number of workers that have not been retired.
    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    pub(crate) fn stats(&self) -> &ScenarioStats {
        &self.setup.stats
    }

    pub(crate) fn spawn_arrival_worker(
        &mut self,
        work: Receiver<u64>,
        first: Option<u64>,
    ) -> anyhow::Result<()> {
        self.spawn(WorkerKind::Arrival { work, first })
    }

    pub(crate) fn spawn_looping_worker(&mut self) -> anyhow::Result<()> {
        self.spawn(WorkerKind::Looping)
    }

    /// Ask the most recently started workers to stop after their current iteration.
    pub(crate) fn retire_newest(&mut self, count: usize) {
        for _ in 0..count {
            let Some(worker) = self.workers.pop() else {
                break;
            };
            log::debug!("Retiring worker {}", worker.worker_id);
            worker.stop_handle.shutdown();
            self.retired.push(worker);
        }
    }

    /// Join retired workers that have exited.
    pub(crate) fn reap(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) =
            self.retired.drain(..).partition(|w| w.is_finished());
        self.retired = running;
        finished.into_iter().for_each(WorkerHandle::join);
    }

    /// Stop every worker and wait up to `graceful_stop` for in-flight iterations to finish.
    ///
    /// Workers still running after that are interrupted, which cancels their in-flight requests.
    /// Returns the number of workers that had to be interrupted.
    pub(crate) fn drain(mut self, graceful_stop: Duration) -> u64 {
        self.setup.stop_handle.shutdown();

        let deadline = Instant::now() + graceful_stop;
        let mut still_running = Vec::new();
        for worker in self.workers.drain(..).chain(self.retired.drain(..)) {
            match worker.done.recv_deadline(deadline) {
                Err(RecvTimeoutError::Timeout) => still_running.push(worker),
                _ => worker.join(),
            }
        }

        let interrupted = still_running.len() as u64;
        if interrupted > 0 {
            log::warn!(
                "Interrupting {} workers of scenario [{}] that did not finish within the graceful stop of {:?}",
                interrupted,
                self.setup.scenario.name(),
                graceful_stop
            );
            self.setup.interrupt_handle.shutdown();

            let deadline = Instant::now() + INTERRUPT_GRACE;
            for worker in still_running {
                match worker.done.recv_deadline(deadline) {
                    Err(RecvTimeoutError::Timeout) => {
                        log::warn!("Abandoning worker {} which did not stop", worker.worker_id);
                    }
                    _ => worker.join(),
                }
            }
        }

        self.setup.stats.record_interrupted(interrupted);
        interrupted
    }

    fn spawn(&mut self, kind: WorkerKind) -> anyhow::Result<()> {
        let worker_index = self.next_worker_index;
        let worker_id = format!("{}-{}", self.setup.scenario.name(), worker_index);

        let stop_handle = self.setup.stop_handle.new_child();
        let context = WorkerContext::<RV, V>::new(
            worker_id.clone(),
            self.setup.scenario.metric_tags(),
            self.setup.runner_context.clone(),
            stop_handle.new_listener(),
            self.setup.interrupt_handle.new_listener(),
            worker_rng(
                self.setup.seed,
                self.setup.scenario_index,
                self.setup.scenario.name(),
                worker_index,
            ),
        );
        let behaviour = self.setup.scenario.behaviour();
        let stats = self.setup.stats.clone();
        let (done_sender, done) = crossbeam_channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name(worker_id.clone())
            .spawn(move || {
                let _done_sender = done_sender;
                let mut context = context;
                log::debug!("Starting worker {}", context.worker_id());

                match kind {
                    WorkerKind::Arrival { work, first } => {
                        for iteration in first.into_iter().chain(work.iter()) {
                            log::trace!(
                                "Worker {} starting iteration {}",
                                context.worker_id(),
                                iteration
                            );
                            run_iteration(&mut context, behaviour, &stats);
                        }
                    }
                    WorkerKind::Looping => {
                        while !context.should_stop() {
                            run_iteration(&mut context, behaviour, &stats);
                        }
                    }
                }

                log::debug!("Stopping worker {}", context.worker_id());
            })
            .map_err(|e| anyhow::anyhow!("Failed to spawn thread for worker {worker_id}: {e}"))?;

        self.next_worker_index += 1;
        self.workers.push(WorkerHandle {
            worker_id,
            stop_handle,
            done,
            thread,
        });
        self.setup.stats.record_worker_count(self.workers.len());

        Ok(())
    }
}

fn run_iteration<RV: UserValuesConstraint, V: UserValuesConstraint>(
    context: &mut WorkerContext<RV, V>,
    behaviour: WorkerHookMut<RV, V>,
    stats: &ScenarioStats,
) {
    stats.begin_iteration();

    let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| behaviour(context))) {
        Ok(Ok(())) => IterationOutcome::Completed,
        Ok(Err(e)) if e.is::<ShutdownSignalError>() => {
            // Expected when the run is shutting down or the worker was interrupted.
            IterationOutcome::Cancelled
        }
        Ok(Err(e)) => {
            log::error!("Worker behaviour failed for {}: {:?}", context.worker_id(), e);
            IterationOutcome::Failed
        }
        Err(panic) => {
            log::error!(
                "Worker behaviour panicked for {}: {}",
                context.worker_id(),
                panic_message(&panic)
            );
            IterationOutcome::Failed
        }
    };

    stats.end_iteration(outcome);
}

/// Seed a worker's RNG from the run seed, if there is one, so that each worker in each scenario
/// gets a different but repeatable sequence.
pub(crate) fn worker_rng(
    seed: Option<u64>,
    scenario_index: usize,
    scenario_name: &str,
    worker_index: usize,
) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(
            seed ^ name_hash(scenario_name)
                ^ ((scenario_index as u64) << 32)
                ^ worker_index as u64,
        ),
        None => StdRng::from_entropy(),
    }
}

/// FNV-1a, which is stable across builds unlike the std hasher.
fn name_hash(name: &str) -> u64 {
    name.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn seeded_workers_are_repeatable_and_distinct() {
        let a: u64 = worker_rng(Some(42), 0, "pass_api", 0).gen();
        let b: u64 = worker_rng(Some(42), 0, "pass_api", 0).gen();
        let c: u64 = worker_rng(Some(42), 0, "pass_api", 1).gen();
        let d: u64 = worker_rng(Some(42), 1, "pass_image_api", 0).gen();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn stats_track_peak_in_flight() {
        let stats = ScenarioStats::default();
        stats.begin_iteration();
        stats.begin_iteration();
        stats.end_iteration(IterationOutcome::Completed);
        stats.begin_iteration();
        stats.end_iteration(IterationOutcome::Failed);
        stats.end_iteration(IterationOutcome::Cancelled);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.started, 3);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.cancelled, 1);
        assert_eq!(snapshot.peak_in_flight, 2);
    }
}
