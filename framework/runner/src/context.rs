use std::future::Future;
use std::time::Duration;
use std::{fmt::Debug, sync::Arc};

use pass_load_core::prelude::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
use pass_load_instruments::prelude::{MetricTags, Reporter};
use rand::rngs::StdRng;

use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

impl UserValuesConstraint for () {}

/// The context shared by every worker in a run.
///
/// It is created before the setup hook runs, which can fill in the user value `RV`. After that it
/// is shared read-only with every worker.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    run_id: String,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
        run_id: String,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            run_id,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> Arc<Reporter> {
        self.reporter.clone()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stop every scenario in the run, as if the user had pressed Ctrl-C.
    pub fn force_stop_run(&self) {
        self.shutdown_handle.shutdown();
    }

    pub(crate) fn shutdown_handle(&self) -> &ShutdownHandle {
        &self.shutdown_handle
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context owned by a single worker.
///
/// A worker runs the scenario behaviour over and over, passing this context each time. The user
/// value `V` persists between iterations of the same worker.
pub struct WorkerContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    worker_id: String,
    metric_tags: MetricTags,
    runner_context: Arc<RunnerContext<RV>>,
    stop_listener: DelegatedShutdownListener,
    interrupt_listener: DelegatedShutdownListener,
    rng: StdRng,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> WorkerContext<RV, V> {
    pub(crate) fn new(
        worker_id: String,
        metric_tags: MetricTags,
        runner_context: Arc<RunnerContext<RV>>,
        stop_listener: DelegatedShutdownListener,
        interrupt_listener: DelegatedShutdownListener,
        rng: StdRng,
    ) -> Self {
        Self {
            worker_id,
            metric_tags,
            runner_context,
            stop_listener,
            interrupt_listener,
            rng,
            value: Default::default(),
        }
    }

    /// A unique identifier for this worker within the run, such as `pass_api-3`.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn scenario_name(&self) -> &str {
        self.metric_tags.scenario()
    }

    /// The tags to attach to anything this worker records.
    pub fn metric_tags(&self) -> &MetricTags {
        &self.metric_tags
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Whether this worker has been asked to stop, because its scenario is over, it was retired by
    /// a ramp down or the run is shutting down.
    pub fn should_stop(&self) -> bool {
        self.stop_listener.should_shutdown()
    }

    /// Run async code for this worker, blocking until it completes.
    ///
    /// The future is cancelled with a [ShutdownSignalError] if the run is shut down, or if the
    /// scenario interrupts its workers because they did not finish within the graceful stop period.
    pub fn execute<T>(&mut self, fut: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
        let interrupt_listener = &mut self.interrupt_listener;
        self.runner_context.executor.execute_in_place(async move {
            tokio::select! {
                result = fut => result,
                _ = interrupt_listener.wait_for_shutdown() => {
                    Err(anyhow::anyhow!(ShutdownSignalError::default()))
                },
            }
        })
    }

    /// Pause between requests without holding up other workers.
    ///
    /// Returns early if the worker is asked to stop.
    pub fn think(&mut self, duration: Duration) -> crate::definition::HookResult {
        let stop_listener = &mut self.stop_listener;
        let result = self.runner_context.executor.execute_in_place(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {},
                _ = stop_listener.wait_for_shutdown() => {},
            }
            Ok(())
        });

        match result {
            Err(e) if e.is::<ShutdownSignalError>() => Ok(()),
            other => other,
        }
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
