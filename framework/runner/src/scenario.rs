use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Duration;

use pass_load_instruments::prelude::MetricTags;

use crate::context::UserValuesConstraint;
use crate::definition::WorkerHookMut;
use crate::policy::{ArrivalPolicy, ArrivalRate, RampingVus};

/// How long in-flight iterations may keep running after a scenario's duration has elapsed.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Duration of a continuous scenario unless configured otherwise.
pub const CONTINUOUS_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// An independently scheduled workload within a run.
pub struct ScenarioSpec<RV: UserValuesConstraint, V: UserValuesConstraint> {
    name: String,
    behaviour: WorkerHookMut<RV, V>,
    policy: ArrivalPolicy,
    duration: Duration,
    start_offset: Duration,
    graceful_stop: Duration,
    tags: BTreeMap<String, String>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioSpec<RV, V> {
    fn new(
        name: &str,
        behaviour: WorkerHookMut<RV, V>,
        policy: ArrivalPolicy,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            policy,
            duration,
            start_offset: Duration::ZERO,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            tags: BTreeMap::new(),
        }
    }

    /// Start iterations at a fixed rate for `duration`.
    pub fn constant_arrival_rate(
        name: &str,
        behaviour: WorkerHookMut<RV, V>,
        rate: ArrivalRate,
        duration: Duration,
    ) -> Self {
        Self::new(
            name,
            behaviour,
            ArrivalPolicy::ConstantArrivalRate(rate),
            duration,
        )
    }

    /// Loop the behaviour on a number of workers that follows the stages of `ramp`. The
    /// scenario lasts as long as the stages do.
    pub fn ramping_vus(name: &str, behaviour: WorkerHookMut<RV, V>, ramp: RampingVus) -> Self {
        let duration = ramp.total_duration();
        Self::new(name, behaviour, ArrivalPolicy::RampingVus(ramp), duration)
    }

    /// Low rate background traffic, running for a day unless the duration is changed with
    /// [ScenarioSpec::with_duration].
    pub fn continuous(name: &str, behaviour: WorkerHookMut<RV, V>, rate: ArrivalRate) -> Self {
        Self::new(
            name,
            behaviour,
            ArrivalPolicy::Continuous(rate),
            CONTINUOUS_DURATION,
        )
    }

    /// Wait this long after the run starts before starting the scenario.
    pub fn with_start_offset(mut self, start_offset: Duration) -> Self {
        self.start_offset = start_offset;
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Attach a tag to every record produced by this scenario.
    pub fn with_tag(mut self, name: &str, value: &str) -> Self {
        self.tags.insert(name.to_string(), value.to_string());
        self
    }

    /// Change how long the scenario runs for. Ramping stages are scaled to fit.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        if let ArrivalPolicy::RampingVus(ramp) = &self.policy {
            self.policy = ArrivalPolicy::RampingVus(ramp.scaled_to(duration));
        }
        self.duration = duration;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &ArrivalPolicy {
        &self.policy
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    pub fn graceful_stop(&self) -> Duration {
        self.graceful_stop
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub(crate) fn behaviour(&self) -> WorkerHookMut<RV, V> {
        self.behaviour
    }

    pub(crate) fn metric_tags(&self) -> MetricTags {
        self.tags
            .iter()
            .fold(MetricTags::new(&self.name), |tags, (name, value)| {
                tags.with_tag(name, value)
            })
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Scenario names must not be empty");
        }
        self.policy
            .validate()
            .map_err(|e| e.context(format!("Invalid policy for scenario [{}]", self.name)))
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> std::fmt::Debug for ScenarioSpec<RV, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioSpec")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("duration", &self.duration)
            .field("start_offset", &self.start_offset)
            .field("graceful_stop", &self.graceful_stop)
            .field("tags", &self.tags)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    /// Waiting for the start offset to elapse.
    Pending,
    /// Starting iterations.
    Active,
    /// No new iterations are started, in-flight iterations are finishing.
    Draining,
    Complete,
}

impl Display for ScenarioPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScenarioPhase::Pending => "pending",
            ScenarioPhase::Active => "active",
            ScenarioPhase::Draining => "draining",
            ScenarioPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Maps time since the run started onto the phase a scenario should be in.
///
/// The clock cannot tell when draining is done, so it never reports [ScenarioPhase::Complete].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScenarioClock {
    start_offset: Duration,
    /// `None` for a soak run, which stays active until stopped.
    duration: Option<Duration>,
}

impl ScenarioClock {
    pub(crate) fn new(start_offset: Duration, duration: Option<Duration>) -> Self {
        Self {
            start_offset,
            duration,
        }
    }

    pub(crate) fn phase_at(&self, since_run_start: Duration) -> ScenarioPhase {
        if since_run_start < self.start_offset {
            return ScenarioPhase::Pending;
        }

        match self.duration {
            Some(duration) if since_run_start - self.start_offset >= duration => {
                ScenarioPhase::Draining
            }
            _ => ScenarioPhase::Active,
        }
    }

    pub(crate) fn start_offset(&self) -> Duration {
        self.start_offset
    }

    /// When the scenario stops starting iterations, relative to the run start.
    pub(crate) fn ends_at(&self) -> Option<Duration> {
        self.duration.map(|d| self.start_offset + d)
    }
}
