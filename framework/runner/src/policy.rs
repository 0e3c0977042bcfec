use std::time::Duration;

/// How a scenario decides when to start iterations.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrivalPolicy {
    /// Start iterations at a fixed rate, independent of how long each iteration takes.
    ConstantArrivalRate(ArrivalRate),
    /// Keep a number of workers looping over the behaviour, with the number changing over time.
    RampingVus(RampingVus),
    /// A fixed arrival rate tuned for long running background traffic.
    Continuous(ArrivalRate),
}

impl ArrivalPolicy {
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        match self {
            ArrivalPolicy::ConstantArrivalRate(rate) | ArrivalPolicy::Continuous(rate) => {
                rate.validate()
            }
            ArrivalPolicy::RampingVus(ramp) => ramp.validate(),
        }
    }

    /// The most iterations this policy can have in flight at once.
    pub fn max_vus(&self) -> usize {
        match self {
            ArrivalPolicy::ConstantArrivalRate(rate) | ArrivalPolicy::Continuous(rate) => {
                rate.max_vus
            }
            ArrivalPolicy::RampingVus(ramp) => ramp.max_target(),
        }
    }
}

/// A target rate of iterations per `time_unit`, served by a pool of workers that grows from
/// `pre_allocated_vus` up to `max_vus`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalRate {
    pub rate: f64,
    pub time_unit: Duration,
    pub pre_allocated_vus: usize,
    pub max_vus: usize,
}

impl ArrivalRate {
    pub fn per_second(rate: f64) -> Self {
        Self {
            rate,
            time_unit: Duration::from_secs(1),
            pre_allocated_vus: 1,
            max_vus: 1,
        }
    }

    /// Defaults for a low rate background scenario, 2 pre-allocated workers and at most 10.
    pub fn continuous(rate: f64) -> Self {
        Self::per_second(rate)
            .with_pre_allocated_vus(2)
            .with_max_vus(10)
    }

    pub fn with_time_unit(mut self, time_unit: Duration) -> Self {
        self.time_unit = time_unit;
        self
    }

    pub fn with_pre_allocated_vus(mut self, pre_allocated_vus: usize) -> Self {
        self.pre_allocated_vus = pre_allocated_vus;
        self.max_vus = self.max_vus.max(pre_allocated_vus);
        self
    }

    pub fn with_max_vus(mut self, max_vus: usize) -> Self {
        self.max_vus = max_vus;
        self
    }

    /// Offset from the scenario start at which iteration `i` is due.
    ///
    /// Computed from the iteration number rather than by adding intervals so that timing errors do
    /// not accumulate.
    pub fn due_at(&self, iteration: u64) -> Duration {
        self.time_unit.mul_f64(iteration as f64 / self.rate)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            anyhow::bail!("Arrival rate must be a positive number, got {}", self.rate);
        }
        if self.time_unit.is_zero() {
            anyhow::bail!("Arrival rate time unit must not be zero");
        }
        if self.max_vus == 0 {
            anyhow::bail!("Arrival rate max_vus must be at least 1");
        }
        if self.pre_allocated_vus > self.max_vus {
            anyhow::bail!(
                "Arrival rate pre_allocated_vus ({}) must not exceed max_vus ({})",
                self.pre_allocated_vus,
                self.max_vus
            );
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RampMode {
    /// Move between targets linearly over the stage, rounding to the nearest worker.
    #[default]
    Linear,
    /// Jump to the stage target at the start of the stage.
    Step,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// A number of looping workers that changes over a sequence of stages.
///
/// ```
/// use pass_load_runner::prelude::RampingVus;
/// use std::time::Duration;
///
/// let ramp = RampingVus::new(1)
///     .with_stage(Duration::from_secs(15), 5)
///     .with_stage(Duration::from_secs(30), 5)
///     .with_stage(Duration::from_secs(15), 0);
///
/// assert_eq!(ramp.total_duration(), Duration::from_secs(60));
/// assert_eq!(ramp.target_at(Duration::from_secs(20)), 5);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RampingVus {
    pub start_vus: usize,
    pub stages: Vec<Stage>,
    pub mode: RampMode,
}

impl RampingVus {
    pub fn new(start_vus: usize) -> Self {
        Self {
            start_vus,
            stages: Vec::new(),
            mode: RampMode::default(),
        }
    }

    pub fn with_stage(mut self, duration: Duration, target: usize) -> Self {
        self.stages.push(Stage::new(duration, target));
        self
    }

    pub fn with_mode(mut self, mode: RampMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_target(&self) -> usize {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, usize::max)
    }

    /// The number of workers that should be active at `elapsed` since the scenario started.
    ///
    /// After the last stage the target stays at the last stage target.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut previous = self.start_vus;
        let mut stage_start = Duration::ZERO;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                return match self.mode {
                    RampMode::Step => stage.target,
                    RampMode::Linear => {
                        let progress = (elapsed - stage_start).as_secs_f64()
                            / stage.duration.as_secs_f64();
                        let value = previous as f64
                            + (stage.target as f64 - previous as f64) * progress;
                        value.round() as usize
                    }
                };
            }

            previous = stage.target;
            stage_start = stage_end;
        }

        previous
    }

    /// Scale every stage so that the ramp takes `total` instead of its configured duration.
    pub(crate) fn scaled_to(&self, total: Duration) -> Self {
        let current = self.total_duration();
        let factor = if current.is_zero() {
            0.0
        } else {
            total.as_secs_f64() / current.as_secs_f64()
        };

        Self {
            start_vus: self.start_vus,
            stages: self
                .stages
                .iter()
                .map(|s| Stage::new(s.duration.mul_f64(factor), s.target))
                .collect(),
            mode: self.mode,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.stages.is_empty() {
            anyhow::bail!("A ramping scenario needs at least one stage");
        }

        Ok(())
    }
}
