use pass_load_runner::prelude::{WeightError, WeightedChoice};

/// Which call the passes workload makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassesBranch {
    ListAll,
    ElevationRange,
}

/// How the image workload obtains an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageBranch {
    /// Ask the image service for a fixture coordinate.
    Direct,
    /// List passes and ask the passes service for the image of one with coordinates.
    ViaPasses,
}

/// How the slow summary endpoint is mixed into the summary workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowSummary {
    /// Sometimes call the slow endpoint after the normal one.
    Alongside,
    /// Sometimes call the slow endpoint in place of the normal one.
    Instead,
}

/// Which summary endpoints one run of the summary workload calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryBranch {
    Normal,
    NormalThenSlow,
    Slow,
}

impl SummaryBranch {
    pub fn calls_normal(self) -> bool {
        self != SummaryBranch::Slow
    }

    pub fn calls_slow(self) -> bool {
        self != SummaryBranch::Normal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Passes,
    Summary,
    Image,
    Combined,
}

/// Fixed probabilities for the random choices the workloads make.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadWeights {
    /// Probability of listing every pass rather than searching by elevation.
    pub list_all: f64,
    /// Probability of requesting an image directly rather than through the passes service.
    pub direct_image: f64,
    /// Probability of calling the slow summary endpoint.
    pub slow_summary: f64,
    pub slow_summary_mode: SlowSummary,
    /// Relative weights of the workloads picked by the continuous workflow.
    pub mix: Vec<(f64, WorkloadKind)>,
}

impl WorkloadWeights {
    pub fn main() -> Self {
        Self {
            list_all: 0.7,
            direct_image: 0.5,
            slow_summary: 0.2,
            slow_summary_mode: SlowSummary::Alongside,
            mix: default_mix(),
        }
    }

    pub fn continuous() -> Self {
        Self {
            slow_summary: 0.1,
            slow_summary_mode: SlowSummary::Instead,
            ..Self::main()
        }
    }
}

fn default_mix() -> Vec<(f64, WorkloadKind)> {
    vec![
        (40.0, WorkloadKind::Passes),
        (30.0, WorkloadKind::Summary),
        (20.0, WorkloadKind::Image),
        (10.0, WorkloadKind::Combined),
    ]
}

/// The weighted choice tables built from [WorkloadWeights].
#[derive(Debug, Clone)]
pub struct WorkloadChoices {
    pub passes: WeightedChoice<PassesBranch>,
    pub image: WeightedChoice<ImageBranch>,
    pub summary: WeightedChoice<SummaryBranch>,
    pub mix: WeightedChoice<WorkloadKind>,
}

impl WorkloadChoices {
    pub fn new(weights: &WorkloadWeights) -> Result<Self, WeightError> {
        Ok(Self {
            passes: WeightedChoice::either(
                weights.list_all,
                PassesBranch::ListAll,
                PassesBranch::ElevationRange,
            )?,
            image: WeightedChoice::either(
                weights.direct_image,
                ImageBranch::Direct,
                ImageBranch::ViaPasses,
            )?,
            summary: WeightedChoice::either(
                weights.slow_summary,
                match weights.slow_summary_mode {
                    SlowSummary::Alongside => SummaryBranch::NormalThenSlow,
                    SlowSummary::Instead => SummaryBranch::Slow,
                },
                SummaryBranch::Normal,
            )?,
            mix: WeightedChoice::new(weights.mix.iter().copied())?,
        })
    }
}
