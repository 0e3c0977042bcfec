use clap::Parser;
use pass_load_instruments::{ThresholdParseError, ThresholdRule};

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct PassLoadCli {
    /// The number of seconds to run each scenario for.
    ///
    /// This replaces the duration configured by the profile. Ramping scenarios have their stages
    /// scaled to fit the new duration.
    #[clap(long)]
    pub duration: Option<u64>,

    /// Run this test as a soak test, ignoring any configured duration and continuing to run until stopped
    #[clap(long, default_value = "false")]
    pub soak: bool,

    /// A threshold that the run must meet, in the format `metric{tag:value}:expression`. For
    /// example `--threshold 'http_req_duration:p(95)<500'`.
    ///
    /// You can specify multiple thresholds by using the flag multiple times. Thresholds given on
    /// the command line replace the defaults of the profile.
    #[clap(long = "threshold", value_parser = parse_threshold)]
    pub thresholds: Vec<ThresholdRule>,

    /// Seed for the random number generators of the workers, which makes the choices each worker
    /// makes repeatable.
    #[clap(long)]
    pub seed: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Do not report iterations that were dropped because every worker was busy.
    #[clap(long, default_value = "false")]
    pub ignore_dropped_iterations: bool,

    /// The ID of this run, used to identify it in logs and the summary. A random ID is generated
    /// when none is given.
    #[clap(long)]
    pub run_id: Option<String>,
}

fn parse_threshold(s: &str) -> Result<ThresholdRule, ThresholdParseError> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_repeated_thresholds() {
        let cli = PassLoadCli::try_parse_from([
            "pass_services",
            "--duration",
            "10",
            "--threshold",
            "http_req_duration:p(95)<500",
            "--threshold",
            "checks{scenario:pass_api}:rate>0.9",
            "--seed",
            "42",
        ])
        .unwrap();

        assert_eq!(cli.duration, Some(10));
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.thresholds.len(), 2);
        assert_eq!(
            cli.thresholds[1].to_string(),
            "checks{scenario:pass_api}:rate>0.9"
        );
        assert!(!cli.soak);
    }

    #[test]
    fn reject_invalid_threshold() {
        let result = PassLoadCli::try_parse_from([
            "pass_services",
            "--threshold",
            "http_req_duration:p(95)",
        ]);

        assert!(result.is_err());
    }
}
