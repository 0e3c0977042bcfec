use crate::cli::PassLoadCli;
use clap::Parser;

/// Initialise the CLI and logging for the load runner.
pub fn init() -> PassLoadCli {
    env_logger::init();

    PassLoadCli::parse()
}
