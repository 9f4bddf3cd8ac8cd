mod cli;

use anyhow::Result;
use clap::Parser;
use courier::logging::{self, MinLogLevel};

fn main() -> Result<()> {
    let params = cli::params::Params::parse();
    let level = MinLogLevel::parse(params.log_level.as_deref())?;
    logging::init(level);

    cli::run(params)
}
