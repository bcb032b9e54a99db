//! ZONEX CLI entrypoint.
//!
//! Thin wrapper over the `cli` module: parse args, build the run
//! configuration, and execute the batch pipeline. For programmatic use,
//! prefer the library API (`zonex::core::orchestrator`).

use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();
    cli::run(args)
}
