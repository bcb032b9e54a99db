//! Command Line Interface (CLI) layer for ZONEX.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the run wiring (`runner`) that turns parsed arguments into an
//! immutable `RunConfig` and hands it to the batch orchestrator.
//!
//! If you are embedding ZONEX into another application, prefer the library
//! API (`zonex::core::orchestrator`) over calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
