//! Command-line interface for formsweep.
//!
//! Provides the batch `run` command (the default), catalog listing, and
//! offline summary regeneration.

mod commands;
mod prompt;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands, RunArgs};
pub use prompt::prompt_optional_settings;
