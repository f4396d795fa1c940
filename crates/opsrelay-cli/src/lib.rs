//! Command-line surface and process wiring for the `opsrelay` binary.

pub mod cli_args;
pub mod startup;

pub use cli_args::Cli;
pub use startup::{relay_config_from_cli, run_relay, telegram_config_from_cli};
