//! Chat-facing side of the relay: command catalog, inbound command parsing,
//! the request dispatcher and the long-polling runtime that drives it.

pub mod command_catalog;
pub mod config;
pub mod dispatcher;
pub mod relay_command;
pub mod runtime;

pub use command_catalog::*;
pub use config::*;
pub use dispatcher::*;
pub use relay_command::*;
pub use runtime::*;
