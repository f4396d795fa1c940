//! Command execution gateway for privileged host operations.
//!
//! Maps validated [`Operation`] values onto fixed argument vectors, runs them
//! through a [`ProcessRunner`] without any shell interpretation, and
//! classifies every result into an [`ExecutionOutcome`].

pub mod backup;
pub mod gateway;
pub mod operation;
pub mod outcome;
pub mod process_runner;

pub use backup::*;
pub use gateway::*;
pub use operation::*;
pub use outcome::*;
pub use process_runner::*;
