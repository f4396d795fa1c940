//! Push monitoring for subscribed operators.
//!
//! [`SubscriberRegistry`] tracks who opted in; [`MonitorScheduler`] sweeps it
//! on a fixed cadence, re-checking authorization for every subscriber before
//! anything is delivered.

pub mod scheduler;
pub mod subscribers;

pub use scheduler::*;
pub use subscribers::*;
