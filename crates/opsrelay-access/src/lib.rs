//! Authorization and session primitives for the relay.
//!
//! The allow-list is fixed at start-up, sessions are time-bound grants held in
//! memory, and [`AccessPolicy`] is the single predicate every privileged path
//! consults.

pub mod allowlist;
pub mod credential;
pub mod policy;
pub mod session_store;

pub use allowlist::*;
pub use credential::*;
pub use policy::*;
pub use session_store::*;
