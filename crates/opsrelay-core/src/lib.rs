//! Foundational low-level utilities shared across opsrelay crates.
//!
//! Provides the requester identity type, atomic file-write helpers, time
//! utilities used by session expiry, and text shaping for transport limits.

pub mod atomic_io;
pub mod identity;
pub mod text;
pub mod time_utils;

pub use atomic_io::write_atomic_with;
pub use identity::Identity;
pub use text::{chunk_text, first_non_blank, truncate_chars, TRUNCATION_MARKER};
pub use time_utils::{current_unix_timestamp_ms, duration_to_ms, is_within_expiry};
