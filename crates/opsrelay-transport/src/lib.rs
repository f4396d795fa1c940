//! Chat transport contract and the Telegram Bot API client implementing it.
//!
//! The relay core only sees [`ChatTransport`] and [`UpdateSource`]; delivery
//! failures surface as [`DeliveryError`] values with stable reason codes so
//! callers can report them without treating them as fatal.

pub mod contract;
pub mod telegram;

pub use contract::*;
pub use telegram::*;
