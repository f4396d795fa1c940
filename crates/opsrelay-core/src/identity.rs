use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Opaque requester key supplied by the chat transport with every request.
///
/// For direct conversations the identity doubles as the chat id used to push
/// messages back to that requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(i64);

impl Identity {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn direct_chat_id(self) -> i64 {
        self.0
    }
}

impl From<i64> for Identity {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        trimmed
            .parse::<i64>()
            .map(Self)
            .map_err(|error| format!("invalid identity '{trimmed}': {error}"))
    }
}
