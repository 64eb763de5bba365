//! Canonical domain types shared across the engine.

mod timestamp;
mod window;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub use timestamp::UtcTimestamp;
pub use window::{AttributionWindow, RelativePeriod};

/// Marketing message channel tracked by the attribution model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    pub const ALL: [Self; 2] = [Self::Email, Self::Sms];
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
