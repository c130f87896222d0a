//! Hub policies selectable through configuration.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What happens to a channel once its last subscriber leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRetention {
    /// Remove the channel as soon as its subscriber set is empty.
    #[default]
    Destroy,
    /// Keep empty channels known to the index.
    Retain,
}

/// Whether one user may hold several concurrent sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPolicy {
    #[default]
    Multiple,
    Single,
}

impl fmt::Display for ChannelRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroy => f.write_str("destroy"),
            Self::Retain => f.write_str("retain"),
        }
    }
}

impl fmt::Display for SessionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Multiple => f.write_str("multiple"),
            Self::Single => f.write_str("single"),
        }
    }
}
