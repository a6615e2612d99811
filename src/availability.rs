//! # Availability
//!
//! Reachability rank of a storage or a document, from best to worst.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DocStoreError;

/// Totally ordered availability rank.
///
/// The discriminant is the rank: lower is better. `NoneExistent` is the
/// supremum and means "no such document / storage".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Availability {
    InMemory = 0,
    Online = 1,
    Nearline = 2,
    Offline = 3,
    Unavailable = 4,
    NoneExistent = 5,
}

const ALL: [Availability; 6] = [
    Availability::InMemory,
    Availability::Online,
    Availability::Nearline,
    Availability::Offline,
    Availability::Unavailable,
    Availability::NoneExistent,
];

impl Availability {
    /// All values in rank order
    pub fn all() -> &'static [Availability] {
        &ALL
    }

    /// Rank of this value (0..=5)
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Value for a rank, if in range
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        ALL.get(ordinal as usize).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Availability::InMemory => "INMEMORY",
            Availability::Online => "ONLINE",
            Availability::Nearline => "NEARLINE",
            Availability::Offline => "OFFLINE",
            Availability::Unavailable => "UNAVAILABLE",
            Availability::NoneExistent => "NONEEXISTENT",
        }
    }

    /// Whether content can be read right now
    pub fn is_reachable(self) -> bool {
        self < Availability::Unavailable
    }
}

impl Hash for Availability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.ordinal());
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Availability {
    type Err = DocStoreError;

    /// Exact, case-sensitive match on the canonical name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL.iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DocStoreError::InvalidArgument(format!("unknown availability: {s:?}")))
    }
}
