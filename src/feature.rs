//! # Storage Features
//!
//! Capability tags granted to storages by configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named capability with an optional free-form parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl Feature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: None,
        }
    }

    pub fn with_parameter(name: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameter: Some(parameter.into()),
        }
    }

    /// Whether a storage granted `granted` satisfies this requested feature.
    ///
    /// A request without a parameter matches any parameter of the same name.
    pub fn matches(&self, granted: &Feature) -> bool {
        if self.name != granted.name {
            return false;
        }
        match &self.parameter {
            None => true,
            Some(p) => granted.parameter.as_deref() == Some(p.as_str()),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(p) => write!(f, "{}({})", self.name, p),
            None => write!(f, "{}", self.name),
        }
    }
}
