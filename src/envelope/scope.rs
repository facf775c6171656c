//! # Event scope.
//!
//! [`Scope`] decides which broker the router hands an envelope to:
//! - [`Scope::Process`] → the process-level (local) broker only
//! - [`Scope::App`] → the application-level (possibly distributed) broker only

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Routing discriminator carried by every envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Handled inside the current process only.
    Process,
    /// Delivered through the application-level broker (default).
    #[default]
    App,
}

impl Scope {
    /// Wire representation (`"process"` / `"app"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Process => "process",
            Scope::App => "app",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(Scope::Process),
            "app" => Ok(Scope::App),
            other => Err(ValidationError::Malformed {
                reason: format!("unknown scope '{other}'"),
            }),
        }
    }
}
