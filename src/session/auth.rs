//! Authentication
//!
//! Token issuance is handled outside this crate; a session only attaches a
//! pre-issued token taken from the cloud config or `OS_TOKEN`.

use crate::config::CloudConfig;
use std::fmt;

/// Header carrying the token on every request
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Credentials attached to outgoing requests
#[derive(Clone, Default)]
pub struct Credentials {
    token: Option<String>,
}

impl Credentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn from_cloud(cloud: &CloudConfig) -> Self {
        Self::new(cloud.token.clone())
    }

    /// Standalone services (e.g. ironic in noauth mode) take no token
    pub fn is_noauth(&self) -> bool {
        self.token.is_none()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

// Security: never print the token itself
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = if self.token.is_some() { "<redacted>" } else { "<none>" };
        f.debug_struct("Credentials").field("token", &shown).finish()
    }
}
