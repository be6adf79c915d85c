//! Capability checks for action endpoints.

use std::collections::HashSet;
use std::fmt;

/// Capabilities checked by the action endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    RestrictLibraries,
    UpdateLibraries,
    ViewLibraries,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::RestrictLibraries => "restrictlibraries",
            Capability::UpdateLibraries => "updatelibraries",
            Capability::ViewLibraries => "viewlibraries",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a user holds a capability
pub trait Authorizer {
    fn has_capability(&self, user_id: i64, capability: Capability) -> bool;
}

/// Grants every capability (local administration through the CLI)
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn has_capability(&self, _user_id: i64, _capability: Capability) -> bool {
        true
    }
}

/// Grants a fixed set of capabilities to every user
#[derive(Debug, Default, Clone)]
pub struct StaticAuthorizer {
    granted: HashSet<Capability>,
}

impl StaticAuthorizer {
    pub fn new(granted: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            granted: granted.into_iter().collect(),
        }
    }
}

impl Authorizer for StaticAuthorizer {
    fn has_capability(&self, _user_id: i64, capability: Capability) -> bool {
        self.granted.contains(&capability)
    }
}
