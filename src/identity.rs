//! Calling-application identity collaborator
//!
//! The bus authorizes pipe and route mutation to the owning application
//! only. Who the calling application *is* comes from an external identity
//! collaborator; the executive that hosts the bus supplies one that maps
//! the current task to its application.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Identifier of an application hosted by the executive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(u32);

impl AppId {
    /// Create an application identifier from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identifier value
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "App({})", self.0)
    }
}

/// "Who is the calling application" lookup
pub trait AppIdentity: Send + Sync {
    /// Identity of the application making the current call
    fn current_app(&self) -> AppId;
}

/// Identity provider holding one settable application id
///
/// Suits single-application processes and tests; a full executive supplies
/// its own task-aware implementation instead.
#[derive(Debug)]
pub struct StaticIdentity {
    current: AtomicU32,
}

impl StaticIdentity {
    /// Create a provider reporting the given application
    pub fn new(app: AppId) -> Self {
        Self {
            current: AtomicU32::new(app.raw()),
        }
    }

    /// Change the reported application
    pub fn set_current(&self, app: AppId) {
        self.current.store(app.raw(), Ordering::Relaxed);
    }
}

impl AppIdentity for StaticIdentity {
    fn current_app(&self) -> AppId {
        AppId::new(self.current.load(Ordering::Relaxed))
    }
}

impl Default for StaticIdentity {
    fn default() -> Self {
        Self::new(AppId::new(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_identity_reports_current_app() {
        let identity = StaticIdentity::new(AppId::new(3));
        assert_eq!(identity.current_app(), AppId::new(3));

        identity.set_current(AppId::new(9));
        assert_eq!(identity.current_app(), AppId::new(9));
    }
}
