//! Backend abstraction.
//!
//! A backend is identified by its `host:port` string and nothing else. All
//! per-backend state (health flag, healthy-set membership, traffic counter)
//! lives in collections keyed by this identifier.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

/// A single backend server, identified by `host:port`.
///
/// Cheap to clone: the address is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Backend(Arc<str>);

impl Backend {
    /// Create a backend identifier from an address.
    pub fn new(addr: impl AsRef<str>) -> Self {
        Self(Arc::from(addr.as_ref()))
    }

    /// The `host:port` this backend is reached at.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Backend {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for Backend {
    fn from(addr: String) -> Self {
        Self(Arc::from(addr))
    }
}

impl Serialize for Backend {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
