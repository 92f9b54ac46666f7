//! Run-wide policy: which kinds may be dropped, and naming conventions.

use serde::{Deserialize, Serialize};

/// Per-kind flags permitting destructive convergence.
///
/// With a flag unset, objects of that kind declared Absent are only
/// observed, never removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrictOptions {
    #[serde(default)]
    pub users: bool,
    #[serde(default)]
    pub databases: bool,
    #[serde(default)]
    pub extensions: bool,
    #[serde(default, rename = "replication_slots")]
    pub slots: bool,
}

impl StrictOptions {
    /// Strict mode for every kind.
    pub fn all() -> Self {
        Self {
            users: true,
            databases: true,
            extensions: true,
            slots: true,
        }
    }
}

/// Site conventions layered on top of the declared objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conventions {
    /// Each Present database gets a read-only role named `<db><suffix>`.
    #[serde(default = "default_readonly_suffix")]
    pub readonly_suffix: String,

    /// When set, every read-only role is granted this role.
    #[serde(default)]
    pub readonly_group: Option<String>,

    /// When set, every database owner is granted this role.
    #[serde(default)]
    pub owner_group: Option<String>,

    /// New owner for objects of a dropped role. Defaults to the connecting user.
    #[serde(default)]
    pub fallback_owner: Option<String>,
}

fn default_readonly_suffix() -> String {
    "_readonly".to_string()
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            readonly_suffix: default_readonly_suffix(),
            readonly_group: None,
            owner_group: None,
            fallback_owner: None,
        }
    }
}

impl Conventions {
    /// Name of the read-only role of a database.
    pub fn readonly_role(&self, database: &str) -> String {
        format!("{}{}", database, self.readonly_suffix)
    }
}
