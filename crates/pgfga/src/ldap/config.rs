use serde::Deserialize;

use crate::secrets::Credential;

/// Connection settings for the directory service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    /// Bind DN. Anonymous bind when unset.
    #[serde(default)]
    pub user: Option<Credential>,

    #[serde(default)]
    pub password: Option<Credential>,

    /// Tried in order, e.g. `ldaps://ldap1.example.com`.
    #[serde(default)]
    pub servers: Vec<String>,

    /// Rounds over all servers before giving up.
    #[serde(default = "default_conn_retries")]
    pub conn_retries: u32,
}

fn default_conn_retries() -> u32 {
    1
}

impl DirectoryConfig {
    /// Number of connection rounds, at least one.
    pub fn rounds(&self) -> u32 {
        self.conn_retries.max(1)
    }
}
