//! Directory error types.

use thiserror::Error;

use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("None of the ldap servers are available: {}", servers.join(", "))]
    Unavailable { servers: Vec<String> },

    #[error("Bind to '{server}' failed: {message}")]
    Bind { server: String, message: String },

    #[error("Search under '{base}' failed: {message}")]
    Search { base: String, message: String },

    #[error("Member '{name}' is known as '{known}' but was given as '{given}'")]
    IdentityConflict {
        name: String,
        known: String,
        given: String,
    },

    #[error("Member '{name}' is a {known} and cannot become a {given}")]
    KindConflict {
        name: String,
        known: String,
        given: String,
    },

    #[error("Membership cycle: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("Failed to resolve directory credential: {0}")]
    Credential(#[from] SecretError),
}

impl DirectoryError {
    /// Only an unreachable directory may clear up on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, DirectoryError::Unavailable { .. })
    }
}
