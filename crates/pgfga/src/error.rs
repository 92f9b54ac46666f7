use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::ldap::DirectoryError;
use crate::pg::{DatabaseError, State};
use crate::secrets::SecretError;

#[derive(Error, Debug)]
pub enum PgFgaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Credential error: {0}")]
    Secret(#[from] SecretError),

    #[error("{kind} '{name}' is declared both {existing} and {requested}")]
    StateConflict {
        kind: ObjectKind,
        name: String,
        existing: State,
        requested: State,
    },
}

/// Coarse classification of a failure, used for logging and exit handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transient,
    StateConflict,
    Query,
    Directory,
}

impl PgFgaError {
    /// Returns true if the error is likely transient and a later run may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PgFgaError::Database(err) => err.is_transient(),
            PgFgaError::Directory(err) => err.is_transient(),
            _ => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PgFgaError::Config(_)
            | PgFgaError::Secret(_)
            | PgFgaError::Directory(DirectoryError::Credential(_)) => ErrorCategory::Configuration,
            PgFgaError::StateConflict { .. } => ErrorCategory::StateConflict,
            _ if self.is_transient() => ErrorCategory::Transient,
            PgFgaError::Database(_) => ErrorCategory::Query,
            PgFgaError::Directory(_) => ErrorCategory::Directory,
        }
    }
}

/// Object kinds named in conflict errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ObjectKind {
    Role,
    Grant,
    Database,
    Extension,
    ReplicationSlot,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Role => write!(f, "role"),
            ObjectKind::Grant => write!(f, "grant"),
            ObjectKind::Database => write!(f, "database"),
            ObjectKind::Extension => write!(f, "extension"),
            ObjectKind::ReplicationSlot => write!(f, "replication slot"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Failed to interpret config: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid role option '{option}'")]
    InvalidOption { option: String },

    #[error("Option list names both {option} and NO{option}")]
    ContradictoryOptions { option: String },

    #[error("User '{user}' uses ldap-group auth but has no ldapbasedn or ldapfilter")]
    MissingDirectoryQuery { user: String },

    #[error("ldap-group users are declared but the ldap section is missing")]
    MissingDirectoryConfig,

    #[error("Owner role '{owner}' of database '{database}' does not exist")]
    OwnerMissing { database: String, owner: String },

    #[error("Extension '{extension}' is not available for database '{database}'")]
    ExtensionUnavailable { database: String, extension: String },

    #[error("Extension '{extension}' version '{version}' is not available for database '{database}'")]
    ExtensionVersionUnavailable {
        database: String,
        extension: String,
        version: String,
    },

    #[error("Refusing to drop database '{name}': it is the database this run is connected to")]
    ProtectedDatabase { name: String },
}

/// Result type for pgfga operations.
pub type Result<T> = std::result::Result<T, PgFgaError>;
