pub mod config;
pub mod error;
pub mod ldap;
pub mod orchestrator;
pub mod pg;
pub mod planner;
pub mod registry;
pub mod secrets;

pub use config::{load_document, load_document_from_str, Document};
pub use error::{ConfigError, ErrorCategory, ObjectKind, PgFgaError, Result};
pub use ldap::{DirectoryError, LdapDirectory, MembershipResolver};
pub use orchestrator::Orchestrator;
pub use pg::{DatabaseError, PgConnector, State};
pub use planner::Planner;
pub use registry::{Declarations, Registry};
pub use secrets::{resolve_secret, Credential, SecretError};
