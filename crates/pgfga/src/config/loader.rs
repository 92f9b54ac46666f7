use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::schema::{Document, UserAuth};
use crate::error::ConfigError;
use crate::pg::option::{parse_options, RoleOptionMap};

const SCHEMA_JSON: &str = include_str!("../../schema/desired-state.json");

static RE_SLOT_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").unwrap());

pub fn load_document<P: AsRef<Path>>(path: P) -> Result<Document, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_document_from_str(&content)
}

pub fn load_document_from_str(content: &str) -> Result<Document, ConfigError> {
    let json_value: serde_json::Value = serde_yaml::from_str(content)?;

    validate_schema(&json_value)?;

    let document: Document = serde_json::from_value(json_value)?;

    validate_document(&document)?;

    Ok(document)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_options(tokens: &[String]) -> Result<(), ConfigError> {
    let options = parse_options(tokens)?;
    RoleOptionMap::compose(&options)?;
    Ok(())
}

fn validate_document(document: &Document) -> Result<(), ConfigError> {
    for role in document.roles.values() {
        validate_options(&role.options)?;
    }

    let mut needs_directory = false;
    for (name, user) in &document.users {
        validate_options(&user.options)?;

        if let UserAuth::LdapGroup {
            ldapbasedn,
            ldapfilter,
        } = &user.auth
        {
            let missing = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if missing(ldapbasedn) || missing(ldapfilter) {
                return Err(ConfigError::MissingDirectoryQuery { user: name.clone() });
            }
            needs_directory |= user.state.is_present();
        }
    }
    if needs_directory && document.ldap.is_none() {
        return Err(ConfigError::MissingDirectoryConfig);
    }

    for slot in &document.replication_slots {
        if !RE_SLOT_NAME.is_match(slot) {
            return Err(ConfigError::Validation {
                message: format!(
                    "Invalid replication slot name '{}': only lower case letters, numbers and underscores are allowed",
                    slot
                ),
            });
        }
    }

    if document.conventions.readonly_suffix.is_empty() {
        return Err(ConfigError::Validation {
            message: "conventions.readonly_suffix must not be empty".to_string(),
        });
    }

    Ok(())
}
