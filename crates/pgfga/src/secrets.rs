//! Credential resolution from multiple sources.
//!
//! Credentials can be given in several ways, checked in priority order:
//!
//! 1. **Direct value** - `password: "secret"` or `{ value: "secret" }`
//! 2. **File reference** - `{ file: /etc/pgfga/ldap.pw }`. When the file is
//!    executable it is run and its standard output is the credential, so a
//!    vault client or decrypt script can be plugged in.
//! 3. **Env var reference** - `{ env: LDAP_PASSWORD }`
//!
//! Any of them may additionally be base64 encoded (`base64: true`).

use std::fs;
use std::path::Path;
use std::process::Command;

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

/// Error type for secret resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("No secret source provided (need one of: value, file, or env)")]
    NoSourceProvided,

    #[error("Failed to read secret from file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to run secret command '{path}': {message}")]
    CommandFailed { path: String, message: String },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },

    #[error("Secret from {origin} is empty")]
    Empty { origin: String },

    #[error("Secret is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Decoded secret is not valid UTF-8")]
    NotUnicode,
}

/// Result type for secret resolution.
pub type Result<T> = std::result::Result<T, SecretError>;

/// Resolves a secret from multiple sources in priority order:
/// 1. Direct value (if provided and non-empty)
/// 2. File contents or executable output (if path provided)
/// 3. Environment variable (if name provided)
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<SecretString> {
    if let Some(value) = direct {
        if !value.is_empty() {
            return Ok(SecretString::from(value.to_string()));
        }
    }

    if let Some(path) = file_path {
        if !path.is_empty() {
            let expanded = expand_home(path);
            let content = if is_executable(Path::new(&expanded)) {
                run_command(&expanded)?
            } else {
                fs::read_to_string(&expanded).map_err(|e| SecretError::FileReadError {
                    path: expanded.clone(),
                    source: e,
                })?
            };
            return Ok(SecretString::from(content.trim().to_string()));
        }
    }

    if let Some(var_name) = env_var {
        if !var_name.is_empty() {
            return match std::env::var(var_name) {
                Ok(value) => Ok(SecretString::from(value.trim())),
                Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                    name: var_name.to_string(),
                }),
                Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                    name: var_name.to_string(),
                }),
            };
        }
    }

    Err(SecretError::NoSourceProvided)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 == 0o111)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    false
}

fn run_command(path: &str) -> Result<String> {
    let output = Command::new(path)
        .output()
        .map_err(|e| SecretError::CommandFailed {
            path: path.to_string(),
            message: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(SecretError::CommandFailed {
            path: path.to_string(),
            message: format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    String::from_utf8(output.stdout).map_err(|_| SecretError::NotUnicode)
}

/// Expands `~` to the user's home directory. `~user/path` is not supported.
fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen("~", &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}

/// A credential as written in the configuration.
///
/// Accepts either a bare string (a literal value) or a map with one of
/// `value`, `file` or `env` and an optional `base64` flag.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "CredentialRepr")]
pub struct Credential {
    pub value: Option<String>,
    pub file: Option<String>,
    pub env: Option<String>,
    pub base64: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CredentialRepr {
    Literal(String),
    Sources {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        env: Option<String>,
        #[serde(default)]
        base64: bool,
    },
}

impl From<CredentialRepr> for Credential {
    fn from(repr: CredentialRepr) -> Self {
        match repr {
            CredentialRepr::Literal(value) => Credential {
                value: Some(value),
                ..Credential::default()
            },
            CredentialRepr::Sources {
                value,
                file,
                env,
                base64,
            } => Credential {
                value,
                file,
                env,
                base64,
            },
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("value", &self.value.as_ref().map(|_| "[REDACTED]"))
            .field("file", &self.file)
            .field("env", &self.env)
            .field("base64", &self.base64)
            .finish()
    }
}

impl Credential {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Resolves and, if configured, base64-decodes the credential.
    pub fn resolve(&self) -> Result<SecretString> {
        let raw = resolve_secret(
            self.value.as_deref(),
            self.file.as_deref(),
            self.env.as_deref(),
        )?;
        if raw.expose_secret().is_empty() {
            return Err(SecretError::Empty {
                origin: self.origin(),
            });
        }
        if !self.base64 {
            return Ok(raw);
        }
        let bytes = base64::engine::general_purpose::STANDARD.decode(raw.expose_secret())?;
        let decoded = String::from_utf8(bytes).map_err(|_| SecretError::NotUnicode)?;
        if decoded.is_empty() {
            return Err(SecretError::Empty {
                origin: format!("{} after base64 decoding", self.origin()),
            });
        }
        Ok(SecretString::from(decoded))
    }

    fn origin(&self) -> String {
        if self.value.as_deref().is_some_and(|v| !v.is_empty()) {
            "value".to_string()
        } else if let Some(file) = self.file.as_deref().filter(|f| !f.is_empty()) {
            format!("file '{}'", file)
        } else if let Some(env) = &self.env {
            format!("env '{}'", env)
        } else {
            "credential".to_string()
        }
    }
}
