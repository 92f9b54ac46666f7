use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::ldap::DirectoryConfig;
use crate::pg::{ConnParams, Conventions, State, StrictOptions};
use crate::secrets::Credential;

/// The desired-state document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub strict: StrictOptions,
    #[serde(default)]
    pub conventions: Conventions,
    #[serde(default)]
    pub ldap: Option<DirectoryConfig>,
    #[serde(default)]
    pub postgresql_dsn: ConnParams,
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
    #[serde(default)]
    pub users: BTreeMap<String, UserConfig>,
    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,
    #[serde(default)]
    pub replication_slots: Vec<String>,
}

static RE_DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9]+(?:\.[0-9]+)?)(ms|s|m|h)").expect("Invalid duration regex")
});

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    /// Wait before the run starts: whole seconds or a duration like `1m30s`.
    #[serde(default, deserialize_with = "deserialize_run_delay")]
    pub run_delay: Duration,
    #[serde(default)]
    pub debug: bool,
}

fn default_loglevel() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            loglevel: default_loglevel(),
            run_delay: Duration::ZERO,
            debug: false,
        }
    }
}

impl GeneralConfig {
    /// The `loglevel` as a tracing level. `dpanic`, `panic` and `fatal` log errors only.
    pub fn tracing_level(&self) -> &str {
        match self.loglevel.as_str() {
            "dpanic" | "panic" | "fatal" => "error",
            level => level,
        }
    }
}

/// Parses a duration made of `<number><unit>` parts, units `h`, `m`, `s` and `ms`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let mut consumed = 0;
    let mut seconds = 0.0;
    for part in RE_DURATION_PART.captures_iter(value) {
        let whole = part.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let amount: f64 = part[1].parse().ok()?;
        seconds += match &part[2] {
            "h" => amount * 3600.0,
            "m" => amount * 60.0,
            "s" => amount,
            _ => amount / 1000.0,
        };
    }
    (consumed > 0 && consumed == value.len()).then(|| Duration::from_secs_f64(seconds))
}

fn deserialize_run_delay<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RunDelay {
        Seconds(u64),
        Text(String),
    }

    match RunDelay::deserialize(deserializer)? {
        RunDelay::Seconds(seconds) => Ok(Duration::from_secs(seconds)),
        RunDelay::Text(text) => parse_duration(&text).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid run_delay '{}'", text))
        }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// Defaults to the database name.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionConfig>,
    #[serde(default)]
    pub state: State,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtensionConfig {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub state: State,
}

/// How a user authenticates, which decides what gets declared for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "auth")]
pub enum UserAuth {
    /// The user entry names a directory group that is expanded into roles.
    #[serde(rename = "ldap-group")]
    LdapGroup {
        #[serde(default)]
        ldapbasedn: Option<String>,
        #[serde(default)]
        ldapfilter: Option<String>,
    },
    #[serde(rename = "ldap-user")]
    LdapUser,
    #[serde(rename = "clientcert")]
    ClientCert,
    #[serde(rename = "password")]
    Password {
        #[serde(default)]
        password: Option<Credential>,
        #[serde(default)]
        expiry: Option<DateTime<Utc>>,
    },
    #[serde(rename = "md5")]
    Md5 {
        #[serde(default)]
        password: Option<Credential>,
        #[serde(default)]
        expiry: Option<DateTime<Utc>>,
    },
}

impl UserAuth {
    pub fn name(&self) -> &'static str {
        match self {
            UserAuth::LdapGroup { .. } => "ldap-group",
            UserAuth::LdapUser => "ldap-user",
            UserAuth::ClientCert => "clientcert",
            UserAuth::Password { .. } => "password",
            UserAuth::Md5 { .. } => "md5",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    #[serde(flatten)]
    pub auth: UserAuth,
    #[serde(default)]
    pub memberof: Vec<String>,
    /// Roles this user must not be a member of.
    #[serde(default)]
    pub not_memberof: Vec<String>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub state: State,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub options: Vec<String>,
    /// Roles granted to this role.
    #[serde(default)]
    pub member: Vec<String>,
    /// Roles that must not be granted to this role.
    #[serde(default)]
    pub not_member: Vec<String>,
    #[serde(default)]
    pub state: State,
}
