//! Role capability options and their signed/absolute forms.
//!
//! A [`RoleOption`] is one capability token as written in the desired-state
//! document (`LOGIN`, `NOSUPERUSER`, ...). A [`RoleOptionMap`] keeps one
//! entry per absolute capability, so `LOGIN` and `NOLOGIN` always collapse
//! into a single key.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ConfigError;

/// Prefix that turns a capability into its negated form.
const NEGATION_PREFIX: &str = "NO";

/// The closed set of role capabilities this tool knows how to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    SuperUser,
    Login,
    CreateRole,
    CreateDb,
    Inherit,
    Replication,
    BypassRls,
}

impl Capability {
    /// Returns all capabilities.
    pub fn all() -> &'static [Capability] {
        &[
            Capability::SuperUser,
            Capability::Login,
            Capability::CreateRole,
            Capability::CreateDb,
            Capability::Inherit,
            Capability::Replication,
            Capability::BypassRls,
        ]
    }

    /// Keyword used in `CREATE ROLE` / `ALTER ROLE` clauses.
    pub fn keyword(&self) -> &'static str {
        match self {
            Capability::SuperUser => "SUPERUSER",
            Capability::Login => "LOGIN",
            Capability::CreateRole => "CREATEROLE",
            Capability::CreateDb => "CREATEDB",
            Capability::Inherit => "INHERIT",
            Capability::Replication => "REPLICATION",
            Capability::BypassRls => "BYPASSRLS",
        }
    }

    /// Boolean column in `pg_roles` holding this capability.
    ///
    /// Every new capability must be added here explicitly; the column names
    /// do not follow a single rule (`rolsuper`, `rolcanlogin`).
    pub fn catalog_column(&self) -> &'static str {
        match self {
            Capability::SuperUser => "rolsuper",
            Capability::Login => "rolcanlogin",
            Capability::CreateRole => "rolcreaterole",
            Capability::CreateDb => "rolcreatedb",
            Capability::Inherit => "rolinherit",
            Capability::Replication => "rolreplication",
            Capability::BypassRls => "rolbypassrls",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Capability> {
        Capability::all()
            .iter()
            .copied()
            .find(|c| c.keyword() == keyword)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A capability token, either in its plain form or negated with `NO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleOption {
    capability: Capability,
    negated: bool,
}

impl RoleOption {
    /// Creates the plain (enabled) form of a capability.
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            negated: false,
        }
    }

    /// Creates an option with an explicit enabled flag.
    pub fn with_enabled(capability: Capability, enabled: bool) -> Self {
        Self {
            capability,
            negated: !enabled,
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// True unless the option is negated.
    pub fn enabled(&self) -> bool {
        !self.negated
    }

    /// The unsigned identity of this option (`NOLOGIN` becomes `LOGIN`).
    pub fn absolute(&self) -> RoleOption {
        RoleOption::new(self.capability)
    }

    /// Toggles the negation.
    pub fn invert(&self) -> RoleOption {
        Self {
            capability: self.capability,
            negated: !self.negated,
        }
    }

    /// Predicate over `pg_roles` that holds when the role already matches.
    pub fn sql_predicate(&self) -> String {
        if self.negated {
            format!("NOT {}", self.capability.catalog_column())
        } else {
            self.capability.catalog_column().to_string()
        }
    }

    /// Clause for `ALTER ROLE ... WITH <clause>`.
    pub fn sql_clause(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RoleOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "{}{}", NEGATION_PREFIX, self.capability.keyword())
        } else {
            f.write_str(self.capability.keyword())
        }
    }
}

impl FromStr for RoleOption {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_uppercase();
        if let Some(capability) = Capability::from_keyword(&token) {
            return Ok(RoleOption::new(capability));
        }
        // NOINHERIT etc. Checked after the plain lookup so a capability that
        // itself started with NO would still resolve.
        if let Some(capability) = token
            .strip_prefix(NEGATION_PREFIX)
            .and_then(Capability::from_keyword)
        {
            return Ok(RoleOption::new(capability).invert());
        }
        Err(ConfigError::InvalidOption {
            option: s.to_string(),
        })
    }
}

impl Serialize for RoleOption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Validates a list of option tokens, returning them parsed.
pub fn parse_options<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<RoleOption>, ConfigError> {
    tokens.iter().map(|t| t.as_ref().parse()).collect()
}

/// Absolute capability → enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleOptionMap {
    entries: BTreeMap<Capability, bool>,
}

impl RoleOptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from one option list.
    ///
    /// A list naming both a capability and its negation cannot be stored and
    /// is rejected. Repeating the same token is fine.
    pub fn compose(options: &[RoleOption]) -> Result<Self, ConfigError> {
        let mut map = Self::new();
        for option in options {
            match map.entries.get(&option.capability()) {
                Some(&enabled) if enabled != option.enabled() => {
                    return Err(ConfigError::ContradictoryOptions {
                        option: option.absolute().to_string(),
                    });
                }
                _ => {
                    map.add(*option);
                }
            }
        }
        Ok(map)
    }

    /// Sets an option, replacing any earlier value for the same capability.
    pub fn add(&mut self, option: RoleOption) -> &mut Self {
        self.entries.insert(option.capability(), option.enabled());
        self
    }

    /// Absolute merge: every entry of `other` overrides the same capability here.
    pub fn merge_absolute(&self, other: &RoleOptionMap) -> RoleOptionMap {
        let mut merged = self.clone();
        for (capability, enabled) in &other.entries {
            merged.entries.insert(*capability, *enabled);
        }
        merged
    }

    /// True when the capability is present and enabled.
    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.entries.get(&capability).copied().unwrap_or(false)
    }

    /// Declared value for a capability, if any.
    pub fn get(&self, capability: Capability) -> Option<bool> {
        self.entries.get(&capability).copied()
    }

    /// Iterates the map as signed options, in capability order.
    pub fn options(&self) -> impl Iterator<Item = RoleOption> + '_ {
        self.entries
            .iter()
            .map(|(capability, enabled)| RoleOption::with_enabled(*capability, *enabled))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<RoleOption> for RoleOptionMap {
    fn from_iter<I: IntoIterator<Item = RoleOption>>(iter: I) -> Self {
        let mut map = RoleOptionMap::new();
        for option in iter {
            map.add(option);
        }
        map
    }
}

impl Serialize for RoleOptionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.options())
    }
}
