//! Builder patterns for creating desired-state documents programmatically.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use pgfga::config::{DatabaseConfig, Document, ExtensionConfig, RoleConfig, UserAuth, UserConfig};
use pgfga::ldap::DirectoryConfig;
use pgfga::pg::{Conventions, State, StrictOptions};
use pgfga::Credential;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Builder for creating `Document` instances.
#[derive(Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self, strict: StrictOptions) -> Self {
        self.document.strict = strict;
        self
    }

    pub fn conventions(mut self, conventions: Conventions) -> Self {
        self.document.conventions = conventions;
        self
    }

    /// Adds an `ldap` section pointing at a local server.
    pub fn ldap(mut self) -> Self {
        self.document.ldap = Some(DirectoryConfig {
            servers: vec!["ldap://localhost".to_string()],
            ..DirectoryConfig::default()
        });
        self
    }

    pub fn role(mut self, name: &str, options: &[&str], member: &[&str], state: State) -> Self {
        self.document.roles.insert(
            name.to_string(),
            RoleConfig {
                options: strings(options),
                member: strings(member),
                not_member: Vec::new(),
                state,
            },
        );
        self
    }

    pub fn revoke_role(mut self, name: &str, not_member: &[&str]) -> Self {
        let role = self.document.roles.entry(name.to_string()).or_default();
        role.not_member.extend(strings(not_member));
        self
    }

    fn user(mut self, name: &str, auth: UserAuth, memberof: &[&str], state: State) -> Self {
        self.document.users.insert(
            name.to_string(),
            UserConfig {
                auth,
                memberof: strings(memberof),
                not_memberof: Vec::new(),
                options: Vec::new(),
                state,
            },
        );
        self
    }

    pub fn password_user(
        self,
        name: &str,
        password: &str,
        expiry: Option<DateTime<Utc>>,
        memberof: &[&str],
    ) -> Self {
        let auth = UserAuth::Password {
            password: Some(Credential::literal(password)),
            expiry,
        };
        self.user(name, auth, memberof, State::Present)
    }

    pub fn ldap_user(self, name: &str, memberof: &[&str], state: State) -> Self {
        self.user(name, UserAuth::LdapUser, memberof, state)
    }

    pub fn ldap_group(self, name: &str, base_dn: &str, state: State) -> Self {
        let auth = UserAuth::LdapGroup {
            ldapbasedn: Some(base_dn.to_string()),
            ldapfilter: Some("(objectClass=posixGroup)".to_string()),
        };
        self.user(name, auth, &[], state)
    }

    pub fn database(mut self, name: &str, owner: &str, state: State) -> Self {
        self.document.databases.insert(
            name.to_string(),
            DatabaseConfig {
                owner: Some(owner.to_string()),
                extensions: Default::default(),
                state,
            },
        );
        self
    }

    pub fn extension(
        mut self,
        database: &str,
        name: &str,
        schema: Option<&str>,
        version: Option<&str>,
        state: State,
    ) -> Self {
        let db = self
            .document
            .databases
            .entry(database.to_string())
            .or_default();
        db.extensions.insert(
            name.to_string(),
            ExtensionConfig {
                schema: schema.map(str::to_string),
                version: version.map(str::to_string),
                state,
            },
        );
        self
    }

    pub fn slot(mut self, name: &str) -> Self {
        self.document.replication_slots.push(name.to_string());
        self
    }

    pub fn build(self) -> Document {
        self.document
    }
}

/// Strict mode for every object kind.
pub fn strict_all() -> StrictOptions {
    StrictOptions::all()
}
