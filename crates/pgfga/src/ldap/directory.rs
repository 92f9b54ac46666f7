//! The directory search seam and its ldap3 implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use ldap3::{DerefAliases, Ldap, LdapConnAsync, Scope, SearchEntry, SearchOptions};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::config::DirectoryConfig;
use super::error::DirectoryError;

/// One search result entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_values(mut self, attribute: &str, values: &[&str]) -> Self {
        self.attributes.insert(
            attribute.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    /// Values of an attribute. Attribute names are case-insensitive.
    pub fn values(&self, attribute: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }
}

/// Subtree search against a directory.
#[async_trait]
pub trait DirectorySearch: Send {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// ldap3-backed directory. Connects on first search and keeps the session.
pub struct LdapDirectory {
    config: DirectoryConfig,
    ldap: Option<Ldap>,
}

impl LdapDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config, ldap: None }
    }

    /// Tries every server for the configured number of rounds.
    ///
    /// An unreachable server moves on to the next one. A failed bind or an
    /// unresolvable credential is returned immediately.
    async fn connect(&mut self) -> Result<Ldap, DirectoryError> {
        if let Some(ldap) = &self.ldap {
            return Ok(ldap.clone());
        }
        for round in 1..=self.config.rounds() {
            for server in &self.config.servers {
                debug!(server = %server, round, "Connecting to LDAP server");
                let (conn, mut ldap) = match LdapConnAsync::new(server).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(server = %server, error = %e, "LDAP server unavailable");
                        continue;
                    }
                };
                tokio::spawn(async move {
                    if let Err(e) = conn.drive().await {
                        warn!(error = %e, "LDAP connection driver error");
                    }
                });

                let user = match &self.config.user {
                    Some(credential) => credential.resolve()?,
                    None => "".into(),
                };
                let password = match &self.config.password {
                    Some(credential) => credential.resolve()?,
                    None => "".into(),
                };
                ldap.simple_bind(user.expose_secret(), password.expose_secret())
                    .await
                    .and_then(|result| result.success())
                    .map_err(|e| DirectoryError::Bind {
                        server: server.clone(),
                        message: e.to_string(),
                    })?;

                info!(server = %server, "Connected to LDAP server");
                self.ldap = Some(ldap.clone());
                return Ok(ldap);
            }
        }
        Err(DirectoryError::Unavailable {
            servers: self.config.servers.clone(),
        })
    }
}

#[async_trait]
impl DirectorySearch for LdapDirectory {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let mut ldap = self.connect().await?;
        let search_error = |e: ldap3::LdapError| DirectoryError::Search {
            base: base_dn.to_string(),
            message: e.to_string(),
        };

        let (entries, _result) = ldap
            .with_search_options(SearchOptions::new().deref(DerefAliases::Always))
            .search(base_dn, Scope::Subtree, filter, attributes.to_vec())
            .await
            .map_err(search_error)?
            .success()
            .map_err(search_error)?;

        debug!(base = %base_dn, filter = %filter, count = entries.len(), "LDAP search done");
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }
}
