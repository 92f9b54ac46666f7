//! Role reconciler.

use chrono::{DateTime, SecondsFormat, Utc};
use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use super::catalog;
use super::conn::{Cluster, Connector, SqlExecutor};
use super::option::{Capability, RoleOptionMap};
use super::policy::{Conventions, StrictOptions};
use super::quote::{identifier, literal};
use super::state::State;
use crate::error::Result;

const MD5_PREFIX: &str = "md5";
const MD5_PASSWORD_LEN: usize = 35;

/// A database role and the attributes this tool manages on it.
#[derive(Debug, Serialize)]
pub struct Role {
    pub name: String,
    pub options: RoleOptionMap,
    pub state: State,
    #[serde(skip)]
    password: Option<SecretString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Clone for Role {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            options: self.options.clone(),
            state: self.state,
            password: self
                .password
                .as_ref()
                .map(|p| SecretString::from(p.expose_secret().to_string())),
            expiry: self.expiry,
        }
    }
}

impl Role {
    pub fn new(name: impl Into<String>, options: RoleOptionMap, state: State) -> Self {
        Self {
            name: name.into(),
            options,
            state,
            password: None,
            expiry: None,
        }
    }

    pub fn set_password(&mut self, password: SecretString) {
        self.password = Some(password);
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn set_expiry(&mut self, expiry: DateTime<Utc>) {
        self.expiry = Some(expiry);
    }

    /// Folds a later declaration of the same role into this one.
    ///
    /// Options merge per capability with `later` winning; a password or
    /// expiry given by `later` replaces ours. States are merged by the caller.
    pub fn merge_attributes(&mut self, later: Role) {
        self.options = self.options.merge_absolute(&later.options);
        if later.password.is_some() {
            self.password = later.password;
        }
        if later.expiry.is_some() {
            self.expiry = later.expiry;
        }
    }

    /// The declared password in the form `pg_shadow` stores it.
    ///
    /// Passwords already given as an md5 hash are used as is.
    pub fn canonical_password(&self) -> Option<String> {
        self.password
            .as_ref()
            .map(|p| md5_password(&self.name, p.expose_secret()))
    }

    /// Brings an existing or missing role in line with this declaration.
    pub async fn converge<C: Connector>(&self, cluster: &mut Cluster<C>) -> Result<()> {
        if !self.state.is_present() {
            return Ok(());
        }
        let conn = cluster.primary();
        let name = identifier(&self.name);

        if conn.exists(catalog::ROLE_EXISTS, &[&self.name]).await? {
            debug!(role = %self.name, "Role exists");
        } else {
            conn.exec(&format!("CREATE ROLE {}", name), &[]).await?;
            info!(role = %self.name, "Created role");
        }

        for option in self.options.options() {
            let check = catalog::role_option_matches(&option);
            if conn.exists(&check, &[&self.name]).await? {
                continue;
            }
            conn.exec(
                &format!("ALTER ROLE {} WITH {}", name, option.sql_clause()),
                &[],
            )
            .await?;
            info!(role = %self.name, option = %option, "Altered role option");
        }

        self.converge_password(conn).await?;
        self.converge_expiry(conn).await?;
        Ok(())
    }

    async fn converge_password<E: SqlExecutor + ?Sized>(&self, conn: &mut E) -> Result<()> {
        let name = identifier(&self.name);
        let canonical = self
            .canonical_password()
            .filter(|_| self.options.is_enabled(Capability::Login));

        match canonical {
            Some(password) => {
                if conn
                    .exists(catalog::ROLE_PASSWORD_DIFFERS, &[&self.name, &password])
                    .await?
                {
                    conn.exec(
                        &format!(
                            "ALTER ROLE {} WITH ENCRYPTED PASSWORD {}",
                            name,
                            literal(&password)
                        ),
                        &[],
                    )
                    .await?;
                    info!(role = %self.name, "Set password");
                }
            }
            None if conn.user() == self.name => {
                debug!(role = %self.name, "Keeping the password of the connecting user");
            }
            None => {
                if conn.exists(catalog::ROLE_HAS_PASSWORD, &[&self.name]).await? {
                    conn.exec(&format!("ALTER ROLE {} WITH PASSWORD NULL", name), &[])
                        .await?;
                    info!(role = %self.name, "Cleared password");
                }
            }
        }
        Ok(())
    }

    async fn converge_expiry<E: SqlExecutor + ?Sized>(&self, conn: &mut E) -> Result<()> {
        let name = identifier(&self.name);
        match &self.expiry {
            Some(expiry) => {
                let expiry = expiry.to_rfc3339_opts(SecondsFormat::Secs, true);
                if conn
                    .exists(catalog::ROLE_EXPIRY_DIFFERS, &[&self.name, &expiry])
                    .await?
                {
                    conn.exec(
                        &format!("ALTER ROLE {} VALID UNTIL {}", name, literal(&expiry)),
                        &[],
                    )
                    .await?;
                    info!(role = %self.name, expiry = %expiry, "Set expiry");
                }
            }
            None => {
                if conn.exists(catalog::ROLE_HAS_EXPIRY, &[&self.name]).await? {
                    conn.exec(&format!("ALTER ROLE {} VALID UNTIL 'infinity'", name), &[])
                        .await?;
                    info!(role = %self.name, "Reset expiry");
                }
            }
        }
        Ok(())
    }

    /// Drops a role declared Absent, handing its objects to the fallback owner.
    pub async fn prune<C: Connector>(
        &self,
        cluster: &mut Cluster<C>,
        strict: &StrictOptions,
        conventions: &Conventions,
    ) -> Result<()> {
        if !self.state.is_absent() {
            return Ok(());
        }
        if !strict.users {
            info!(role = %self.name, "Not dropping role, strict mode for users is off");
            return Ok(());
        }
        let primary = cluster.primary();
        if !primary.exists(catalog::ROLE_DROPPABLE, &[&self.name]).await? {
            debug!(role = %self.name, "Role already absent or is the current user");
            return Ok(());
        }

        let owned = primary
            .column(catalog::DATABASES_OWNED_BY, &[&self.name])
            .await?;
        let fallback = conventions
            .fallback_owner
            .as_deref()
            .map(identifier)
            .unwrap_or_else(|| "CURRENT_USER".to_string());
        let reassign = format!(
            "REASSIGN OWNED BY {} TO {}",
            identifier(&self.name),
            fallback
        );
        for database in &owned {
            cluster.database(database).exec(&reassign, &[]).await?;
            info!(role = %self.name, database = %database, "Reassigned owned objects");
        }

        cluster
            .primary()
            .exec(&format!("DROP ROLE {}", identifier(&self.name)), &[])
            .await?;
        info!(role = %self.name, "Dropped role");
        Ok(())
    }
}

/// `"md5" + hex(md5(password ++ rolename))`, unless already in that form.
pub fn md5_password(role: &str, password: &str) -> String {
    if is_md5_hash(password) {
        return password.to_string();
    }
    let digest = Md5::digest(format!("{}{}", password, role).as_bytes());
    format!("{}{}", MD5_PREFIX, hex::encode(digest))
}

fn is_md5_hash(value: &str) -> bool {
    value.len() == MD5_PASSWORD_LEN
        && value.starts_with(MD5_PREFIX)
        && value[MD5_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit())
}
