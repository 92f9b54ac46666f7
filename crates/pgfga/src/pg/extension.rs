//! Extension reconciler. Runs on a connection bound to the owning database.

use serde::Serialize;
use tracing::{debug, info};

use super::catalog;
use super::conn::SqlExecutor;
use super::policy::StrictOptions;
use super::quote::{identifier, literal};
use super::state::State;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub state: State,
}

impl Extension {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            version: None,
            state: State::Present,
        }
    }

    /// Creates, updates or drops the extension in the executor's database.
    pub async fn reconcile<E: SqlExecutor + ?Sized>(
        &self,
        conn: &mut E,
        strict: &StrictOptions,
    ) -> Result<()> {
        match self.state {
            State::Present => self.converge(conn).await,
            State::Absent => self.drop_if_strict(conn, strict).await,
            State::Allowed => Ok(()),
        }
    }

    async fn converge<E: SqlExecutor + ?Sized>(&self, conn: &mut E) -> Result<()> {
        let database = conn.database().to_string();
        let name = identifier(&self.name);

        if !conn.exists(catalog::EXTENSION_AVAILABLE, &[&self.name]).await? {
            return Err(ConfigError::ExtensionUnavailable {
                database,
                extension: self.name.clone(),
            }
            .into());
        }
        if let Some(version) = &self.version {
            if !conn
                .exists(catalog::EXTENSION_VERSION_AVAILABLE, &[&self.name, version])
                .await?
            {
                return Err(ConfigError::ExtensionVersionUnavailable {
                    database,
                    extension: self.name.clone(),
                    version: version.clone(),
                }
                .into());
            }
        }

        if !conn.exists(catalog::EXTENSION_INSTALLED, &[&self.name]).await? {
            let mut create = format!("CREATE EXTENSION IF NOT EXISTS {}", name);
            if let Some(schema) = &self.schema {
                create.push_str(&format!(" SCHEMA {}", identifier(schema)));
            }
            if let Some(version) = &self.version {
                create.push_str(&format!(" VERSION {}", literal(version)));
            }
            conn.exec(&create, &[]).await?;
            info!(database = %database, extension = %self.name, "Created extension");
            return Ok(());
        }

        if let Some(schema) = &self.schema {
            let current = conn.scalar(catalog::EXTENSION_SCHEMA, &[&self.name]).await?;
            if &current != schema {
                conn.exec(
                    &format!("ALTER EXTENSION {} SET SCHEMA {}", name, identifier(schema)),
                    &[],
                )
                .await?;
                info!(database = %database, extension = %self.name, from = %current, to = %schema, "Moved extension");
            }
        }
        if let Some(version) = &self.version {
            let current = conn.scalar(catalog::EXTENSION_VERSION, &[&self.name]).await?;
            if &current != version {
                conn.exec(
                    &format!("ALTER EXTENSION {} UPDATE TO {}", name, literal(version)),
                    &[],
                )
                .await?;
                info!(database = %database, extension = %self.name, from = %current, to = %version, "Updated extension");
            }
        }
        debug!(database = %database, extension = %self.name, "Extension converged");
        Ok(())
    }

    async fn drop_if_strict<E: SqlExecutor + ?Sized>(
        &self,
        conn: &mut E,
        strict: &StrictOptions,
    ) -> Result<()> {
        if !strict.extensions {
            info!(database = %conn.database(), extension = %self.name, "Not dropping extension, strict mode for extensions is off");
            return Ok(());
        }
        if conn.exists(catalog::EXTENSION_INSTALLED, &[&self.name]).await? {
            conn.exec(&format!("DROP EXTENSION {}", identifier(&self.name)), &[])
                .await?;
            info!(database = %conn.database(), extension = %self.name, "Dropped extension");
        }
        Ok(())
    }
}
