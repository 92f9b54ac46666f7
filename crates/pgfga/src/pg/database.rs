//! Database reconciler, including its extensions and read-only grants.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use super::catalog;
use super::conn::{Cluster, Connector, SqlExecutor};
use super::extension::Extension;
use super::policy::{Conventions, StrictOptions};
use super::quote::identifier;
use super::state::State;
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Database {
    pub name: String,
    pub owner: String,
    pub extensions: BTreeMap<String, Extension>,
    pub state: State,
}

impl Database {
    /// A database owned by the role of the same name.
    pub fn new(name: impl Into<String>, state: State) -> Self {
        let name = name.into();
        Self {
            owner: name.clone(),
            name,
            extensions: BTreeMap::new(),
            state,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn add_extension(&mut self, extension: Extension) {
        self.extensions.insert(extension.name.clone(), extension);
    }

    pub async fn converge<C: Connector>(
        &self,
        cluster: &mut Cluster<C>,
        strict: &StrictOptions,
        conventions: &Conventions,
    ) -> Result<()> {
        if !self.state.is_present() {
            return Ok(());
        }
        let name = identifier(&self.name);
        let primary = cluster.primary();

        if primary
            .exists(catalog::DATABASE_EXISTS, &[&self.name])
            .await?
        {
            debug!(database = %self.name, "Database exists");
        } else {
            primary
                .exec(&format!("CREATE DATABASE {}", name), &[])
                .await?;
            info!(database = %self.name, "Created database");
        }

        if !primary
            .exists(catalog::DATABASE_OWNED_BY, &[&self.name, &self.owner])
            .await?
        {
            if !primary.exists(catalog::ROLE_EXISTS, &[&self.owner]).await? {
                return Err(ConfigError::OwnerMissing {
                    database: self.name.clone(),
                    owner: self.owner.clone(),
                }
                .into());
            }
            primary
                .exec(
                    &format!("ALTER DATABASE {} OWNER TO {}", name, identifier(&self.owner)),
                    &[],
                )
                .await?;
            info!(database = %self.name, owner = %self.owner, "Changed database owner");
        }

        let conn = cluster.database(&self.name);
        for extension in self.extensions.values() {
            extension.reconcile(conn, strict).await?;
        }

        let readonly = conventions.readonly_role(&self.name);
        let schemas = conn
            .column(catalog::SCHEMAS_PENDING_SELECT, &[&readonly])
            .await?;
        for schema in schemas {
            conn.exec(
                &format!(
                    "GRANT SELECT ON ALL TABLES IN SCHEMA {} TO {}",
                    identifier(&schema),
                    identifier(&readonly)
                ),
                &[],
            )
            .await?;
            info!(database = %self.name, schema = %schema, role = %readonly, "Granted read-only access");
        }
        Ok(())
    }

    /// Drops a database declared Absent.
    ///
    /// The database the run is connected to cannot be dropped.
    pub async fn prune<C: Connector>(
        &self,
        cluster: &mut Cluster<C>,
        strict: &StrictOptions,
    ) -> Result<()> {
        if !self.state.is_absent() {
            return Ok(());
        }
        if !strict.databases {
            info!(database = %self.name, "Not dropping database, strict mode for databases is off");
            return Ok(());
        }
        if cluster.primary_database() == self.name {
            return Err(ConfigError::ProtectedDatabase {
                name: self.name.clone(),
            }
            .into());
        }
        cluster.release(&self.name).await?;

        let primary = cluster.primary();
        if !primary
            .exists(catalog::DATABASE_EXISTS, &[&self.name])
            .await?
        {
            debug!(database = %self.name, "Database already absent");
            return Ok(());
        }
        primary
            .exec(&format!("DROP DATABASE {}", identifier(&self.name)), &[])
            .await?;
        info!(database = %self.name, "Dropped database");
        Ok(())
    }
}
