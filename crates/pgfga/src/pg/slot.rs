//! Physical replication slot reconciler.

use serde::Serialize;
use tracing::{debug, info};

use super::catalog;
use super::conn::{Cluster, Connector, SqlExecutor};
use super::policy::StrictOptions;
use super::state::State;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationSlot {
    pub name: String,
    pub state: State,
}

impl ReplicationSlot {
    pub fn new(name: impl Into<String>, state: State) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    pub async fn converge<C: Connector>(&self, cluster: &mut Cluster<C>) -> Result<()> {
        if !self.state.is_present() {
            return Ok(());
        }
        let conn = cluster.primary();
        if conn.exists(catalog::SLOT_EXISTS, &[&self.name]).await? {
            debug!(slot = %self.name, "Replication slot exists");
            return Ok(());
        }
        conn.exec(catalog::SLOT_CREATE, &[&self.name]).await?;
        info!(slot = %self.name, "Created replication slot");
        Ok(())
    }

    pub async fn prune<C: Connector>(
        &self,
        cluster: &mut Cluster<C>,
        strict: &StrictOptions,
    ) -> Result<()> {
        if !self.state.is_absent() {
            return Ok(());
        }
        if !strict.slots {
            info!(slot = %self.name, "Not dropping replication slot, strict mode for replication slots is off");
            return Ok(());
        }
        let conn = cluster.primary();
        if conn.exists(catalog::SLOT_EXISTS, &[&self.name]).await? {
            conn.exec(catalog::SLOT_DROP, &[&self.name]).await?;
            info!(slot = %self.name, "Dropped replication slot");
        }
        Ok(())
    }
}
