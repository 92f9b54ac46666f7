//! Role membership reconciler.

use serde::Serialize;
use tracing::{debug, info};

use super::catalog;
use super::conn::{Cluster, Connector, SqlExecutor};
use super::quote::identifier;
use super::state::State;
use crate::error::Result;

/// `granted` is granted to `grantee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub grantee: String,
    pub granted: String,
    pub state: State,
}

impl Grant {
    pub fn new(grantee: impl Into<String>, granted: impl Into<String>, state: State) -> Self {
        Self {
            grantee: grantee.into(),
            granted: granted.into(),
            state,
        }
    }

    /// Registry key.
    pub fn key(&self) -> (String, String) {
        (self.grantee.clone(), self.granted.clone())
    }

    pub async fn converge<C: Connector>(&self, cluster: &mut Cluster<C>) -> Result<()> {
        if !self.state.is_present() {
            return Ok(());
        }
        let conn = cluster.primary();
        if conn
            .exists(catalog::GRANT_EXISTS, &[&self.granted, &self.grantee])
            .await?
        {
            debug!(grantee = %self.grantee, granted = %self.granted, "Role already granted");
            return Ok(());
        }
        conn.exec(
            &format!(
                "GRANT {} TO {}",
                identifier(&self.granted),
                identifier(&self.grantee)
            ),
            &[],
        )
        .await?;
        info!(grantee = %self.grantee, granted = %self.granted, "Granted role");
        Ok(())
    }

    /// Revokes a grant declared Absent. Grants to the connecting user are kept.
    pub async fn prune<C: Connector>(&self, cluster: &mut Cluster<C>) -> Result<()> {
        if !self.state.is_absent() {
            return Ok(());
        }
        let conn = cluster.primary();
        if !conn
            .exists(catalog::GRANT_REVOCABLE, &[&self.granted, &self.grantee])
            .await?
        {
            debug!(grantee = %self.grantee, granted = %self.granted, "Nothing to revoke");
            return Ok(());
        }
        conn.exec(
            &format!(
                "REVOKE {} FROM {}",
                identifier(&self.granted),
                identifier(&self.grantee)
            ),
            &[],
        )
        .await?;
        info!(grantee = %self.grantee, granted = %self.granted, "Revoked role");
        Ok(())
    }
}
