//! Runs the reconcilers over a merged registry in dependency order.

use tracing::{info, Instrument, Span};

use crate::error::Result;
use crate::pg::{Cluster, Connector, Conventions, StrictOptions};
use crate::registry::Registry;

/// Applies a [`Registry`] to one cluster.
///
/// Converge creates before it alters: roles, then grants between them, then
/// databases (whose owners are roles) and their extensions, then slots.
/// Prune tears down in the opposite direction so that no role is dropped
/// while it still owns a database that is about to go.
pub struct Orchestrator<C: Connector> {
    registry: Registry,
    strict: StrictOptions,
    conventions: Conventions,
    cluster: Cluster<C>,
    span: Span,
}

impl<C: Connector> Orchestrator<C> {
    pub fn new(
        registry: Registry,
        strict: StrictOptions,
        conventions: Conventions,
        connector: C,
        span: Span,
    ) -> Self {
        Self {
            registry,
            strict,
            conventions,
            cluster: Cluster::new(connector),
            span,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cluster(&self) -> &Cluster<C> {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut Cluster<C> {
        &mut self.cluster
    }

    /// Creates and alters everything declared Present.
    pub async fn converge(&mut self) -> Result<()> {
        let span = self.span.clone();
        async {
            for role in self.registry.roles() {
                role.converge(&mut self.cluster).await?;
            }
            for grant in self.registry.grants() {
                grant.converge(&mut self.cluster).await?;
            }
            for database in self.registry.databases() {
                database
                    .converge(&mut self.cluster, &self.strict, &self.conventions)
                    .await?;
            }
            for slot in self.registry.slots() {
                slot.converge(&mut self.cluster).await?;
            }
            info!("Converge finished");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Removes everything declared Absent, as far as strict mode allows.
    pub async fn prune(&mut self) -> Result<()> {
        let span = self.span.clone();
        async {
            for database in self.registry.databases() {
                database.prune(&mut self.cluster, &self.strict).await?;
            }
            for grant in self.registry.grants() {
                grant.prune(&mut self.cluster).await?;
            }
            for role in self.registry.roles() {
                role.prune(&mut self.cluster, &self.strict, &self.conventions)
                    .await?;
            }
            for slot in self.registry.slots() {
                slot.prune(&mut self.cluster, &self.strict).await?;
            }
            info!("Prune finished");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Converge, then prune.
    pub async fn reconcile(&mut self) -> Result<()> {
        self.converge().await?;
        self.prune().await
    }
}
