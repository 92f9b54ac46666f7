//! Shared test utilities for pgfga integration tests.
//!
//! This module provides:
//! - `MemoryCluster`, an in-memory catalog that answers the reconcilers' queries
//! - `ScriptedDirectory`, a directory with canned search results
//! - Builders for desired-state documents

pub mod builders;
pub mod catalog;
pub mod directory;

pub use builders::*;
pub use catalog::{CatalogState, MemoryCluster};
pub use directory::ScriptedDirectory;

use pgfga::ldap::MembershipResolver;
use pgfga::{Document, Orchestrator, Planner, Registry};
use tracing::Span;

/// Plans a document, resolving directory groups against `directory`.
#[allow(dead_code)]
pub async fn plan(document: &Document, directory: Option<ScriptedDirectory>) -> Registry {
    try_plan(document, directory)
        .await
        .expect("document should plan")
}

#[allow(dead_code)]
pub async fn try_plan(
    document: &Document,
    directory: Option<ScriptedDirectory>,
) -> pgfga::Result<Registry> {
    let resolver = directory.map(|d| MembershipResolver::new(d, Span::none()));
    Planner::new(document, resolver, Span::none())
        .registry()
        .await
}

/// Orchestrator over `cluster` for a planned document.
#[allow(dead_code)]
pub fn orchestrator(
    registry: Registry,
    document: &Document,
    cluster: &MemoryCluster,
) -> Orchestrator<MemoryCluster> {
    Orchestrator::new(
        registry,
        document.strict,
        document.conventions.clone(),
        cluster.clone(),
        Span::none(),
    )
}
