//! Expands a directory group into flat membership rows.

use tracing::{debug, Instrument, Span};

use super::directory::DirectorySearch;
use super::error::DirectoryError;
use super::member::{MemberGraph, MemberKind};
use super::membership::{membership_tree, Membership};

const MEMBER_ATTRIBUTE: &str = "memberUid";
const SEARCH_ATTRIBUTES: [&str; 3] = ["dn", "cn", MEMBER_ATTRIBUTE];

/// Result of resolving one base group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    /// Short name of the base group, taken from its DN.
    pub name: String,
    pub memberships: Vec<Membership>,
}

/// Turns subtree searches into memberships. Each query gets its own graph.
pub struct MembershipResolver<D: DirectorySearch> {
    directory: D,
    span: Span,
}

impl<D: DirectorySearch> MembershipResolver<D> {
    pub fn new(directory: D, span: Span) -> Self {
        Self { directory, span }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Searches `base_dn` with `filter`.
    ///
    /// Every entry found becomes a child of the base group and every
    /// `memberUid` of an entry becomes a user below that entry.
    pub async fn resolve(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<ResolvedGroup, DirectoryError> {
        let span = self.span.clone();
        async {
            let entries = self
                .directory
                .search(base_dn, filter, &SEARCH_ATTRIBUTES)
                .await?;

            let mut graph = MemberGraph::new();
            let base = graph.get_or_insert(base_dn)?;
            for entry in &entries {
                let group = graph.get_or_insert(&entry.dn)?;
                graph.add_parent(group, base);
                for uid in entry.values(MEMBER_ATTRIBUTE) {
                    let member = graph.get_or_insert(uid)?;
                    graph.add_parent(member, group);
                    graph.set_kind(member, MemberKind::User)?;
                    debug!(member = %uid, group = %graph.get(group).name(), "Found member");
                }
            }

            let memberships = membership_tree(&graph, base)?;
            debug!(
                base = %base_dn,
                members = graph.len(),
                memberships = memberships.len(),
                "Resolved group"
            );
            Ok(ResolvedGroup {
                name: graph.get(base).name().to_string(),
                memberships,
            })
        }
        .instrument(span)
        .await
    }
}
