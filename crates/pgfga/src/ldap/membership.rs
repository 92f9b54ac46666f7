//! Flattening a member graph into membership rows.

use serde::Serialize;

use super::error::DirectoryError;
use super::member::{MemberGraph, MemberId, MemberKind};

/// `member` is a direct member of `member_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub member: String,
    pub member_kind: MemberKind,
    pub member_of: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    Unvisited,
    OnPath,
    Done,
}

/// Depth-first, pre-order walk from `root`.
///
/// Every reachable parent/child edge yields one row and every member is
/// expanded once. Reaching a member that is still on the current path is a
/// cycle.
pub fn membership_tree(
    graph: &MemberGraph,
    root: MemberId,
) -> Result<Vec<Membership>, DirectoryError> {
    let mut walk = Walk {
        graph,
        colours: vec![Colour::Unvisited; graph.len()],
        path: Vec::new(),
        rows: Vec::new(),
    };
    walk.visit(root)?;
    Ok(walk.rows)
}

struct Walk<'a> {
    graph: &'a MemberGraph,
    colours: Vec<Colour>,
    path: Vec<MemberId>,
    rows: Vec<Membership>,
}

impl Walk<'_> {
    fn colour(&self, id: MemberId) -> Colour {
        self.colours[id.index()]
    }

    fn visit(&mut self, id: MemberId) -> Result<(), DirectoryError> {
        self.colours[id.index()] = Colour::OnPath;
        self.path.push(id);

        let graph = self.graph;
        let parent = graph.get(id);
        for &child in parent.children() {
            if self.colour(child) == Colour::OnPath {
                let mut path: Vec<String> = self
                    .path
                    .iter()
                    .map(|&p| graph.get(p).name().to_string())
                    .collect();
                path.push(graph.get(child).name().to_string());
                return Err(DirectoryError::Cycle { path });
            }
            let member = graph.get(child);
            self.rows.push(Membership {
                member: member.name().to_string(),
                member_kind: member.kind(),
                member_of: parent.name().to_string(),
            });
            if self.colour(child) == Colour::Unvisited {
                self.visit(child)?;
            }
        }

        self.path.pop();
        self.colours[id.index()] = Colour::Done;
        Ok(())
    }
}
