//! Directory members and the graph they form.
//!
//! A member can be referenced three ways: by full DN
//! (`cn=eng,ou=groups,dc=example,dc=com`), by its first RDN pair (`cn=eng`)
//! or by short name (`eng`, as found in `memberUid`). The graph indexes all
//! three and upgrades a member's identity as more specific references
//! arrive.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::error::DirectoryError;

static ATTRIBUTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9-]*$").expect("Invalid attribute regex"));

/// Splits a DN on commas that are not escaped with a backslash.
fn split_rdns(id: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in id.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                rdns.push(&id[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    rdns.push(&id[start..]);
    rdns
}

/// Parses `id` as a DN or RDN pair into `(attribute, value)` pairs.
///
/// Whitespace around each RDN and around `=` is dropped and attribute names
/// are lowercased, so `CN=eng, dc=example` and `cn=eng,dc=example` are equal.
fn parse_rdns(id: &str) -> Option<Vec<(String, String)>> {
    split_rdns(id)
        .into_iter()
        .map(|rdn| {
            let (attribute, value) = rdn.split_once('=')?;
            let (attribute, value) = (attribute.trim(), value.trim());
            if !ATTRIBUTE_PATTERN.is_match(attribute) || value.is_empty() || value.contains('=') {
                return None;
            }
            Some((attribute.to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Group,
    User,
    Unknown,
}

impl MemberKind {
    /// Kind implied by the attribute of an RDN pair.
    fn from_attribute(attribute: &str) -> Self {
        match attribute.to_ascii_lowercase().as_str() {
            "cn" => MemberKind::Group,
            "uid" => MemberKind::User,
            _ => MemberKind::Unknown,
        }
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Group => write!(f, "group"),
            MemberKind::User => write!(f, "user"),
            MemberKind::Unknown => write!(f, "member of unknown kind"),
        }
    }
}

/// What a single reference tells about a member.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Identity {
    dn: Option<String>,
    pair: Option<String>,
    name: String,
    kind: MemberKind,
}

impl Identity {
    fn parse(id: &str) -> Self {
        let id = id.trim();
        let rdns = match parse_rdns(id) {
            Some(rdns) if !rdns.is_empty() => rdns,
            _ => {
                return Identity {
                    dn: None,
                    pair: None,
                    name: id.to_string(),
                    kind: MemberKind::Unknown,
                }
            }
        };
        let rendered: Vec<String> = rdns.iter().map(|(a, v)| format!("{}={}", a, v)).collect();
        let (attribute, name) = &rdns[0];
        Identity {
            dn: (rdns.len() > 1).then(|| rendered.join(",")),
            pair: Some(rendered[0].clone()),
            name: name.clone(),
            kind: MemberKind::from_attribute(attribute),
        }
    }
}

/// Short name of a DN, pair or name: `cn=eng,dc=example,dc=com` gives `eng`.
pub fn short_name(id: &str) -> String {
    Identity::parse(id).name
}

/// Index of a member within its [`MemberGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(usize);

impl MemberId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Member {
    dn: Option<String>,
    pair: Option<String>,
    name: String,
    kind: MemberKind,
    parents: Vec<MemberId>,
    children: Vec<MemberId>,
}

impl Member {
    fn new(identity: Identity) -> Self {
        Self {
            dn: identity.dn,
            pair: identity.pair,
            name: identity.name,
            kind: identity.kind,
            parents: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    pub fn pair(&self) -> Option<&str> {
        self.pair.as_deref()
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn parents(&self) -> &[MemberId] {
        &self.parents
    }

    pub fn children(&self) -> &[MemberId] {
        &self.children
    }

    fn conflict(&self, known: &str, given: &str) -> DirectoryError {
        DirectoryError::IdentityConflict {
            name: self.name.clone(),
            known: known.to_string(),
            given: given.to_string(),
        }
    }

    /// Merges a more specific reference into what is already known.
    fn upgrade(&mut self, identity: Identity) -> Result<(), DirectoryError> {
        if identity.name != self.name {
            return Err(self.conflict(&self.name, &identity.name));
        }
        // Attribute names and DNs compare case-insensitively.
        if let (Some(known), Some(given)) = (&self.pair, &identity.pair) {
            if !known.eq_ignore_ascii_case(given) {
                return Err(self.conflict(known, given));
            }
        }
        if let (Some(known), Some(given)) = (&self.dn, &identity.dn) {
            if !known.eq_ignore_ascii_case(given) {
                return Err(self.conflict(known, given));
            }
        }
        if self.pair.is_none() {
            self.pair = identity.pair;
        }
        if self.dn.is_none() {
            self.dn = identity.dn;
        }
        self.set_kind(identity.kind)
    }

    /// Unknown can become anything; a known kind never changes.
    fn set_kind(&mut self, kind: MemberKind) -> Result<(), DirectoryError> {
        if kind == MemberKind::Unknown || kind == self.kind {
            return Ok(());
        }
        if self.kind != MemberKind::Unknown {
            return Err(DirectoryError::KindConflict {
                name: self.name.clone(),
                known: self.kind.to_string(),
                given: kind.to_string(),
            });
        }
        self.kind = kind;
        Ok(())
    }
}

/// Arena of members connected by parent/child edges.
#[derive(Debug, Default)]
pub struct MemberGraph {
    members: Vec<Member>,
    by_dn: HashMap<String, MemberId>,
    by_pair: HashMap<String, MemberId>,
    by_name: HashMap<String, MemberId>,
}

impl MemberGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, id: MemberId) -> &Member {
        &self.members[id.0]
    }

    /// Looks a member up by DN, pair or short name.
    pub fn find(&self, id: &str) -> Option<MemberId> {
        let identity = Identity::parse(id);
        identity
            .dn
            .as_ref()
            .and_then(|dn| self.by_dn.get(dn))
            .or_else(|| identity.pair.as_ref().and_then(|p| self.by_pair.get(p)))
            .or_else(|| self.by_name.get(&identity.name))
            .copied()
    }

    /// Returns the member for a reference, adding or upgrading it as needed.
    pub fn get_or_insert(&mut self, id: &str) -> Result<MemberId, DirectoryError> {
        let identity = Identity::parse(id);
        let existing = self.find(id);
        let member_id = match existing {
            Some(member_id) => {
                self.members[member_id.0].upgrade(identity)?;
                member_id
            }
            None => {
                let member_id = MemberId(self.members.len());
                self.members.push(Member::new(identity));
                member_id
            }
        };
        self.index(member_id);
        Ok(member_id)
    }

    fn index(&mut self, id: MemberId) {
        let member = &self.members[id.0];
        if let Some(dn) = &member.dn {
            self.by_dn.insert(dn.clone(), id);
        }
        if let Some(pair) = &member.pair {
            self.by_pair.insert(pair.clone(), id);
        }
        self.by_name.insert(member.name.clone(), id);
    }

    /// Records `parent` as a parent of `child`. A member is never its own parent.
    pub fn add_parent(&mut self, child: MemberId, parent: MemberId) {
        if child == parent || self.members[child.0].parents.contains(&parent) {
            return;
        }
        self.members[child.0].parents.push(parent);
        self.members[parent.0].children.push(child);
    }

    pub fn set_kind(&mut self, id: MemberId, kind: MemberKind) -> Result<(), DirectoryError> {
        self.members[id.0].set_kind(kind)
    }
}
