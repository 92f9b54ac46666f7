//! Declarations collected from the document and the registry they merge into.
//!
//! Collection is append-only: the planner pushes every declaration as it
//! finds it, duplicates included. [`Declarations::resolve`] then merges
//! duplicates into one immutable [`Registry`], raising state conflicts
//! before any SQL runs.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::error::{ObjectKind, PgFgaError, Result};
use crate::pg::{Database, Grant, ReplicationSlot, Role, RoleOptionMap, State, StrictOptions};

#[derive(Debug, Default)]
pub struct Declarations {
    roles: Vec<Role>,
    grants: Vec<Grant>,
    databases: Vec<Database>,
    slots: Vec<ReplicationSlot>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn role(&mut self, role: Role) {
        self.roles.push(role);
    }

    /// Declares `granted` granted to `grantee`.
    pub fn grant(&mut self, grantee: &str, granted: &str, state: State) {
        self.grants.push(Grant::new(grantee, granted, state));
    }

    pub fn database(&mut self, database: Database) {
        self.databases.push(database);
    }

    pub fn slot(&mut self, slot: ReplicationSlot) {
        self.slots.push(slot);
    }

    /// Merges all declarations.
    ///
    /// Present grants declare both endpoint roles Present, Absent grants
    /// declare them Allowed.
    pub fn resolve(self, strict: &StrictOptions) -> Result<Registry> {
        let mut registry = Registry::default();

        for role in self.roles {
            registry.merge_role(role, strict)?;
        }

        for grant in self.grants {
            let endpoint_state = match grant.state {
                State::Present => State::Present,
                _ => State::Allowed,
            };
            for name in [&grant.grantee, &grant.granted] {
                registry.merge_role(
                    Role::new(name.as_str(), RoleOptionMap::new(), endpoint_state),
                    strict,
                )?;
            }
            registry.merge_grant(grant)?;
        }

        for database in self.databases {
            registry.merge_database(database)?;
        }

        for slot in self.slots {
            registry.merge_slot(slot)?;
        }

        Ok(registry)
    }
}

/// Merged desired state. Iteration order is by name.
#[derive(Debug, Default, Serialize)]
pub struct Registry {
    #[serde(serialize_with = "values")]
    roles: BTreeMap<String, Role>,
    #[serde(serialize_with = "values")]
    grants: BTreeMap<(String, String), Grant>,
    #[serde(serialize_with = "values")]
    databases: BTreeMap<String, Database>,
    #[serde(rename = "replication_slots", serialize_with = "values")]
    slots: BTreeMap<String, ReplicationSlot>,
}

fn values<K, V: Serialize, S: Serializer>(
    map: &BTreeMap<K, V>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(map.values())
}

fn conflict(kind: ObjectKind, name: String, existing: State, requested: State) -> PgFgaError {
    PgFgaError::StateConflict {
        kind,
        name,
        existing,
        requested,
    }
}

/// Equal states and Allowed merge freely. Present against Absent is a conflict.
fn merge_state(kind: ObjectKind, name: &str, existing: State, requested: State) -> Result<State> {
    if existing.conflicts_with(requested) {
        return Err(conflict(kind, name.to_string(), existing, requested));
    }
    Ok(existing.combine(requested))
}

impl Registry {
    fn merge_role(&mut self, role: Role, strict: &StrictOptions) -> Result<()> {
        match self.roles.entry(role.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(role);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.state = if existing.state.conflicts_with(role.state) {
                    // Without strict mode nothing would be dropped anyway.
                    if strict.users {
                        return Err(conflict(
                            ObjectKind::Role,
                            role.name.clone(),
                            existing.state,
                            role.state,
                        ));
                    }
                    State::Present
                } else {
                    existing.state.combine(role.state)
                };
                existing.merge_attributes(role);
            }
        }
        Ok(())
    }

    fn merge_grant(&mut self, grant: Grant) -> Result<()> {
        match self.grants.entry(grant.key()) {
            Entry::Vacant(slot) => {
                slot.insert(grant);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                let name = format!("{} -> {}", grant.grantee, grant.granted);
                existing.state =
                    merge_state(ObjectKind::Grant, &name, existing.state, grant.state)?;
            }
        }
        Ok(())
    }

    fn merge_database(&mut self, database: Database) -> Result<()> {
        match self.databases.entry(database.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(database);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.state = merge_state(
                    ObjectKind::Database,
                    &database.name,
                    existing.state,
                    database.state,
                )?;
                existing.owner = database.owner;
                existing.extensions.extend(database.extensions);
            }
        }
        Ok(())
    }

    fn merge_slot(&mut self, slot: ReplicationSlot) -> Result<()> {
        match self.slots.entry(slot.name.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(slot);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.state = merge_state(
                    ObjectKind::ReplicationSlot,
                    &slot.name,
                    existing.state,
                    slot.state,
                )?;
            }
        }
        Ok(())
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.values()
    }

    pub fn grant(&self, grantee: &str, granted: &str) -> Option<&Grant> {
        self.grants
            .get(&(grantee.to_string(), granted.to_string()))
    }

    pub fn databases(&self) -> impl Iterator<Item = &Database> {
        self.databases.values()
    }

    pub fn database(&self, name: &str) -> Option<&Database> {
        self.databases.get(name)
    }

    pub fn slots(&self) -> impl Iterator<Item = &ReplicationSlot> {
        self.slots.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pg::role::md5_password;
    use crate::pg::{Capability, RoleOption};
    use secrecy::SecretString;

    fn options(tokens: &[&str]) -> RoleOptionMap {
        tokens
            .iter()
            .map(|t| t.parse::<RoleOption>().unwrap())
            .collect()
    }

    #[test]
    fn test_role_options_merge_absolutely() {
        let mut declarations = Declarations::new();
        declarations.role(Role::new("app", options(&["LOGIN", "CREATEDB"]), State::Present));
        declarations.role(Role::new("app", options(&["NOLOGIN"]), State::Present));

        let registry = declarations.resolve(&StrictOptions::default()).unwrap();
        let role = registry.role("app").unwrap();
        assert_eq!(role.options.get(Capability::Login), Some(false));
        assert!(role.options.is_enabled(Capability::CreateDb));
    }

    #[test]
    fn test_role_password_and_expiry_later_wins() {
        let mut first = Role::new("svc", options(&["LOGIN"]), State::Present);
        first.set_password(SecretString::from("one"));
        let mut second = Role::new("svc", RoleOptionMap::new(), State::Present);
        second.set_password(SecretString::from("two"));
        let third = Role::new("svc", RoleOptionMap::new(), State::Allowed);

        let mut declarations = Declarations::new();
        declarations.role(first);
        declarations.role(second);
        declarations.role(third);
        let registry = declarations.resolve(&StrictOptions::default()).unwrap();

        let role = registry.role("svc").unwrap();
        assert_eq!(role.state, State::Present);
        assert_eq!(role.canonical_password(), Some(md5_password("svc", "two")));
    }

    #[test]
    fn test_role_present_absent_depends_on_strict() {
        let build = || {
            let mut declarations = Declarations::new();
            declarations.role(Role::new("old", RoleOptionMap::new(), State::Absent));
            declarations.role(Role::new("old", RoleOptionMap::new(), State::Present));
            declarations
        };

        let registry = build().resolve(&StrictOptions::default()).unwrap();
        assert_eq!(registry.role("old").unwrap().state, State::Present);

        let strict = StrictOptions {
            users: true,
            ..StrictOptions::default()
        };
        let result = build().resolve(&strict);
        assert!(matches!(
            result,
            Err(PgFgaError::StateConflict {
                kind: ObjectKind::Role,
                ..
            })
        ));
    }

    #[test]
    fn test_grant_conflict_is_raised() {
        let mut declarations = Declarations::new();
        declarations.grant("alice", "readers", State::Present);
        declarations.grant("alice", "readers", State::Absent);

        match declarations.resolve(&StrictOptions::default()) {
            Err(PgFgaError::StateConflict {
                kind,
                name,
                existing,
                requested,
            }) => {
                assert_eq!(kind, ObjectKind::Grant);
                assert_eq!(name, "alice -> readers");
                assert_eq!(existing, State::Present);
                assert_eq!(requested, State::Absent);
            }
            other => panic!("expected a conflict, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_grants_declare_endpoints() {
        let mut declarations = Declarations::new();
        declarations.grant("alice", "readers", State::Present);
        declarations.grant("bob", "admins", State::Absent);
        declarations.grant("bob", "admins", State::Allowed);
        let registry = declarations.resolve(&StrictOptions::all()).unwrap();

        assert_eq!(registry.role("alice").unwrap().state, State::Present);
        assert_eq!(registry.role("readers").unwrap().state, State::Present);
        assert_eq!(registry.role("bob").unwrap().state, State::Allowed);
        assert_eq!(registry.role("admins").unwrap().state, State::Allowed);
        assert_eq!(registry.grant("bob", "admins").unwrap().state, State::Absent);
        assert_eq!(registry.grants().count(), 2);
    }

    #[test]
    fn test_duplicate_grants_collapse() {
        let mut declarations = Declarations::new();
        declarations.grant("alice", "readers", State::Present);
        declarations.grant("alice", "readers", State::Present);
        let registry = declarations.resolve(&StrictOptions::default()).unwrap();
        assert_eq!(registry.grants().count(), 1);
    }

    #[test]
    fn test_registry_serializes_without_passwords() {
        let mut role = Role::new("svc", options(&["LOGIN"]), State::Present);
        role.set_password(SecretString::from("hunter2"));
        let mut declarations = Declarations::new();
        declarations.role(role);
        declarations.slot(ReplicationSlot::new("standby1", State::Present));
        let registry = declarations.resolve(&StrictOptions::default()).unwrap();

        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json["roles"][0]["name"], "svc");
        assert_eq!(json["roles"][0]["options"][0], "LOGIN");
        assert_eq!(json["replication_slots"][0]["state"], "Present");
        assert!(!json.to_string().contains("hunter2"));
    }
}
