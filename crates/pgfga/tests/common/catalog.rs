//! An in-memory PostgreSQL catalog.
//!
//! Reads are answered by matching the exact catalog queries the reconcilers
//! use. Writes are parsed from the DDL they issue and recorded, so tests can
//! assert on both the resulting catalog and the statements that produced it.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use pgfga::pg::catalog;
use pgfga::pg::{Capability, Connector, DatabaseError, RoleOption, SqlExecutor};

#[derive(Debug, Clone)]
pub struct RoleRow {
    pub options: BTreeMap<Capability, bool>,
    pub password: Option<String>,
    pub valid_until: Option<String>,
}

impl Default for RoleRow {
    fn default() -> Self {
        // INHERIT is the only capability a new role gets by default.
        let options = Capability::all()
            .iter()
            .map(|c| (*c, *c == Capability::Inherit))
            .collect();
        Self {
            options,
            password: None,
            valid_until: None,
        }
    }
}

impl RoleRow {
    pub fn has(&self, capability: Capability) -> bool {
        self.options.get(&capability).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct InstalledExtension {
    pub schema: String,
    pub version: String,
}

#[derive(Debug, Clone, Default)]
pub struct DatabaseRow {
    pub owner: String,
    pub extensions: BTreeMap<String, InstalledExtension>,
    /// (schema, table)
    pub tables: Vec<(String, String)>,
    /// (role, schema, table)
    pub select_grants: BTreeSet<(String, String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub database: String,
    pub statement: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CatalogState {
    pub current_user: String,
    pub roles: BTreeMap<String, RoleRow>,
    /// (granted, grantee)
    pub memberships: BTreeSet<(String, String)>,
    pub databases: BTreeMap<String, DatabaseRow>,
    /// Extension name to installable versions, the default first.
    pub available: BTreeMap<String, Vec<String>>,
    pub slots: BTreeSet<String>,
    pub executed: Vec<Executed>,
}

impl Default for CatalogState {
    fn default() -> Self {
        let mut superuser = RoleRow::default();
        superuser.options.insert(Capability::SuperUser, true);
        superuser.options.insert(Capability::Login, true);

        let mut available = BTreeMap::new();
        available.insert(
            "pgcrypto".to_string(),
            vec!["1.3".to_string(), "1.2".to_string()],
        );
        available.insert("pg_trgm".to_string(), vec!["1.6".to_string()]);

        Self {
            current_user: "postgres".to_string(),
            roles: BTreeMap::from([("postgres".to_string(), superuser)]),
            memberships: BTreeSet::new(),
            databases: BTreeMap::from([(
                "postgres".to_string(),
                DatabaseRow {
                    owner: "postgres".to_string(),
                    ..DatabaseRow::default()
                },
            )]),
            available,
            slots: BTreeSet::new(),
            executed: Vec::new(),
        }
    }
}

/// A cluster whose primary database is `postgres`, connected as `postgres`.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<CatalogState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().expect("catalog lock poisoned")
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .map(|e| e.statement.clone())
            .collect()
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.state().executed.clone()
    }

    pub fn clear_statements(&self) {
        self.state().executed.clear();
    }

    pub fn add_role(&self, name: &str) {
        self.state()
            .roles
            .insert(name.to_string(), RoleRow::default());
    }

    pub fn add_database(&self, name: &str, owner: &str) {
        self.state().databases.insert(
            name.to_string(),
            DatabaseRow {
                owner: owner.to_string(),
                ..DatabaseRow::default()
            },
        );
    }

    pub fn add_table(&self, database: &str, schema: &str, table: &str) {
        if let Some(db) = self.state().databases.get_mut(database) {
            db.tables.push((schema.to_string(), table.to_string()));
        }
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.state().roles.contains_key(name)
    }

    pub fn role(&self, name: &str) -> Option<RoleRow> {
        self.state().roles.get(name).cloned()
    }

    pub fn is_member(&self, grantee: &str, granted: &str) -> bool {
        self.state()
            .memberships
            .contains(&(granted.to_string(), grantee.to_string()))
    }

    pub fn database(&self, name: &str) -> Option<DatabaseRow> {
        self.state().databases.get(name).cloned()
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.state().slots.contains(name)
    }
}

impl Connector for MemoryCluster {
    type Conn = MemoryConn;

    fn primary(&self) -> MemoryConn {
        self.connect_to("postgres")
    }

    fn connect_to(&self, database: &str) -> MemoryConn {
        MemoryConn {
            state: Arc::clone(&self.state),
            database: database.to_string(),
            user: "postgres".to_string(),
            connected: false,
        }
    }
}

pub struct MemoryConn {
    state: Arc<Mutex<CatalogState>>,
    database: String,
    user: String,
    connected: bool,
}

fn arg<'a>(args: &[&'a str], index: usize) -> &'a str {
    args.get(index).copied().unwrap_or_default()
}

fn unsupported(statement: &str, message: &str) -> DatabaseError {
    DatabaseError::Query {
        statement: statement.to_string(),
        message: message.to_string(),
    }
}

/// Splits SQL into words, unquoting `"identifiers"` and `'literals'`.
fn tokenize(sql: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' || c == '\'' {
            chars.next();
            let mut token = String::new();
            while let Some(next) = chars.next() {
                if next == c {
                    if chars.peek() == Some(&c) {
                        chars.next();
                        token.push(c);
                        continue;
                    }
                    break;
                }
                token.push(next);
            }
            tokens.push(token);
            continue;
        }
        let mut token = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_whitespace() {
                break;
            }
            token.push(next);
            chars.next();
        }
        tokens.push(token);
    }
    tokens
}

/// Capability and polarity of a per-option check, if `query` is one.
fn option_check(query: &str) -> Option<(Capability, bool)> {
    let predicate = query.strip_prefix(catalog::ROLE_OPTION_PREFIX)?;
    let (column, negated) = match predicate.strip_prefix("NOT ") {
        Some(column) => (column, true),
        None => (predicate, false),
    };
    Capability::all()
        .iter()
        .copied()
        .find(|c| c.catalog_column() == column)
        .map(|c| (c, negated))
}

impl MemoryConn {
    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().expect("catalog lock poisoned")
    }

    fn query_exists(&self, query: &str, args: &[&str]) -> Result<bool, DatabaseError> {
        let state = self.lock();
        let (a0, a1) = (arg(args, 0), arg(args, 1));
        let role = state.roles.get(a0);
        let found = match query {
            catalog::ROLE_EXISTS => role.is_some(),
            catalog::ROLE_DROPPABLE => role.is_some() && a0 != state.current_user,
            catalog::ROLE_PASSWORD_DIFFERS => {
                role.is_some_and(|r| r.password.as_deref().unwrap_or_default() != a1)
            }
            catalog::ROLE_HAS_PASSWORD => {
                role.is_some_and(|r| r.password.is_some()) && a0 != state.current_user
            }
            catalog::ROLE_EXPIRY_DIFFERS => {
                role.is_some_and(|r| r.valid_until.as_deref() != Some(a1))
            }
            catalog::ROLE_HAS_EXPIRY => role.is_some_and(|r| {
                r.valid_until
                    .as_deref()
                    .is_some_and(|v| v != "infinity")
            }),
            catalog::GRANT_EXISTS => state
                .memberships
                .contains(&(a0.to_string(), a1.to_string())),
            catalog::GRANT_REVOCABLE => {
                state
                    .memberships
                    .contains(&(a0.to_string(), a1.to_string()))
                    && a1 != state.current_user
            }
            catalog::DATABASE_EXISTS => state.databases.contains_key(a0),
            catalog::DATABASE_OWNED_BY => state.databases.get(a0).is_some_and(|d| d.owner == a1),
            catalog::EXTENSION_AVAILABLE => state.available.contains_key(a0),
            catalog::EXTENSION_VERSION_AVAILABLE => state
                .available
                .get(a0)
                .is_some_and(|versions| versions.iter().any(|v| v == a1)),
            catalog::EXTENSION_INSTALLED => state
                .databases
                .get(&self.database)
                .is_some_and(|d| d.extensions.contains_key(a0)),
            catalog::SLOT_EXISTS => state.slots.contains(a0),
            _ => {
                let Some((capability, negated)) = option_check(query) else {
                    return Err(unsupported(query, "unknown query"));
                };
                role.is_some_and(|r| r.has(capability) != negated)
            }
        };
        Ok(found)
    }

    fn query_column(&self, query: &str, args: &[&str]) -> Result<Vec<String>, DatabaseError> {
        let state = self.lock();
        let a0 = arg(args, 0);
        match query {
            catalog::DATABASES_OWNED_BY => Ok(state
                .databases
                .iter()
                .filter(|(_, db)| db.owner == a0)
                .map(|(name, _)| name.clone())
                .collect()),
            catalog::SCHEMAS_PENDING_SELECT => {
                let Some(db) = state.databases.get(&self.database) else {
                    return Ok(Vec::new());
                };
                let pending: BTreeSet<String> = db
                    .tables
                    .iter()
                    .filter(|(schema, table)| {
                        !db.select_grants
                            .contains(&(a0.to_string(), schema.clone(), table.clone()))
                    })
                    .map(|(schema, _)| schema.clone())
                    .collect();
                Ok(pending.into_iter().collect())
            }
            catalog::EXTENSION_SCHEMA | catalog::EXTENSION_VERSION => {
                let extension = state
                    .databases
                    .get(&self.database)
                    .and_then(|d| d.extensions.get(a0));
                Ok(extension
                    .map(|e| {
                        if query == catalog::EXTENSION_SCHEMA {
                            e.schema.clone()
                        } else {
                            e.version.clone()
                        }
                    })
                    .into_iter()
                    .collect())
            }
            _ => Err(unsupported(query, "unknown query")),
        }
    }

    fn apply(&self, statement: &str, args: &[&str]) -> Result<(), DatabaseError> {
        let mut state = self.lock();
        state.executed.push(Executed {
            database: self.database.clone(),
            statement: statement.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });

        match statement {
            catalog::SLOT_CREATE => {
                state.slots.insert(arg(args, 0).to_string());
                return Ok(());
            }
            catalog::SLOT_DROP => {
                state.slots.remove(arg(args, 0));
                return Ok(());
            }
            _ => {}
        }

        let tokens = tokenize(statement);
        let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let fail = |message: &str| Err(unsupported(statement, message));
        let current_user = state.current_user.clone();
        let database = self.database.clone();

        match words.as_slice() {
            ["CREATE", "ROLE", name] => {
                if state.roles.contains_key(*name) {
                    return fail("role already exists");
                }
                state.roles.insert(name.to_string(), RoleRow::default());
            }
            ["ALTER", "ROLE", name, "WITH", "ENCRYPTED", "PASSWORD", password] => {
                let Some(role) = state.roles.get_mut(*name) else {
                    return fail("role does not exist");
                };
                role.password = Some(password.to_string());
            }
            ["ALTER", "ROLE", name, "WITH", "PASSWORD", "NULL"] => {
                let Some(role) = state.roles.get_mut(*name) else {
                    return fail("role does not exist");
                };
                role.password = None;
            }
            ["ALTER", "ROLE", name, "WITH", clause] => {
                let Ok(option) = clause.parse::<RoleOption>() else {
                    return fail("unknown role option");
                };
                let Some(role) = state.roles.get_mut(*name) else {
                    return fail("role does not exist");
                };
                role.options.insert(option.capability(), option.enabled());
            }
            ["ALTER", "ROLE", name, "VALID", "UNTIL", until] => {
                let Some(role) = state.roles.get_mut(*name) else {
                    return fail("role does not exist");
                };
                role.valid_until = Some(until.to_string());
            }
            ["GRANT", "SELECT", "ON", "ALL", "TABLES", "IN", "SCHEMA", schema, "TO", role] => {
                if !state.roles.contains_key(*role) {
                    return fail("role does not exist");
                }
                let Some(db) = state.databases.get_mut(&database) else {
                    return fail("database does not exist");
                };
                let tables: Vec<(String, String)> = db
                    .tables
                    .iter()
                    .filter(|(s, _)| s == schema)
                    .cloned()
                    .collect();
                for (s, t) in tables {
                    db.select_grants.insert((role.to_string(), s, t));
                }
            }
            ["GRANT", granted, "TO", grantee] => {
                if !state.roles.contains_key(*granted) || !state.roles.contains_key(*grantee) {
                    return fail("role does not exist");
                }
                state
                    .memberships
                    .insert((granted.to_string(), grantee.to_string()));
            }
            ["REVOKE", granted, "FROM", grantee] => {
                state
                    .memberships
                    .remove(&(granted.to_string(), grantee.to_string()));
            }
            ["REASSIGN", "OWNED", "BY", role, "TO", new_owner] => {
                let new_owner = if *new_owner == "CURRENT_USER" {
                    current_user
                } else {
                    new_owner.to_string()
                };
                for db in state.databases.values_mut() {
                    if db.owner == *role {
                        db.owner = new_owner.clone();
                    }
                }
            }
            ["DROP", "ROLE", name] => {
                if state.databases.values().any(|d| d.owner == *name) {
                    return fail("role owns a database");
                }
                if state.roles.remove(*name).is_none() {
                    return fail("role does not exist");
                }
                state
                    .memberships
                    .retain(|(granted, grantee)| granted != name && grantee != name);
            }
            ["CREATE", "DATABASE", name] => {
                if state.databases.contains_key(*name) {
                    return fail("database already exists");
                }
                state.databases.insert(
                    name.to_string(),
                    DatabaseRow {
                        owner: current_user,
                        ..DatabaseRow::default()
                    },
                );
            }
            ["ALTER", "DATABASE", name, "OWNER", "TO", owner] => {
                if !state.roles.contains_key(*owner) {
                    return fail("role does not exist");
                }
                let Some(db) = state.databases.get_mut(*name) else {
                    return fail("database does not exist");
                };
                db.owner = owner.to_string();
            }
            ["DROP", "DATABASE", name] => {
                if *name == database {
                    return fail("cannot drop the currently open database");
                }
                if state.databases.remove(*name).is_none() {
                    return fail("database does not exist");
                }
            }
            ["CREATE", "EXTENSION", "IF", "NOT", "EXISTS", name, rest @ ..] => {
                let Some(versions) = state.available.get(*name) else {
                    return fail("extension is not available");
                };
                let mut schema = "public".to_string();
                let mut version = versions.first().cloned().unwrap_or_default();
                for pair in rest.chunks(2) {
                    match pair {
                        ["SCHEMA", s] => schema = s.to_string(),
                        ["VERSION", v] => version = v.to_string(),
                        _ => return fail("unexpected extension clause"),
                    }
                }
                let Some(db) = state.databases.get_mut(&database) else {
                    return fail("database does not exist");
                };
                db.extensions
                    .entry(name.to_string())
                    .or_insert(InstalledExtension { schema, version });
            }
            ["ALTER", "EXTENSION", name, "SET", "SCHEMA", schema] => {
                let Some(extension) = state
                    .databases
                    .get_mut(&database)
                    .and_then(|d| d.extensions.get_mut(*name))
                else {
                    return fail("extension is not installed");
                };
                extension.schema = schema.to_string();
            }
            ["ALTER", "EXTENSION", name, "UPDATE", "TO", version] => {
                let Some(extension) = state
                    .databases
                    .get_mut(&database)
                    .and_then(|d| d.extensions.get_mut(*name))
                else {
                    return fail("extension is not installed");
                };
                extension.version = version.to_string();
            }
            ["DROP", "EXTENSION", name] => {
                let removed = state
                    .databases
                    .get_mut(&database)
                    .and_then(|d| d.extensions.remove(*name));
                if removed.is_none() {
                    return fail("extension is not installed");
                }
            }
            _ => return fail("unsupported statement"),
        }
        Ok(())
    }
}

#[async_trait]
impl SqlExecutor for MemoryConn {
    async fn ensure_connected(&mut self) -> Result<(), DatabaseError> {
        if !self.lock().databases.contains_key(&self.database) {
            return Err(DatabaseError::Connection {
                target: self.database.clone(),
                message: "database does not exist".to_string(),
            });
        }
        self.connected = true;
        Ok(())
    }

    async fn exists(&mut self, query: &str, args: &[&str]) -> Result<bool, DatabaseError> {
        self.ensure_connected().await?;
        self.query_exists(query, args)
    }

    async fn exec(&mut self, statement: &str, args: &[&str]) -> Result<(), DatabaseError> {
        self.ensure_connected().await?;
        self.apply(statement, args)
    }

    async fn scalar(&mut self, query: &str, args: &[&str]) -> Result<String, DatabaseError> {
        self.ensure_connected().await?;
        self.query_column(query, args)?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::UnexpectedEmpty {
                query: query.to_string(),
            })
    }

    async fn column(&mut self, query: &str, args: &[&str]) -> Result<Vec<String>, DatabaseError> {
        self.ensure_connected().await?;
        self.query_column(query, args)
    }

    async fn disconnect(&mut self) -> Result<(), DatabaseError> {
        self.connected = false;
        Ok(())
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn user(&self) -> &str {
        &self.user
    }
}
