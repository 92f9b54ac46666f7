//! Connection parameters and the SQL execution seam.
//!
//! Reconcilers never see a concrete client. They talk to a [`SqlExecutor`]
//! handed out by a [`Connector`], and the [`Cluster`] keeps one lazily
//! connected executor per database.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::DatabaseError;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: &str = "5432";

/// Keys that end up in the URL itself; everything else becomes a query parameter.
const URL_KEYS: [&str; 5] = ["host", "port", "user", "password", "dbname"];

/// libpq-style connection parameters (`host`, `port`, `user`, `dbname`, `sslmode`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnParams {
    params: BTreeMap<String, String>,
}

impl ConnParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Copy of these parameters bound to another database.
    pub fn with_database(&self, database: &str) -> Self {
        self.clone().set("dbname", database)
    }

    /// Effective user: `user`, then `PGUSER`, then the OS user.
    pub fn user(&self) -> String {
        self.resolve("user", "PGUSER").unwrap_or_else(os_user)
    }

    /// Effective database: `dbname`, then `PGDATABASE`, then the user name.
    pub fn database(&self) -> String {
        self.resolve("dbname", "PGDATABASE")
            .unwrap_or_else(|| self.user())
    }

    /// Renders a `postgres://` URL for the client library.
    pub fn to_url(&self) -> String {
        let host = self
            .resolve("host", "PGHOST")
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = self
            .resolve("port", "PGPORT")
            .unwrap_or_else(|| DEFAULT_PORT.to_string());

        let mut url = format!("postgres://{}", urlencoding::encode(&self.user()));
        if let Some(password) = self.resolve("password", "PGPASSWORD") {
            url.push(':');
            url.push_str(&urlencoding::encode(&password));
        }
        url.push_str(&format!(
            "@{}:{}/{}",
            host,
            port,
            urlencoding::encode(&self.database())
        ));

        let extra: Vec<String> = self
            .params
            .iter()
            .filter(|(key, _)| !URL_KEYS.contains(&key.as_str()))
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect();
        if !extra.is_empty() {
            url.push('?');
            url.push_str(&extra.join("&"));
        }
        url
    }

    fn resolve(&self, key: &str, env_var: &str) -> Option<String> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| std::env::var(env_var).ok().filter(|v| !v.is_empty()))
    }
}

fn os_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "postgres".to_string())
}

/// `key='value'` pairs with the password masked, for logs and errors.
impl fmt::Display for ConnParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .params
            .iter()
            .map(|(key, value)| {
                if key == "password" {
                    format!("{}='*****'", key)
                } else {
                    format!("{}='{}'", key, value.replace('\'', "\\'"))
                }
            })
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

impl<'de> Deserialize<'de> for ConnParams {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Ports are often written as numbers.
        let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
        let params = raw
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();
        Ok(Self { params })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConnParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Executes SQL against one database.
///
/// Every argument is bound as text. Implementations connect lazily:
/// `ensure_connected` is called before each query and is a no-op while the
/// connection is alive.
#[async_trait]
pub trait SqlExecutor: Send {
    async fn ensure_connected(&mut self) -> Result<(), DatabaseError>;

    /// True when the query returns at least one row.
    async fn exists(&mut self, query: &str, args: &[&str]) -> Result<bool, DatabaseError>;

    async fn exec(&mut self, statement: &str, args: &[&str]) -> Result<(), DatabaseError>;

    /// First column of the first row. No rows is an error.
    async fn scalar(&mut self, query: &str, args: &[&str]) -> Result<String, DatabaseError>;

    /// First column of every row.
    async fn column(&mut self, query: &str, args: &[&str]) -> Result<Vec<String>, DatabaseError>;

    /// Closes the connection, if any. A later query reconnects.
    async fn disconnect(&mut self) -> Result<(), DatabaseError>;

    /// Database this executor is bound to.
    fn database(&self) -> &str;

    /// Role this executor connects as.
    fn user(&self) -> &str;
}

/// Hands out unconnected executors.
pub trait Connector: Send + Sync {
    type Conn: SqlExecutor;

    /// Executor for the database named in the connection parameters.
    fn primary(&self) -> Self::Conn;

    /// Executor for another database of the same cluster.
    fn connect_to(&self, database: &str) -> Self::Conn;
}

/// The primary executor plus one executor per database touched so far.
pub struct Cluster<C: Connector> {
    connector: C,
    primary: C::Conn,
    databases: HashMap<String, C::Conn>,
}

impl<C: Connector> Cluster<C> {
    pub fn new(connector: C) -> Self {
        let primary = connector.primary();
        Self {
            connector,
            primary,
            databases: HashMap::new(),
        }
    }

    pub fn primary(&mut self) -> &mut C::Conn {
        &mut self.primary
    }

    pub fn primary_database(&self) -> &str {
        self.primary.database()
    }

    /// Role the primary executor connects as.
    pub fn current_user(&self) -> &str {
        self.primary.user()
    }

    /// Executor bound to `name`, reusing the primary when it is bound there.
    pub fn database(&mut self, name: &str) -> &mut C::Conn {
        if self.primary.database() == name {
            return &mut self.primary;
        }
        let connector = &self.connector;
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| connector.connect_to(name))
    }

    /// Closes and forgets the executor of a database. The primary is never released.
    pub async fn release(&mut self, name: &str) -> Result<(), DatabaseError> {
        if let Some(mut conn) = self.databases.remove(name) {
            conn.disconnect().await?;
        }
        Ok(())
    }

    /// Disconnects every executor, the primary last.
    pub async fn close(&mut self) -> Result<(), DatabaseError> {
        for (_, mut conn) in self.databases.drain() {
            conn.disconnect().await?;
        }
        self.primary.disconnect().await
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}
