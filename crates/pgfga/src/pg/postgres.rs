//! [`SqlExecutor`] backed by a SeaORM connection pool of one.

use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, QueryResult,
    Statement, Value,
};
use tracing::{debug, warn};

use super::conn::{ConnParams, Connector, SqlExecutor};
use super::error::DatabaseError;

/// Builds [`PgConn`]s from one set of connection parameters.
#[derive(Debug, Clone)]
pub struct PgConnector {
    params: ConnParams,
}

impl PgConnector {
    pub fn new(params: ConnParams) -> Self {
        Self { params }
    }
}

impl Connector for PgConnector {
    type Conn = PgConn;

    fn primary(&self) -> PgConn {
        PgConn::new(self.params.clone())
    }

    fn connect_to(&self, database: &str) -> PgConn {
        PgConn::new(self.params.with_database(database))
    }
}

/// Lazily connected executor for one database.
///
/// The pool is capped at a single connection so session state stays put.
/// When a statement fails and the connection no longer answers a ping, the
/// pool is discarded and the next call reconnects.
pub struct PgConn {
    params: ConnParams,
    database: String,
    user: String,
    conn: Option<DatabaseConnection>,
}

impl PgConn {
    pub fn new(params: ConnParams) -> Self {
        let database = params.database();
        let user = params.user();
        Self {
            params,
            database,
            user,
            conn: None,
        }
    }

    fn handle(&self) -> Result<&DatabaseConnection, DatabaseError> {
        self.conn.as_ref().ok_or_else(|| DatabaseError::Connection {
            target: self.params.to_string(),
            message: "not connected".to_string(),
        })
    }

    fn statement(sql: &str, args: &[&str]) -> Statement {
        Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            args.iter().map(|arg| Value::from(*arg)),
        )
    }

    /// Maps a driver error and drops the pool if the server went away.
    async fn failed(&mut self, sql: &str, err: DbErr) -> DatabaseError {
        if let Some(conn) = &self.conn {
            if conn.ping().await.is_err() {
                warn!(database = %self.database, "Connection lost, will reconnect on next use");
                self.conn = None;
            }
        }
        DatabaseError::Query {
            statement: sql.to_string(),
            message: err.to_string(),
        }
    }

    async fn first_row(
        &mut self,
        query: &str,
        args: &[&str],
    ) -> Result<Option<QueryResult>, DatabaseError> {
        self.ensure_connected().await?;
        let result = self.handle()?.query_one(Self::statement(query, args)).await;
        match result {
            Ok(row) => Ok(row),
            Err(err) => Err(self.failed(query, err).await),
        }
    }

    fn text(query: &str, row: &QueryResult) -> Result<String, DatabaseError> {
        row.try_get_by_index::<Option<String>>(0)
            .map(Option::unwrap_or_default)
            .map_err(|err| DatabaseError::Query {
                statement: query.to_string(),
                message: err.to_string(),
            })
    }
}

#[async_trait]
impl SqlExecutor for PgConn {
    async fn ensure_connected(&mut self) -> Result<(), DatabaseError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let mut options = ConnectOptions::new(self.params.to_url());
        options
            .max_connections(1)
            .min_connections(0)
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|err| DatabaseError::Connection {
                target: self.params.to_string(),
                message: err.to_string(),
            })?;
        debug!(dsn = %self.params, "Connected");
        self.conn = Some(conn);
        Ok(())
    }

    async fn exists(&mut self, query: &str, args: &[&str]) -> Result<bool, DatabaseError> {
        Ok(self.first_row(query, args).await?.is_some())
    }

    async fn exec(&mut self, statement: &str, args: &[&str]) -> Result<(), DatabaseError> {
        self.ensure_connected().await?;
        let conn = self.handle()?;
        let result = if args.is_empty() {
            conn.execute_unprepared(statement).await.map(|_| ())
        } else {
            conn.execute(Self::statement(statement, args))
                .await
                .map(|_| ())
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.failed(statement, err).await),
        }
    }

    async fn scalar(&mut self, query: &str, args: &[&str]) -> Result<String, DatabaseError> {
        match self.first_row(query, args).await? {
            Some(row) => Self::text(query, &row),
            None => Err(DatabaseError::UnexpectedEmpty {
                query: query.to_string(),
            }),
        }
    }

    async fn column(&mut self, query: &str, args: &[&str]) -> Result<Vec<String>, DatabaseError> {
        self.ensure_connected().await?;
        let result = self.handle()?.query_all(Self::statement(query, args)).await;
        let rows = match result {
            Ok(rows) => rows,
            Err(err) => return Err(self.failed(query, err).await),
        };
        rows.iter().map(|row| Self::text(query, row)).collect()
    }

    async fn disconnect(&mut self) -> Result<(), DatabaseError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(|err| DatabaseError::Connection {
                target: self.params.to_string(),
                message: err.to_string(),
            })?;
            debug!(database = %self.database, "Disconnected");
        }
        Ok(())
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn user(&self) -> &str {
        &self.user
    }
}
