//! Database error types.

use thiserror::Error;

/// Errors from talking to the cluster.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The connection could not be established. `target` is the redacted DSN.
    #[error("Failed to connect to {target}: {message}")]
    Connection { target: String, message: String },

    /// A statement was rejected by the server.
    #[error("Statement failed: {message} (statement: {statement})")]
    Query { statement: String, message: String },

    /// A single-value query returned no rows.
    #[error("Query returned no rows: {query}")]
    UnexpectedEmpty { query: String },
}

impl DatabaseError {
    /// Connection failures may clear up on the next run.
    pub fn is_transient(&self) -> bool {
        matches!(self, DatabaseError::Connection { .. })
    }
}
