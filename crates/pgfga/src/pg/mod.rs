//! PostgreSQL object model and reconcilers.

pub mod catalog;
pub mod conn;
pub mod database;
pub mod error;
pub mod extension;
pub mod grant;
pub mod option;
pub mod policy;
pub mod postgres;
pub mod quote;
pub mod role;
pub mod slot;
pub mod state;

pub use conn::{Cluster, ConnParams, Connector, SqlExecutor};
pub use database::Database;
pub use error::DatabaseError;
pub use extension::Extension;
pub use grant::Grant;
pub use option::{Capability, RoleOption, RoleOptionMap};
pub use policy::{Conventions, StrictOptions};
pub use postgres::{PgConn, PgConnector};
pub use role::Role;
pub use slot::ReplicationSlot;
pub use state::State;
