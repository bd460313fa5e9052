//! `SQLite` backend: connection pool and schema.

pub mod connection;
pub mod schema;

pub use connection::{
    ConnectionConfig, ConnectionPool, DbSource, PooledConnection, PragmaState, verify_pragmas,
};
