//! sqlbridge Library
//!
//! A uniform, blocking database access layer over MySQL, PostgreSQL and
//! SQLite: a registry of named connectors, nested transactions, result
//! cursors with typed coercion, and one error taxonomy for every backend.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{ConfigSource, Config, ConnectionMap};
pub use db::{Connector, ConnectorRegistry, ResultCursor, SharedConnector};
pub use error::{DbError, DbResult};
pub use models::{ConnectionConfig, DriverKind, Row, Value};
