//! Database access layer.
//!
//! This module provides:
//! - Connector registry resolving logical ids to connectors
//! - Blocking connectors with nested transaction tracking
//! - Forward-only result cursors with typed coercion
//! - Native driver dispatch for MySQL, PostgreSQL and SQLite
//! - Type mappings from native rows to values
//! - On-error diagnostic hooks

pub mod connector;
pub mod cursor;
pub mod diagnostics;
pub mod driver;
pub mod macros;
pub mod registry;
pub mod statement;
pub mod transaction;
pub mod types;

pub use connector::{Connector, new_runtime};
pub use cursor::{NativeResult, ResultCursor};
pub use diagnostics::{DiagnosticHook, MySqlLockDiagnostics};
pub use driver::NativeConnection;
pub use registry::{ConnectorRegistry, SharedConnector, normalize_driver};
pub use transaction::TransactionDepth;
