//! Data models for sqlbridge.
//!
//! This module re-exports all model types used throughout the library.

pub mod connection;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, DriverKind, SessionOption};
pub use row::{ColumnRef, Row};
pub use value::Value;
