//! Error types for sqlbridge.
//!
//! Every failure surfaced by a connector, cursor or registry is a [`DbError`].
//! Native driver errors are translated here so callers only ever match on one
//! taxonomy regardless of the backend.

use thiserror::Error;

/// MySQL: lock wait timeout exceeded.
pub const MYSQL_LOCK_WAIT_TIMEOUT: &str = "1205";
/// MySQL: deadlock found when trying to get lock.
pub const MYSQL_DEADLOCK: &str = "1213";

const RETRYABLE_CODES: &[&str] = &[
    MYSQL_LOCK_WAIT_TIMEOUT,
    MYSQL_DEADLOCK,
    // PostgreSQL serialization_failure / deadlock_detected
    "40001",
    "40P01",
    // SQLITE_BUSY / SQLITE_LOCKED
    "5",
    "6",
];

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" (code: {})", c))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Infrastructure error: {message}")]
    Infrastructure { message: String, suggestion: String },

    #[error("Database error: {message}{}", code_suffix(.code))]
    Database {
        /// Native error code, e.g. "1213" for a MySQL deadlock or "42P01" for
        /// an undefined Postgres table.
        code: Option<String>,
        message: String,
        sql: String,
    },

    #[error("No more rows available for: {sql}")]
    NoMoreRows { sql: String },

    #[error("Expected exactly one row, got {count}: {sql}")]
    MultipleRows { sql: String, count: usize },

    #[error("Unexpected value: {message}")]
    UnexpectedValue { message: String },

    #[error("Unknown column '{column}' in result of: {sql}")]
    UnknownColumn { column: String, sql: String },

    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    #[error("Unknown driver: {driver}")]
    UnknownDriver { driver: String },

    #[error("No configuration for connection: {connection_id}")]
    NoSuchConnectionConfig { connection_id: String },

    #[error("No default connection configured")]
    NoDefaultConfigured,

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl DbError {
    /// Create an infrastructure error with a helpful suggestion.
    pub fn infrastructure(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error for a failed statement.
    pub fn database(
        code: Option<String>,
        message: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::Database {
            code,
            message: message.into(),
            sql: sql.into(),
        }
    }

    pub fn no_more_rows(sql: impl Into<String>) -> Self {
        Self::NoMoreRows { sql: sql.into() }
    }

    pub fn multiple_rows(sql: impl Into<String>, count: usize) -> Self {
        Self::MultipleRows {
            sql: sql.into(),
            count,
        }
    }

    pub fn unexpected_value(message: impl Into<String>) -> Self {
        Self::UnexpectedValue {
            message: message.into(),
        }
    }

    pub fn unknown_column(column: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
            sql: sql.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    pub fn unknown_driver(driver: impl Into<String>) -> Self {
        Self::UnknownDriver {
            driver: driver.into(),
        }
    }

    pub fn no_such_connection_config(connection_id: impl Into<String>) -> Self {
        Self::NoSuchConnectionConfig {
            connection_id: connection_id.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Attach the statement text to a database error produced without one.
    pub fn with_sql(self, statement: &str) -> Self {
        match self {
            Self::Database { code, message, sql } if sql.is_empty() => Self::Database {
                code,
                message,
                sql: statement.to_string(),
            },
            other => other,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Infrastructure { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Native error code reported by the driver, if any.
    pub fn native_code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Lock waits, deadlocks and serialization failures leave the data intact
    /// and usually succeed when the whole transaction is replayed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Infrastructure { .. } => true,
            Self::Database { code: Some(c), .. } => RETRYABLE_CODES.contains(&c.as_str()),
            _ => false,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// The statement text is unknown at this point; call sites that have it use
/// [`DbError::with_sql`].
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::infrastructure(
                msg.to_string(),
                "Check the connection parameters and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                // MySQL reports SQLSTATE through code(); the server error number
                // is what identifies lock waits and deadlocks.
                let code = db_err
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| e.number().to_string())
                    .or_else(|| db_err.code().map(|c| c.to_string()));
                DbError::database(code, db_err.message(), "")
            }
            sqlx::Error::RowNotFound => DbError::no_more_rows(""),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => DbError::infrastructure(
                "Connection is no longer available",
                "Reconnect to the database",
            ),
            sqlx::Error::Io(io_err) => DbError::infrastructure(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::infrastructure(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::infrastructure(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::unknown_column(col, ""),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::unknown_column(
                format!("#{} (row has {} columns)", index, len),
                "",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::unexpected_value(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                DbError::unexpected_value(format!("Decode error: {}", source))
            }
            sqlx::Error::AnyDriverError(err) => DbError::infrastructure(
                format!("Driver error: {}", err),
                "Check database driver configuration",
            ),
            sqlx::Error::WorkerCrashed => DbError::infrastructure(
                "Database worker crashed",
                "Reconnect to the database",
            ),
            _ => DbError::database(None, format!("Unknown database error: {}", err), ""),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
