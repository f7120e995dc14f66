//! Native driver layer.
//!
//! Each backend owns exactly one sqlx connection. Everything that differs
//! between drivers (connect parameters, statement submission, session option
//! syntax, transaction keywords) lives in the per-driver modules; the
//! connector only sees [`NativeConnection`] and [`Outcome`].

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::db::cursor::NativeResult;
use crate::db::macros::impl_native_dispatch;
use crate::models::{ConnectionConfig, DriverKind, SessionOption};
use futures_util::TryStreamExt;
use sqlx::{Connection, Database, Either, Executor};

/// Result of submitting one raw SQL string.
#[derive(Debug)]
pub struct Outcome {
    /// Rows returned, if the submission produced any.
    pub result: Option<NativeResult>,
    /// Sum of the driver-reported counts over every statement in the string.
    pub rows_affected: u64,
    /// Generated key reported with the statement (MySQL/SQLite only).
    pub last_insert_id: Option<i64>,
}

/// Single native connection to one of the supported backends.
#[derive(Debug)]
pub enum NativeConnection {
    MySql(sqlx::MySqlConnection),
    Postgres(sqlx::PgConnection),
    Sqlite(sqlx::SqliteConnection),
}

impl NativeConnection {
    /// Open a connection using the stored parameters.
    pub async fn open(kind: DriverKind, config: &ConnectionConfig) -> Result<Self, sqlx::Error> {
        Ok(match kind {
            DriverKind::MySql => Self::MySql(mysql::connect(config).await?),
            DriverKind::Postgres => Self::Postgres(postgres::connect(config).await?),
            DriverKind::Sqlite => Self::Sqlite(sqlite::connect(config).await?),
        })
    }

    /// Submit raw SQL and collect everything it produced.
    pub async fn run(&mut self, sql: &str) -> Result<Outcome, sqlx::Error> {
        impl_native_dispatch!(NativeConnection, self, {
            MySql(conn) => mysql::run(conn, sql).await,
            Postgres(conn) => postgres::run(conn, sql).await,
            Sqlite(conn) => sqlite::run(conn, sql).await,
        })
    }

    /// Submit SQL whose output is irrelevant (transaction and session commands).
    pub async fn submit(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        self.run(sql).await.map(|_| ())
    }

    /// Gracefully close the connection.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        impl_native_dispatch!(NativeConnection, self, |conn| conn.close().await)
    }
}

/// Rows and per-statement results of one unprepared submission.
pub(crate) struct Drained<DB: Database> {
    pub rows: Vec<DB::Row>,
    pub results: Vec<DB::QueryResult>,
}

/// Run `sql` unprepared so multi-statement strings and statements that cannot
/// be prepared are accepted.
pub(crate) async fn drain<'e, DB, X>(executor: X, sql: &'e str) -> Result<Drained<DB>, sqlx::Error>
where
    DB: Database,
    X: Executor<'e, Database = DB>,
{
    let mut stream = executor.fetch_many(sql);
    let mut rows = Vec::new();
    let mut results = Vec::new();
    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(done) => results.push(done),
            Either::Right(row) => rows.push(row),
        }
    }
    Ok(Drained { rows, results })
}

/// Native command opening a transaction.
pub fn begin_statement(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::MySql => mysql::BEGIN,
        DriverKind::Postgres => postgres::BEGIN,
        DriverKind::Sqlite => sqlite::BEGIN,
    }
}

pub const COMMIT: &str = "COMMIT";
pub const ROLLBACK: &str = "ROLLBACK";

/// Query returning the server version as a single text cell.
pub fn version_query(kind: DriverKind) -> &'static str {
    match kind {
        DriverKind::MySql => mysql::VERSION_QUERY,
        DriverKind::Postgres => postgres::VERSION_QUERY,
        DriverKind::Sqlite => sqlite::VERSION_QUERY,
    }
}

/// Statement applying one connect-time session option.
pub fn session_statement(kind: DriverKind, option: &SessionOption) -> String {
    match kind {
        DriverKind::MySql => mysql::session_statement(option),
        DriverKind::Postgres => postgres::session_statement(option),
        DriverKind::Sqlite => sqlite::session_statement(option),
    }
}

/// Numeric form of a version string: `major * 10000 + minor * 100 + patch`.
///
/// Parsing starts at the first digit and stops at the first component not
/// separated by a dot, so vendor suffixes like "-MariaDB" or " (Debian ...)"
/// are ignored. Missing components count as 0.
pub fn parse_version_id(version: &str) -> u32 {
    let start = version
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(version.len());
    let mut rest = &version[start..];
    let mut parts = [0u32; 3];

    for (i, part) in parts.iter_mut().enumerate() {
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        *part = rest[..len].parse().unwrap_or(0);
        rest = &rest[len..];
        match rest.strip_prefix('.') {
            Some(next) if i < 2 => rest = next,
            _ => break,
        }
    }

    parts[0]
        .saturating_mul(10000)
        .saturating_add(parts[1].saturating_mul(100))
        .saturating_add(parts[2])
}

/// Provide a helpful suggestion based on a connection failure.
pub fn connection_suggestion(kind: DriverKind, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!("Check that the {} server is running and accessible", kind);
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("access denied")
    {
        return "Verify the username and password for this connection".to_string();
    }

    if error_str.contains("does not exist") || error_str.contains("unknown database") {
        return "Check that the schema name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match kind {
        DriverKind::Postgres | DriverKind::MySql => format!(
            "Verify host and port (default {}) and that the server accepts connections",
            kind.default_port().unwrap_or_default()
        ),
        DriverKind::Sqlite => "Verify the file path exists and is accessible".to_string(),
    }
}
