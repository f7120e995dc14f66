//! SQLite driver.
//!
//! `schema` holds the database file path; `:memory:` opens a private
//! in-memory database.

use super::{Outcome, drain};
use crate::db::cursor::NativeResult;
use crate::db::statement::sql_literal;
use crate::models::{ConnectionConfig, SessionOption};
use sqlx::sqlite::{SqliteConnectOptions, SqliteQueryResult};
use sqlx::{Connection, SqliteConnection};
use std::str::FromStr;

pub const BEGIN: &str = "BEGIN";
pub const VERSION_QUERY: &str = "SELECT sqlite_version()";
pub const MEMORY: &str = ":memory:";

pub async fn connect(config: &ConnectionConfig) -> Result<SqliteConnection, sqlx::Error> {
    let file = config
        .schema
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| sqlx::Error::Configuration("SQLite requires a database file path".into()))?;

    let options = if file == MEMORY {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        SqliteConnectOptions::new()
            .filename(file)
            .create_if_missing(true)
    };

    SqliteConnection::connect_with(&options).await
}

pub async fn run(conn: &mut SqliteConnection, sql: &str) -> Result<Outcome, sqlx::Error> {
    let drained = drain(&mut *conn, sql).await?;

    let last_insert_id = drained
        .results
        .last()
        .map(SqliteQueryResult::last_insert_rowid)
        .filter(|id| *id != 0);

    Ok(Outcome {
        rows_affected: drained
            .results
            .iter()
            .map(SqliteQueryResult::rows_affected)
            .sum(),
        last_insert_id,
        result: if drained.rows.is_empty() {
            None
        } else {
            Some(NativeResult::Sqlite(drained.rows))
        },
    })
}

pub fn session_statement(option: &SessionOption) -> String {
    if option.is_charset() {
        format!("PRAGMA encoding = {}", sql_literal(&option.value))
    } else {
        format!("PRAGMA {} = {}", option.key, sql_literal(&option.value))
    }
}
