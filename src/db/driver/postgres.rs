//! PostgreSQL driver.

use super::{Outcome, drain};
use crate::db::cursor::NativeResult;
use crate::db::statement::sql_literal;
use crate::models::{ConnectionConfig, DriverKind, SessionOption};
use sqlx::postgres::{PgConnectOptions, PgQueryResult};
use sqlx::{Connection, PgConnection};

pub const BEGIN: &str = "BEGIN";
pub const VERSION_QUERY: &str = "SHOW server_version";
pub const LAST_INSERT_ID_QUERY: &str = "SELECT lastval()";

/// Guards `lastval()` inside an open transaction, where a failure would
/// otherwise abort the caller's transaction.
pub const LAST_INSERT_ID_SAVEPOINT: &str = "SAVEPOINT sqlbridge_lastval";
pub const LAST_INSERT_ID_ROLLBACK: &str = "ROLLBACK TO SAVEPOINT sqlbridge_lastval";
pub const LAST_INSERT_ID_RELEASE: &str = "RELEASE SAVEPOINT sqlbridge_lastval";

/// SQLSTATE raised by `lastval()` before any sequence was used in the session.
pub const OBJECT_NOT_IN_PREREQUISITE_STATE: &str = "55000";

pub async fn connect(config: &ConnectionConfig) -> Result<PgConnection, sqlx::Error> {
    let mut options = PgConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(
            config
                .port
                .or(DriverKind::Postgres.default_port())
                .unwrap_or(5432),
        );

    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(schema) = &config.schema {
        options = options.database(schema);
    }

    PgConnection::connect_with(&options).await
}

pub async fn run(conn: &mut PgConnection, sql: &str) -> Result<Outcome, sqlx::Error> {
    let drained = drain(&mut *conn, sql).await?;

    Ok(Outcome {
        rows_affected: drained
            .results
            .iter()
            .map(PgQueryResult::rows_affected)
            .sum(),
        last_insert_id: None,
        result: if drained.rows.is_empty() {
            None
        } else {
            Some(NativeResult::Postgres(drained.rows))
        },
    })
}

pub fn session_statement(option: &SessionOption) -> String {
    if option.is_charset() {
        format!("SET client_encoding TO {}", sql_literal(&option.value))
    } else {
        format!("SET {} TO {}", option.key, sql_literal(&option.value))
    }
}
