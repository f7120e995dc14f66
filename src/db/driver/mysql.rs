//! MySQL / MariaDB driver.

use super::{Outcome, drain};
use crate::db::cursor::NativeResult;
use crate::db::statement::sql_literal;
use crate::models::{ConnectionConfig, DriverKind, SessionOption};
use sqlx::mysql::{MySqlConnectOptions, MySqlQueryResult};
use sqlx::{Connection, MySqlConnection};

pub const BEGIN: &str = "START TRANSACTION";
pub const VERSION_QUERY: &str = "SELECT version()";

pub async fn connect(config: &ConnectionConfig) -> Result<MySqlConnection, sqlx::Error> {
    let mut options = MySqlConnectOptions::new()
        .host(config.host.as_deref().unwrap_or("localhost"))
        .port(
            config
                .port
                .or(DriverKind::MySql.default_port())
                .unwrap_or(3306),
        )
        .charset("utf8mb4");

    if let Some(username) = &config.username {
        options = options.username(username);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(schema) = &config.schema {
        options = options.database(schema);
    }

    MySqlConnection::connect_with(&options).await
}

pub async fn run(conn: &mut MySqlConnection, sql: &str) -> Result<Outcome, sqlx::Error> {
    let drained = drain(&mut *conn, sql).await?;

    // 0 means the statement generated no AUTO_INCREMENT value.
    let last_insert_id = drained
        .results
        .last()
        .map(MySqlQueryResult::last_insert_id)
        .filter(|id| *id != 0)
        .and_then(|id| i64::try_from(id).ok());

    Ok(Outcome {
        rows_affected: drained
            .results
            .iter()
            .map(MySqlQueryResult::rows_affected)
            .sum(),
        last_insert_id,
        result: if drained.rows.is_empty() {
            None
        } else {
            Some(NativeResult::MySql(drained.rows))
        },
    })
}

pub fn session_statement(option: &SessionOption) -> String {
    if option.is_charset() {
        format!("SET NAMES {}", sql_literal(&option.value))
    } else {
        format!("SET SESSION {} = {}", option.key, sql_literal(&option.value))
    }
}
