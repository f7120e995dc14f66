//! Statement classification.
//!
//! Drivers report "affected rows" with different meanings, so the count a
//! connector exposes is normalised here from the statement text alone.

use crate::models::DriverKind;

const MODIFYING: &[&str] = &["insert", "update", "delete"];

/// First word of the statement, without leading whitespace.
pub fn leading_keyword(sql: &str) -> &str {
    let sql = sql.trim_start();
    let end = sql
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .unwrap_or(sql.len());
    &sql[..end]
}

/// Case-insensitive prefix test for INSERT/UPDATE/DELETE (and REPLACE on
/// MySQL).
pub fn is_modifying(driver: DriverKind, sql: &str) -> bool {
    let sql = sql.trim_start();
    let has_prefix = |prefix: &str| {
        sql.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    };
    MODIFYING.iter().any(|p| has_prefix(p)) || (driver == DriverKind::MySql && has_prefix("replace"))
}

/// Normalise a driver-reported row count for the statement that produced it.
///
/// Statements that do not modify rows always report 0. PostgreSQL reports
/// matched rows and wraps multi-statement submissions in one implicit
/// transaction, so its count is only trusted when the leading keyword is
/// exactly INSERT, UPDATE or DELETE.
pub fn affected_rows(driver: DriverKind, sql: &str, reported: u64) -> u64 {
    if !is_modifying(driver, sql) {
        return 0;
    }
    match driver {
        DriverKind::Postgres => {
            let keyword = leading_keyword(sql);
            if MODIFYING.iter().any(|k| keyword.eq_ignore_ascii_case(k)) {
                reported
            } else {
                0
            }
        }
        DriverKind::MySql | DriverKind::Sqlite => reported,
    }
}

/// Render a session option value as an SQL literal.
///
/// Numbers are emitted bare; anything else is single-quoted with embedded
/// quotes doubled.
pub fn sql_literal(value: &str) -> String {
    let trimmed = value.trim();
    if !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
        trimmed.to_string()
    } else {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_keyword() {
        assert_eq!(leading_keyword("  SELECT 1"), "SELECT");
        assert_eq!(leading_keyword("\n\tupdate t set a=1"), "update");
        assert_eq!(leading_keyword("INSERT(x)"), "INSERT");
        assert_eq!(leading_keyword(""), "");
    }

    #[test]
    fn test_is_modifying() {
        assert!(is_modifying(DriverKind::Sqlite, "  insert into t values (1)"));
        assert!(is_modifying(DriverKind::Postgres, "UPDATE t SET a = 1"));
        assert!(is_modifying(DriverKind::MySql, "Delete FROM t"));
        assert!(!is_modifying(DriverKind::MySql, "SELECT * FROM t"));
        assert!(!is_modifying(DriverKind::Sqlite, "up"));
    }

    #[test]
    fn test_replace_only_counts_on_mysql() {
        assert!(is_modifying(DriverKind::MySql, "REPLACE INTO t VALUES (1)"));
        assert!(!is_modifying(DriverKind::Sqlite, "REPLACE INTO t VALUES (1)"));
        assert!(!is_modifying(DriverKind::Postgres, "REPLACE INTO t VALUES (1)"));
    }

    #[test]
    fn test_affected_rows_zero_for_reads() {
        assert_eq!(affected_rows(DriverKind::MySql, "SELECT 1", 5), 0);
        assert_eq!(affected_rows(DriverKind::Sqlite, "CREATE TABLE t (a INT)", 3), 0);
    }

    #[test]
    fn test_affected_rows_passes_through_for_writes() {
        assert_eq!(affected_rows(DriverKind::MySql, "update t set a=1", 4), 4);
        assert_eq!(affected_rows(DriverKind::Sqlite, "DELETE FROM t", 2), 2);
        assert_eq!(affected_rows(DriverKind::Postgres, "DELETE FROM t", 2), 2);
    }

    #[test]
    fn test_postgres_requires_exact_keyword() {
        // Prefix matches but the keyword is something else entirely.
        assert_eq!(affected_rows(DriverKind::Postgres, "UPDATED_VIEW_REFRESH()", 7), 0);
        assert_eq!(affected_rows(DriverKind::MySql, "UPDATED_VIEW_REFRESH()", 7), 7);
    }

    #[test]
    fn test_sql_literal() {
        assert_eq!(sql_literal("60"), "60");
        assert_eq!(sql_literal("1.5"), "1.5");
        assert_eq!(sql_literal("utf8mb4"), "'utf8mb4'");
        assert_eq!(sql_literal("it's"), "'it''s'");
        assert_eq!(sql_literal(""), "''");
        assert_eq!(sql_literal("+00:00"), "'+00:00'");
    }
}
