//! On-error diagnostic hooks.
//!
//! When a statement fails with a native error code a hook is registered for,
//! the connector runs the hook's probe statements on the same connection and
//! appends their output to the error message. This captures lock holders and
//! in-flight statements at the moment of a lock wait timeout or deadlock,
//! which is usually impossible to reproduce afterwards.

use crate::db::cursor::NativeResult;
use crate::error::{DbError, MYSQL_DEADLOCK, MYSQL_LOCK_WAIT_TIMEOUT};

/// Longest cell rendered in a report; InnoDB status output runs to many KB.
const MAX_CELL_CHARS: usize = 16 * 1024;

/// Hook selecting native error codes and the probes to run for them.
pub trait DiagnosticHook: Send + Sync {
    /// Whether this hook handles the native error `code`.
    fn matches(&self, code: &str) -> bool;

    /// Statements whose output is attached to the error.
    fn probes(&self) -> &[&str];
}

/// MySQL lock wait timeout (1205) and deadlock (1213) diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlLockDiagnostics;

impl DiagnosticHook for MySqlLockDiagnostics {
    fn matches(&self, code: &str) -> bool {
        code == MYSQL_LOCK_WAIT_TIMEOUT || code == MYSQL_DEADLOCK
    }

    fn probes(&self) -> &[&str] {
        &["SHOW FULL PROCESSLIST", "SHOW ENGINE INNODB STATUS"]
    }
}

/// Render the rows a probe returned.
pub fn format_probe(probe: &str, result: Option<&NativeResult>) -> String {
    let mut out = format!("--- {} ---\n", probe);
    let Some(result) = result else {
        out.push_str("(no rows)\n");
        return out;
    };

    let columns = result.column_names();
    for index in 0..result.len() {
        let Some(values) = result.decode(index) else {
            break;
        };
        let line = columns
            .iter()
            .zip(values.iter())
            .map(|(column, value)| format!("{}={}", column, truncate(&value.to_string())))
            .collect::<Vec<_>>()
            .join(" | ");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Report line for a probe that could not be run.
pub fn probe_failed(probe: &str, error: &dyn std::fmt::Display) -> String {
    format!("--- {} ---\n(probe failed: {})\n", probe, error)
}

/// Append a diagnostic report to a database error's message.
///
/// Other error kinds are returned unchanged.
pub fn attach(error: DbError, report: &str) -> DbError {
    if report.is_empty() {
        return error;
    }
    match error {
        DbError::Database { code, message, sql } => DbError::Database {
            code,
            message: format!("{}\n{}", message, report.trim_end()),
            sql,
        },
        other => other,
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_lock_diagnostics_matches_lock_codes_only() {
        let hook = MySqlLockDiagnostics;
        assert!(hook.matches("1205"));
        assert!(hook.matches("1213"));
        assert!(!hook.matches("1064"));
        assert!(!hook.matches("40001"));
        assert_eq!(hook.probes().len(), 2);
    }

    #[test]
    fn test_attach_appends_to_database_errors() {
        let err = DbError::database(Some("1213".to_string()), "Deadlock found", "UPDATE t");
        let err = attach(err, "--- SHOW FULL PROCESSLIST ---\nId=1\n");
        match err {
            DbError::Database { code, message, sql } => {
                assert_eq!(code.as_deref(), Some("1213"));
                assert_eq!(message, "Deadlock found\n--- SHOW FULL PROCESSLIST ---\nId=1");
                assert_eq!(sql, "UPDATE t");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_attach_leaves_other_errors() {
        let err = attach(DbError::illegal_state("x"), "report");
        assert!(matches!(err, DbError::IllegalState { .. }));

        let err = attach(DbError::database(None, "boom", ""), "");
        assert_eq!(err.to_string(), "Database error: boom");
    }

    #[test]
    fn test_format_probe_without_rows() {
        assert_eq!(
            format_probe("SHOW FULL PROCESSLIST", None),
            "--- SHOW FULL PROCESSLIST ---\n(no rows)\n"
        );
    }

    #[test]
    fn test_probe_failed() {
        let report = probe_failed("SHOW ENGINE INNODB STATUS", &"access denied");
        assert!(report.contains("probe failed: access denied"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(truncate(&long).chars().count(), MAX_CELL_CHARS);
        assert_eq!(truncate("short"), "short");
    }
}
