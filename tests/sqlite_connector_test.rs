//! End-to-end connector tests against SQLite files.

use sqlbridge::db::{Connector, new_runtime};
use sqlbridge::error::{DbError, DbResult};
use sqlbridge::models::{ConnectionConfig, DriverKind, Value};
use tempfile::TempDir;

fn setup() -> (TempDir, ConnectionConfig) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.db");
    let config = ConnectionConfig::sqlite(path.to_string_lossy());
    (dir, config)
}

fn connector(config: &ConnectionConfig) -> Connector {
    Connector::new(
        "test",
        DriverKind::Sqlite,
        config.clone(),
        new_runtime().expect("runtime"),
    )
}

fn count(conn: &mut Connector, table: &str) -> i64 {
    conn.query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .unwrap()
        .fetch_as_int("n", 0, None)
        .unwrap()
}

#[test]
fn test_select_one_as_int() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    let mut cursor = conn.query("SELECT 1 AS x").unwrap();
    assert_eq!(cursor.fetch_as_int("x", 0, None).unwrap(), 1);
}

#[test]
fn test_update_matching_nothing_reports_zero() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();
    conn.execute("INSERT INTO t VALUES (5)").unwrap();
    assert_eq!(conn.execute("UPDATE t SET a=1 WHERE 1=0").unwrap(), 0);
}

#[test]
fn test_result_less_cursor() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();
    conn.execute("INSERT INTO t VALUES (1), (2)").unwrap();

    let mut cursor = conn.query("UPDATE t SET a = a + 1").unwrap();
    assert!(cursor.fetch_next().is_none());
    assert!(cursor.fetch_next().is_none());
    assert_eq!(cursor.affected_rows(), 2);
    assert!(cursor.internal_result().is_none());
}

#[test]
fn test_nested_transaction_inner_failure_commits_nothing() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();

    let result: DbResult<()> = conn.transaction(|outer| {
        outer.execute("INSERT INTO t VALUES (1)")?;
        outer.transaction(|inner| -> DbResult<()> {
            inner.execute("INSERT INTO t VALUES (2)")?;
            Err(DbError::unexpected_value("inner task failed"))
        })?;
        Ok(())
    });

    match result {
        Err(DbError::UnexpectedValue { message }) => assert_eq!(message, "inner task failed"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!conn.is_in_transaction());
    assert_eq!(count(&mut conn, "t"), 0);

    // Nothing reached the file either.
    let mut other = connector(&config);
    assert_eq!(count(&mut other, "t"), 0);
}

#[test]
fn test_inner_rollback_does_not_undo_outer_work() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();

    conn.begin().unwrap();
    conn.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    conn.rollback().unwrap();
    assert_eq!(conn.transaction_depth(), 1);
    conn.commit().unwrap();
    assert_eq!(conn.transaction_depth(), 0);

    let mut other = connector(&config);
    assert_eq!(count(&mut other, "t"), 1);
}

#[test]
fn test_transaction_commits_on_success() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();

    let inserted = conn
        .transaction(|c| c.execute("INSERT INTO t VALUES (1), (2), (3)"))
        .unwrap();
    assert_eq!(inserted, 3);

    let mut other = connector(&config);
    assert_eq!(count(&mut other, "t"), 3);
}

#[derive(Debug)]
enum AppError {
    Db(DbError),
    Rejected(&'static str),
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        AppError::Db(err)
    }
}

#[test]
fn test_transaction_returns_task_error_unchanged() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();

    let result: Result<(), AppError> = conn.transaction(|c| {
        c.execute("INSERT INTO t VALUES (1)")?;
        Err(AppError::Rejected("quota exceeded"))
    });

    assert!(matches!(result, Err(AppError::Rejected("quota exceeded"))));
    assert_eq!(count(&mut conn, "t"), 0);

    let result: Result<(), AppError> = conn.transaction(|c| {
        c.execute("INSERT INTO missing VALUES (1)")?;
        Ok(())
    });
    assert!(matches!(result, Err(AppError::Db(DbError::Database { .. }))));
}

#[test]
fn test_commit_and_rollback_without_transaction() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER)").unwrap();
    conn.commit().unwrap();
    conn.rollback().unwrap();
    assert_eq!(conn.transaction_depth(), 0);

    // Still autocommit: a separate connection sees the row at once.
    conn.execute("INSERT INTO t VALUES (1)").unwrap();
    let mut other = connector(&config);
    assert_eq!(count(&mut other, "t"), 1);
}

#[test]
fn test_drop_rolls_back_open_transaction() {
    let (_dir, config) = setup();
    {
        let mut conn = connector(&config);
        conn.execute("CREATE TABLE t (a INTEGER)").unwrap();
        conn.begin().unwrap();
        conn.begin().unwrap();
        conn.execute("INSERT INTO t VALUES (1)").unwrap();
    }

    let mut conn = connector(&config);
    assert_eq!(count(&mut conn, "t"), 0);
}

#[test]
fn test_typed_fetch_defaults() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER, b TEXT)").unwrap();
    conn.execute("INSERT INTO t VALUES (NULL, 'on')").unwrap();

    let mut cursor = conn.query("SELECT a, b FROM t").unwrap();
    assert_eq!(cursor.fetch_as_int("a", -1, None).unwrap(), -1);
    assert_eq!(cursor.fetch_as_int("a", -1, Some(-2)).unwrap(), -2);
    assert!(matches!(
        cursor.fetch_as_int("a", -1, None),
        Err(DbError::NoMoreRows { .. })
    ));

    let mut cursor = conn.query("SELECT a, b FROM t").unwrap();
    assert!(cursor.fetch_as_bool("B", false, None).unwrap());
}

#[test]
fn test_values_decode_by_storage_class() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    let mut cursor = conn
        .query("SELECT 42 AS i, 1.5 AS f, 'txt' AS s, x'00ff' AS b, NULL AS n")
        .unwrap();
    let row = cursor.fetch_single().unwrap();
    assert_eq!(row.get("i"), Some(&Value::Int(42)));
    assert_eq!(row.get("f"), Some(&Value::Float(1.5)));
    assert_eq!(row.get("s"), Some(&Value::from("txt")));
    assert_eq!(row.get("b"), Some(&Value::Bytes(vec![0x00, 0xff])));
    assert_eq!(row.get("n"), Some(&Value::Null));
}

#[test]
fn test_multi_statement_submission() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (a INTEGER); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2)")
        .unwrap();
    assert_eq!(count(&mut conn, "t"), 2);
}

#[test]
fn test_last_insert_id() {
    let (_dir, config) = setup();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)")
        .unwrap();
    let cursor = conn.query("INSERT INTO t (v) VALUES ('a')").unwrap();
    assert_eq!(cursor.last_insert_id(), Some(1));
    assert_eq!(conn.last_insert_id().unwrap(), Some(1));
}

fn deferred_fk_connector(config: &ConnectionConfig) -> Connector {
    let config = config
        .clone()
        .with_session_option("foreign_keys", "1")
        .unwrap();
    let mut conn = connector(&config);
    conn.execute("CREATE TABLE IF NOT EXISTS parent (id INTEGER PRIMARY KEY)")
        .unwrap();
    conn.execute(
        "CREATE TABLE IF NOT EXISTS child (pid INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED)",
    )
    .unwrap();
    conn
}

#[test]
fn test_failed_commit_keeps_transaction_open() {
    let (_dir, config) = setup();
    let mut conn = deferred_fk_connector(&config);

    conn.begin().unwrap();
    conn.execute("INSERT INTO child VALUES (99)").unwrap();
    assert!(matches!(conn.commit(), Err(DbError::Database { .. })));
    assert_eq!(conn.transaction_depth(), 1);
    assert!(conn.is_in_transaction());

    conn.rollback().unwrap();
    assert_eq!(conn.transaction_depth(), 0);
    assert_eq!(count(&mut conn, "child"), 0);

    conn.begin().unwrap();
    conn.execute("INSERT INTO parent VALUES (1)").unwrap();
    conn.execute("INSERT INTO child VALUES (1)").unwrap();
    conn.commit().unwrap();
    assert_eq!(count(&mut conn, "child"), 1);
}

#[test]
fn test_transaction_rolls_back_when_commit_fails() {
    let (_dir, config) = setup();
    let mut conn = deferred_fk_connector(&config);

    let result = conn.transaction(|c| c.execute("INSERT INTO child VALUES (99)"));
    assert!(matches!(result, Err(DbError::Database { .. })));
    assert!(!conn.is_in_transaction());

    let inserted = conn
        .transaction(|c| {
            c.execute("INSERT INTO parent VALUES (1)")?;
            c.execute("INSERT INTO child VALUES (1)")
        })
        .unwrap();
    assert_eq!(inserted, 1);

    let mut other = connector(&config);
    assert_eq!(count(&mut other, "child"), 1);
}
