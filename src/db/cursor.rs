//! Forward-only result cursor.
//!
//! A cursor wraps the native rows a statement produced and decodes them into
//! [`Row`]s one at a time. Every row is addressable both by position and by
//! column name, so there is no separate fetch mode.

use crate::db::macros::impl_native_dispatch;
use crate::db::types::DecodeRow;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnRef, DriverKind, Row, Value};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use std::sync::Arc;

/// Native rows returned by a statement, still in driver representation.
pub enum NativeResult {
    MySql(Vec<MySqlRow>),
    Postgres(Vec<PgRow>),
    Sqlite(Vec<SqliteRow>),
}

// SqliteRow has no Debug impl
impl std::fmt::Debug for NativeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeResult")
            .field("driver", &self.driver())
            .field("rows", &self.len())
            .finish()
    }
}

impl NativeResult {
    pub fn len(&self) -> usize {
        impl_native_dispatch!(NativeResult, self, |rows| rows.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column names, taken from the first row.
    pub fn column_names(&self) -> Vec<String> {
        impl_native_dispatch!(NativeResult, self, |rows| rows
            .first()
            .map(DecodeRow::column_names)
            .unwrap_or_default())
    }

    /// Decode the row at `index`.
    pub fn decode(&self, index: usize) -> Option<Vec<Value>> {
        impl_native_dispatch!(NativeResult, self, |rows| rows
            .get(index)
            .map(DecodeRow::decode_values))
    }

    pub fn driver(&self) -> DriverKind {
        impl_native_dispatch!(NativeResult, self, {
            MySql(_) => DriverKind::MySql,
            Postgres(_) => DriverKind::Postgres,
            Sqlite(_) => DriverKind::Sqlite,
        })
    }
}

/// Outcome of looking up one cell of the next row.
enum Cell {
    Value(Value),
    Null,
    Exhausted,
}

/// Rows of one executed statement.
#[derive(Debug)]
pub struct ResultCursor {
    connection_id: String,
    driver: DriverKind,
    sql: String,
    result: Option<NativeResult>,
    columns: Arc<[String]>,
    position: usize,
    affected_rows: u64,
    last_insert_id: Option<i64>,
}

impl ResultCursor {
    pub fn new(
        connection_id: impl Into<String>,
        driver: DriverKind,
        sql: impl Into<String>,
        result: Option<NativeResult>,
        affected_rows: u64,
        last_insert_id: Option<i64>,
    ) -> Self {
        let columns: Arc<[String]> = result
            .as_ref()
            .map(NativeResult::column_names)
            .unwrap_or_default()
            .into();
        Self {
            connection_id: connection_id.into(),
            driver,
            sql: sql.into(),
            result,
            columns,
            position: 0,
            affected_rows,
            last_insert_id,
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn driver(&self) -> DriverKind {
        self.driver
    }

    /// Statement text this cursor was produced by.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Column names in result order; empty for result-less statements.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Total number of rows, fetched or not.
    pub fn num_rows(&self) -> usize {
        self.result.as_ref().map_or(0, NativeResult::len)
    }

    /// Rows not fetched yet.
    pub fn remaining(&self) -> usize {
        self.num_rows().saturating_sub(self.position)
    }

    /// Rows modified by the statement, normalised per driver.
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    /// Generated key reported with the statement.
    ///
    /// Always `None` for PostgreSQL cursors; use
    /// [`Connector::last_insert_id`](crate::db::Connector::last_insert_id).
    pub fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }

    /// Escape hatch to the native rows.
    pub fn internal_result(&self) -> Option<&NativeResult> {
        self.result.as_ref()
    }

    /// Advance the cursor. Returns `None` once exhausted, and for statements
    /// that produced no rows at all.
    pub fn fetch_next(&mut self) -> Option<Row> {
        let values = self.result.as_ref()?.decode(self.position)?;
        self.position += 1;
        Some(Row::new(Arc::clone(&self.columns), values))
    }

    /// Move to row `index` so that the next fetch returns it.
    ///
    /// Seeking past the end is allowed; the next fetch then reports
    /// exhaustion.
    pub fn seek(&mut self, index: usize) {
        self.position = index;
    }

    /// Fetch one cell of the next row.
    ///
    /// `row` seeks before fetching. A NULL cell yields `on_null`. When no
    /// row is left, `on_no_more_rows` is returned if given, otherwise
    /// [`DbError::NoMoreRows`].
    pub fn fetch_field(
        &mut self,
        column: impl Into<ColumnRef>,
        row: Option<usize>,
        on_null: Value,
        on_no_more_rows: Option<Value>,
    ) -> DbResult<Value> {
        if let Some(index) = row {
            self.seek(index);
        }
        match self.next_cell(column.into())? {
            Cell::Value(value) => Ok(value),
            Cell::Null => Ok(on_null),
            Cell::Exhausted => on_no_more_rows.ok_or_else(|| DbError::no_more_rows(&self.sql)),
        }
    }

    pub fn fetch_as_string(
        &mut self,
        column: impl Into<ColumnRef>,
        on_null: String,
        on_no_more_rows: Option<String>,
    ) -> DbResult<String> {
        self.fetch_typed(column.into(), on_null, on_no_more_rows, Value::coerce_string)
    }

    pub fn fetch_as_bool(
        &mut self,
        column: impl Into<ColumnRef>,
        on_null: bool,
        on_no_more_rows: Option<bool>,
    ) -> DbResult<bool> {
        self.fetch_typed(column.into(), on_null, on_no_more_rows, Value::coerce_bool)
    }

    pub fn fetch_as_int(
        &mut self,
        column: impl Into<ColumnRef>,
        on_null: i64,
        on_no_more_rows: Option<i64>,
    ) -> DbResult<i64> {
        self.fetch_typed(column.into(), on_null, on_no_more_rows, Value::coerce_int)
    }

    pub fn fetch_as_float(
        &mut self,
        column: impl Into<ColumnRef>,
        on_null: f64,
        on_no_more_rows: Option<f64>,
    ) -> DbResult<f64> {
        self.fetch_typed(column.into(), on_null, on_no_more_rows, Value::coerce_float)
    }

    /// Fetch the only remaining row.
    ///
    /// Fails with [`DbError::NoMoreRows`] when nothing is left and with
    /// [`DbError::MultipleRows`] when more than one row is left.
    pub fn fetch_single(&mut self) -> DbResult<Row> {
        match self.remaining() {
            0 => Err(DbError::no_more_rows(&self.sql)),
            1 => self
                .fetch_next()
                .ok_or_else(|| DbError::no_more_rows(&self.sql)),
            count => Err(DbError::multiple_rows(&self.sql, count)),
        }
    }

    /// Fetch every remaining row.
    pub fn fetch_all(&mut self) -> Vec<Row> {
        self.by_ref().collect()
    }

    fn fetch_typed<T>(
        &mut self,
        column: ColumnRef,
        on_null: T,
        on_no_more_rows: Option<T>,
        coerce: fn(&Value) -> DbResult<T>,
    ) -> DbResult<T> {
        match self.next_cell(column)? {
            Cell::Value(value) => coerce(&value),
            Cell::Null => Ok(on_null),
            Cell::Exhausted => on_no_more_rows.ok_or_else(|| DbError::no_more_rows(&self.sql)),
        }
    }

    fn next_cell(&mut self, column: ColumnRef) -> DbResult<Cell> {
        let Some(row) = self.fetch_next() else {
            return Ok(Cell::Exhausted);
        };
        match row.get(column.clone()) {
            None => Err(DbError::unknown_column(column.to_string(), &self.sql)),
            Some(value) if value.is_null() => Ok(Cell::Null),
            Some(value) => Ok(Cell::Value(value.clone())),
        }
    }
}

impl Iterator for ResultCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetch_next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}
