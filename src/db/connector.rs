//! Blocking connector over one native connection.
//!
//! A [`Connector`] owns a single sqlx connection plus the transaction nesting
//! counter, and drives every native call to completion on the shared I/O
//! runtime before returning. It connects lazily on first use and rolls back
//! and disconnects when dropped.

use crate::db::cursor::{NativeResult, ResultCursor};
use crate::db::diagnostics::{self, DiagnosticHook};
use crate::db::driver::{self, NativeConnection, postgres};
use crate::db::statement;
use crate::db::transaction::{TransactionDepth, Transition};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DriverKind, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, warn};

/// Build the runtime native calls are driven on.
pub fn new_runtime() -> DbResult<Arc<Runtime>> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(Arc::new)
        .map_err(|e| {
            DbError::infrastructure(
                format!("Failed to start I/O runtime: {}", e),
                "Check process limits for threads and file descriptors",
            )
        })
}

/// Drive `future` to completion.
///
/// Blocking inside an async runtime would deadlock or panic, so that is
/// rejected as an illegal state before the future is polled.
fn block_on<F: Future>(runtime: &Runtime, future: F) -> DbResult<F::Output> {
    if Handle::try_current().is_ok() {
        return Err(DbError::illegal_state(
            "blocking database call made from inside an async runtime",
        ));
    }
    Ok(runtime.block_on(future))
}

/// One logical database connection.
pub struct Connector {
    id: String,
    kind: DriverKind,
    config: ConnectionConfig,
    runtime: Arc<Runtime>,
    native: Option<NativeConnection>,
    depth: TransactionDepth,
    last_affected_rows: u64,
    last_insert_id: Option<i64>,
    server_version: Option<String>,
    hooks: Vec<Arc<dyn DiagnosticHook>>,
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("id", &self.id)
            .field("driver", &self.kind)
            .field("target", &self.config.masked())
            .field("connected", &self.native.is_some())
            .field("transaction_depth", &self.depth.depth())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Connector {
    /// Create a disconnected connector.
    pub fn new(
        id: impl Into<String>,
        kind: DriverKind,
        config: ConnectionConfig,
        runtime: Arc<Runtime>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            config,
            runtime,
            native: None,
            depth: TransactionDepth::new(),
            last_affected_rows: 0,
            last_insert_id: None,
            server_version: None,
            hooks: Vec::new(),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.id
    }

    /// Driver this connector talks to.
    pub fn driver(&self) -> DriverKind {
        self.kind
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Runtime the native connection is bound to, for use with
    /// [`internal_handler`](Self::internal_handler).
    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }

    /// Run `hook`'s probes whenever a statement fails with a code it matches.
    pub fn add_diagnostic_hook(&mut self, hook: Arc<dyn DiagnosticHook>) {
        self.hooks.push(hook);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn is_connected(&self) -> bool {
        self.native.is_some()
    }

    /// Open the native connection and apply session options in declaration
    /// order. Does nothing when already connected.
    pub fn connect(&mut self) -> DbResult<()> {
        if self.native.is_some() {
            return Ok(());
        }

        info!(
            connection_id = %self.id,
            driver = %self.kind,
            target = %self.config.masked(),
            "Connecting to database"
        );

        let mut native = block_on(&self.runtime, NativeConnection::open(self.kind, &self.config))?
            .map_err(|e| {
                DbError::infrastructure(
                    format!("Failed to connect: {}", e),
                    driver::connection_suggestion(self.kind, &e),
                )
            })?;

        for option in &self.config.session_options {
            let sql = driver::session_statement(self.kind, option);
            debug!(connection_id = %self.id, sql = %sql, "Applying session option");

            if let Err(e) = block_on(&self.runtime, native.submit(&sql))? {
                if let Ok(Err(close_err)) = block_on(&self.runtime, native.close()) {
                    debug!(connection_id = %self.id, error = %close_err, "Close after failed session option");
                }
                return Err(DbError::infrastructure(
                    format!("Failed to apply session option '{}': {}", option.key, e),
                    format!("Check that '{}' is a valid {} session setting", option.key, self.kind),
                ));
            }
        }

        self.native = Some(native);
        info!(connection_id = %self.id, "Connected successfully");
        Ok(())
    }

    /// Close the native connection. Safe to call when not connected.
    ///
    /// An open transaction is abandoned; the server rolls it back when the
    /// session ends.
    pub fn disconnect(&mut self) -> DbResult<()> {
        let Some(native) = self.native.take() else {
            return Ok(());
        };

        let open = self.depth.reset();
        if open > 0 {
            warn!(
                connection_id = %self.id,
                depth = open,
                "Disconnecting with an open transaction"
            );
        }
        self.server_version = None;

        info!(connection_id = %self.id, "Disconnecting");
        block_on(&self.runtime, native.close())?.map_err(DbError::from)
    }

    /// Roll back any open transaction, then disconnect.
    ///
    /// Both steps are attempted; the first failure is returned.
    pub fn shutdown(&mut self) -> DbResult<()> {
        let mut first_error = None;

        if self.native.is_some() && self.depth.is_active() {
            let depth = self.depth.reset();
            warn!(
                connection_id = %self.id,
                depth,
                "Rolling back open transaction before disconnect"
            );
            if let Err(e) = self.submit(driver::ROLLBACK) {
                first_error = Some(e);
            }
        }

        if let Err(e) = self.disconnect() {
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Explicit teardown: [`shutdown`](Self::shutdown) and consume the
    /// connector.
    pub fn close(mut self) -> DbResult<()> {
        self.shutdown()
    }

    // =========================================================================
    // Statement execution
    // =========================================================================

    /// Submit `sql` and return the native rows (if any) with the affected-row
    /// count.
    pub fn execute_raw(&mut self, sql: &str) -> DbResult<(Option<NativeResult>, u64)> {
        self.connect()?;
        debug!(connection_id = %self.id, sql = %sql, "Executing statement");

        let started = Instant::now();
        let native = self.native.as_mut().ok_or_else(not_connected)?;
        let outcome = block_on(&self.runtime, native.run(sql))?;
        self.log_if_slow(sql, started.elapsed());

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.translate(e, sql)),
        };

        let affected = statement::affected_rows(self.kind, sql, outcome.rows_affected);
        self.last_affected_rows = affected;
        if let Some(id) = outcome.last_insert_id {
            self.last_insert_id = Some(id);
        }
        Ok((outcome.result, affected))
    }

    /// Run `sql` and wrap its rows in a cursor.
    pub fn query(&mut self, sql: &str) -> DbResult<ResultCursor> {
        let (result, affected) = self.execute_raw(sql)?;
        let last_insert_id = match self.kind {
            DriverKind::Postgres => None,
            DriverKind::MySql | DriverKind::Sqlite => self.last_insert_id,
        };
        Ok(ResultCursor::new(
            self.id.clone(),
            self.kind,
            sql,
            result,
            affected,
            last_insert_id,
        ))
    }

    /// Run `sql`, discard any rows and return the affected-row count.
    pub fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let (_, affected) = self.execute_raw(sql)?;
        Ok(affected)
    }

    /// Affected-row count of the last `execute_raw`.
    pub fn last_affected_rows(&self) -> u64 {
        self.last_affected_rows
    }

    /// Last generated key on this connection.
    ///
    /// MySQL and SQLite report it with the statement; PostgreSQL is asked for
    /// `lastval()`, and `None` is returned when no sequence was used yet.
    /// Inside a transaction the PostgreSQL lookup runs under a savepoint so
    /// its failure leaves the transaction usable.
    pub fn last_insert_id(&mut self) -> DbResult<Option<i64>> {
        if self.kind != DriverKind::Postgres {
            return Ok(self.last_insert_id);
        }

        let guarded = self.depth.is_active();
        if guarded {
            self.submit(postgres::LAST_INSERT_ID_SAVEPOINT)?;
        }

        self.connect()?;
        let native = self.native.as_mut().ok_or_else(not_connected)?;
        let outcome = block_on(&self.runtime, native.run(postgres::LAST_INSERT_ID_QUERY))?;

        let value = match outcome {
            Ok(outcome) => {
                first_cell(outcome.result.as_ref()).and_then(|v| v.coerce_int().ok())
            }
            Err(e) => {
                let err = DbError::from(e).with_sql(postgres::LAST_INSERT_ID_QUERY);
                if guarded {
                    self.submit(postgres::LAST_INSERT_ID_ROLLBACK)?;
                    self.submit(postgres::LAST_INSERT_ID_RELEASE)?;
                }
                return if err.native_code() == Some(postgres::OBJECT_NOT_IN_PREREQUISITE_STATE) {
                    Ok(None)
                } else {
                    Err(err)
                };
            }
        };

        if guarded {
            self.submit(postgres::LAST_INSERT_ID_RELEASE)?;
        }
        Ok(value)
    }

    // =========================================================================
    // Server metadata
    // =========================================================================

    /// Server version string, queried once per connection.
    pub fn server_version(&mut self) -> DbResult<String> {
        if let Some(version) = &self.server_version {
            return Ok(version.clone());
        }

        self.connect()?;
        let query = driver::version_query(self.kind);
        let native = self.native.as_mut().ok_or_else(not_connected)?;
        let outcome = block_on(&self.runtime, native.run(query))?
            .map_err(|e| DbError::from(e).with_sql(query))?;
        let version = first_cell(outcome.result.as_ref())
            .ok_or_else(|| DbError::no_more_rows(query))?
            .coerce_string()?;

        debug!(connection_id = %self.id, version = %version, "Server version");
        self.server_version = Some(version.clone());
        Ok(version)
    }

    /// Numeric server version: `major * 10000 + minor * 100 + patch`.
    pub fn version_id(&mut self) -> DbResult<u32> {
        Ok(driver::parse_version_id(&self.server_version()?))
    }

    /// Escape hatch to the native connection, connecting first if needed.
    ///
    /// Drive futures on it with [`runtime`](Self::runtime). Issuing
    /// transaction commands here bypasses the nesting counter.
    pub fn internal_handler(&mut self) -> DbResult<&mut NativeConnection> {
        self.connect()?;
        self.native.as_mut().ok_or_else(not_connected)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn is_in_transaction(&self) -> bool {
        self.depth.is_active()
    }

    pub fn transaction_depth(&self) -> u32 {
        self.depth.depth()
    }

    /// Open a transaction level. Only the outermost level starts a native
    /// transaction.
    pub fn begin(&mut self) -> DbResult<()> {
        if self.depth.enter()? == Transition::Nested {
            debug!(connection_id = %self.id, depth = self.depth.depth(), "Nested begin");
            return Ok(());
        }

        if let Err(e) = self.submit(driver::begin_statement(self.kind)) {
            self.depth.revert_enter();
            return Err(e);
        }
        debug!(connection_id = %self.id, "Transaction started");
        Ok(())
    }

    /// Close a transaction level. Only the outermost level commits natively;
    /// at depth 0 this logs a warning and does nothing.
    ///
    /// A failed native commit leaves the transaction open at depth 1.
    pub fn commit(&mut self) -> DbResult<()> {
        self.leave(driver::COMMIT)
    }

    /// Close a transaction level. Only the outermost level rolls back
    /// natively; inner levels just decrement the counter and their work stays
    /// part of the outer transaction. At depth 0 this logs a warning and does
    /// nothing.
    pub fn rollback(&mut self) -> DbResult<()> {
        self.leave(driver::ROLLBACK)
    }

    /// Run `task` inside `begin`/`commit`.
    ///
    /// If `task` or the commit fails, the level is rolled back and that error
    /// is returned unchanged; a failing rollback is only logged.
    pub fn transaction<T, E, F>(&mut self, task: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.begin()?;
        match task(self) {
            Ok(value) => match self.commit() {
                Ok(()) => Ok(value),
                Err(commit_err) => {
                    self.rollback_after_failure("commit");
                    Err(commit_err.into())
                }
            },
            Err(err) => {
                self.rollback_after_failure("transaction task");
                Err(err)
            }
        }
    }

    fn rollback_after_failure(&mut self, failed: &'static str) {
        if let Err(rollback_err) = self.rollback() {
            warn!(
                connection_id = %self.id,
                error = %rollback_err,
                "Rollback after failed {} failed",
                failed
            );
        }
    }

    fn leave(&mut self, command: &'static str) -> DbResult<()> {
        match self.depth.leave() {
            None => {
                warn!(
                    connection_id = %self.id,
                    command,
                    "No transaction to {}",
                    command.to_lowercase()
                );
                Ok(())
            }
            Some(Transition::Nested) => {
                debug!(
                    connection_id = %self.id,
                    command,
                    depth = self.depth.depth(),
                    "Nested transaction level closed"
                );
                Ok(())
            }
            Some(Transition::Native) => {
                if let Err(e) = self.submit(command) {
                    self.depth.revert_leave();
                    return Err(e);
                }
                debug!(connection_id = %self.id, command, "Transaction finished");
                Ok(())
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Run a control statement without touching the affected-row counters.
    fn submit(&mut self, sql: &str) -> DbResult<()> {
        self.connect()?;
        let native = self.native.as_mut().ok_or_else(not_connected)?;
        block_on(&self.runtime, native.submit(sql))?.map_err(|e| self.translate(e, sql))
    }

    fn log_if_slow(&self, sql: &str, elapsed: Duration) {
        let Some(threshold) = self.config.slow_query_ms else {
            return;
        };
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if elapsed_ms > threshold {
            warn!(
                connection_id = %self.id,
                elapsed_ms,
                threshold_ms = threshold,
                sql = %sql,
                "Slow query"
            );
        }
    }

    /// Translate a native failure and run matching diagnostic hooks.
    fn translate(&mut self, err: sqlx::Error, sql: &str) -> DbError {
        let err = DbError::from(err).with_sql(sql);
        let Some(code) = err.native_code().map(str::to_string) else {
            return err;
        };

        let hooks: Vec<_> = self
            .hooks
            .iter()
            .filter(|hook| hook.matches(&code))
            .cloned()
            .collect();
        if hooks.is_empty() {
            return err;
        }

        warn!(
            connection_id = %self.id,
            code = %code,
            "Statement failed; collecting diagnostics"
        );
        let mut report = String::new();
        for hook in &hooks {
            for probe in hook.probes() {
                report.push_str(&self.run_probe(probe));
            }
        }
        diagnostics::attach(err, &report)
    }

    fn run_probe(&mut self, probe: &str) -> String {
        let Some(native) = self.native.as_mut() else {
            return diagnostics::probe_failed(probe, &"not connected");
        };
        match block_on(&self.runtime, native.run(probe)) {
            Ok(Ok(outcome)) => diagnostics::format_probe(probe, outcome.result.as_ref()),
            Ok(Err(e)) => diagnostics::probe_failed(probe, &e),
            Err(e) => diagnostics::probe_failed(probe, &e),
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if self.native.is_none() {
            return;
        }

        if Handle::try_current().is_ok() {
            warn!(
                connection_id = %self.id,
                "Connector dropped inside an async runtime; closing without rollback"
            );
            self.depth.reset();
            self.native = None;
            return;
        }

        if let Err(e) = self.shutdown() {
            warn!(connection_id = %self.id, error = %e, "Connector teardown failed");
        }
    }
}

fn not_connected() -> DbError {
    DbError::illegal_state("connector is not connected")
}

fn first_cell(result: Option<&NativeResult>) -> Option<Value> {
    result?
        .decode(0)?
        .into_iter()
        .next()
        .filter(|value| !value.is_null())
}
