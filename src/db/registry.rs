//! Connector registry.
//!
//! Maps logical connection ids to connectors. Each id is resolved once: the
//! configuration is looked up, the driver identifier is normalised and
//! resolved through the alias table, and the resulting connector is cached.
//! Connectors connect lazily, on their first statement.

use crate::config::ConfigSource;
use crate::db::connector::{Connector, new_runtime};
use crate::db::diagnostics::MySqlLockDiagnostics;
use crate::error::{DbError, DbResult};
use crate::models::DriverKind;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::{info, warn};

/// Connector handle shared between the registry and its callers.
///
/// The mutex serialises access to the native connection and the nesting
/// counter.
pub type SharedConnector = Arc<Mutex<Connector>>;

/// Built-in driver aliases.
const DEFAULT_ALIASES: &[(&str, DriverKind)] = &[
    ("mysql", DriverKind::MySql),
    ("mariadb", DriverKind::MySql),
    ("pgsql", DriverKind::Postgres),
    ("postgres", DriverKind::Postgres),
    ("postgresql", DriverKind::Postgres),
    ("sqlite", DriverKind::Sqlite),
    ("sqlite3", DriverKind::Sqlite),
];

/// Strip leading path separators and case-fold a driver identifier.
pub fn normalize_driver(identifier: &str) -> String {
    identifier
        .trim()
        .trim_start_matches(['/', '\\'])
        .to_lowercase()
}

pub struct ConnectorRegistry {
    source: Box<dyn ConfigSource>,
    aliases: RwLock<HashMap<String, DriverKind>>,
    connectors: Mutex<HashMap<String, SharedConnector>>,
    runtime: Arc<Runtime>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("connectors", &self.connector_ids())
            .finish()
    }
}

impl ConnectorRegistry {
    /// Create a registry with its own I/O runtime.
    pub fn new(source: impl ConfigSource + 'static) -> DbResult<Self> {
        Ok(Self::with_runtime(source, new_runtime()?))
    }

    /// Create a registry whose connectors run on `runtime`.
    ///
    /// The runtime must not be the one the calling thread is executing on.
    pub fn with_runtime(source: impl ConfigSource + 'static, runtime: Arc<Runtime>) -> Self {
        let aliases = DEFAULT_ALIASES
            .iter()
            .map(|(alias, kind)| (alias.to_string(), *kind))
            .collect();
        Self {
            source: Box::new(source),
            aliases: RwLock::new(aliases),
            connectors: Mutex::new(HashMap::new()),
            runtime,
        }
    }

    /// Get the connector for `id`, or for the default connection when `id`
    /// is `None`. Repeated calls return the same instance.
    pub fn resolve(&self, id: Option<&str>) -> DbResult<SharedConnector> {
        let id = match id {
            Some(id) => id.to_string(),
            None => self
                .source
                .default_connection_id()
                .ok_or(DbError::NoDefaultConfigured)?,
        };

        let mut connectors = self.connectors.lock();
        if let Some(existing) = connectors.get(&id) {
            return Ok(Arc::clone(existing));
        }

        let config = self
            .source
            .connection_config(&id)
            .ok_or_else(|| DbError::no_such_connection_config(&id))?;
        config.validate()?;
        let kind = self.resolve_driver(&config.connector)?;

        let mut connector = Connector::new(id.clone(), kind, config, Arc::clone(&self.runtime));
        if kind == DriverKind::MySql {
            connector.add_diagnostic_hook(Arc::new(MySqlLockDiagnostics));
        }

        info!(
            connection_id = %id,
            driver = %kind,
            target = %connector.config().masked(),
            "Registered connector"
        );

        let shared = Arc::new(Mutex::new(connector));
        connectors.insert(id, Arc::clone(&shared));
        Ok(shared)
    }

    /// Resolve a driver identifier through the alias table, falling back to
    /// the canonical driver names.
    pub fn resolve_driver(&self, identifier: &str) -> DbResult<DriverKind> {
        let normalized = normalize_driver(identifier);
        if let Some(kind) = self.aliases.read().get(&normalized) {
            return Ok(*kind);
        }
        DriverKind::ALL
            .into_iter()
            .find(|kind| kind.canonical_name() == normalized)
            .ok_or_else(|| DbError::unknown_driver(identifier))
    }

    /// Add or replace a driver alias.
    pub fn register_alias(&self, alias: &str, kind: DriverKind) {
        self.aliases.write().insert(normalize_driver(alias), kind);
    }

    /// Tear down and forget the connector for `id`.
    ///
    /// Returns `false` if `id` was never resolved. Callers still holding the
    /// handle keep a disconnected connector that reconnects on next use.
    pub fn release(&self, id: &str) -> DbResult<bool> {
        let removed = self.connectors.lock().remove(id);
        match removed {
            Some(shared) => {
                info!(connection_id = %id, "Releasing connector");
                shared.lock().shutdown()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Tear down every connector, returning the failures by id.
    pub fn close_all(&self) -> Vec<(String, DbError)> {
        let drained: Vec<_> = self.connectors.lock().drain().collect();
        let mut failures = Vec::new();
        for (id, shared) in drained {
            info!(connection_id = %id, "Closing connector");
            if let Err(e) = shared.lock().shutdown() {
                failures.push((id, e));
            }
        }
        failures
    }

    /// Ids of the connectors resolved so far, sorted.
    pub fn connector_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.connectors.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.connectors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.lock().is_empty()
    }
}

impl Drop for ConnectorRegistry {
    fn drop(&mut self) {
        for (id, e) in self.close_all() {
            warn!(connection_id = %id, error = %e, "Connector teardown failed");
        }
    }
}
