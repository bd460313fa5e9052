//! Database handle and transaction executor.
//!
//! [`Database`] owns the connection pool (behind a [`ConnectionSlot`] the
//! keep-alive can swap), tracks the lifecycle [`DbState`], and executes
//! [`Transaction`]s and [`Query`]s. Every operation checks out its own pooled
//! connection; nothing holds a connection between operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, TransactionBehavior};
use tally_core::{ErrorReporter, Severity, TracingReporter};
use tally_settings::DatabaseSettings;
use tracing::{debug, info, warn};

use crate::errors::{DbOpError, Result, StoreError};
use crate::keeper::{ConnectionKeeper, ConnectionSlot};
use crate::patches::{self, Patch, PatchRunner, PatchSummary};
use crate::sqlite::connection::{self, open_pool};
use crate::sqlite::schema;
use crate::sqlite::{ConnectionConfig, ConnectionPool, DbSource, PooledConnection};
use crate::transaction::{Outcome, Query, Transaction, TxContext};

const ORIGIN: &str = "database";

/// Lifecycle state of a [`Database`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbState {
    /// Not accepting operations.
    Closed,
    /// Schema patches are running.
    Patching,
    /// Accepting operations.
    Open,
    /// Shutting down.
    Closing,
}

impl DbState {
    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Patching => "patching",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for DbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Inner {
    source: DbSource,
    config: ConnectionConfig,
    slot: Arc<ConnectionSlot<ConnectionPool>>,
    state: RwLock<DbState>,
    reporter: Arc<dyn ErrorReporter>,
    keeper: Mutex<Option<ConnectionKeeper<ConnectionPool>>>,
    patch_summary: Mutex<PatchSummary>,
}

/// Shared handle to an open database. Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Open `source`, create missing tables, and apply every declared patch.
    ///
    /// Connection and schema failures are reported as fatal and returned; the
    /// caller must not enable anything that depends on storage.
    pub fn open(
        source: DbSource,
        config: ConnectionConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> std::result::Result<Self, StoreError> {
        Self::open_with_patches(source, config, reporter, patches::all_patches())
    }

    /// Open using the database section of the settings.
    pub fn from_settings(
        settings: &DatabaseSettings,
        reporter: Arc<dyn ErrorReporter>,
    ) -> std::result::Result<Self, StoreError> {
        Self::open(
            DbSource::from_settings(settings),
            ConnectionConfig::from(settings),
            reporter,
        )
    }

    /// Private in-memory database reporting through `tracing`.
    pub fn in_memory() -> std::result::Result<Self, StoreError> {
        Self::open(
            DbSource::Memory,
            ConnectionConfig::default(),
            Arc::new(TracingReporter),
        )
    }

    /// Open `source` with an explicit patch list.
    pub fn open_with_patches(
        source: DbSource,
        config: ConnectionConfig,
        reporter: Arc<dyn ErrorReporter>,
        patches: Vec<Box<dyn Patch>>,
    ) -> std::result::Result<Self, StoreError> {
        info!(%source, "opening database");
        let pool = open_pool(&source, &config).map_err(|e| {
            let fault = StoreError::init(format!("cannot open {source}"), e);
            reporter.report(Severity::Fatal, ORIGIN, &fault);
            fault
        })?;

        let db = Self {
            inner: Arc::new(Inner {
                source,
                config,
                slot: Arc::new(ConnectionSlot::new(pool)),
                state: RwLock::new(DbState::Patching),
                reporter,
                keeper: Mutex::new(None),
                patch_summary: Mutex::new(PatchSummary::default()),
            }),
        };

        if let Err(fault) = db.prepare_schema(patches) {
            db.set_state(DbState::Closed);
            return Err(fault);
        }
        db.set_state(DbState::Open);
        info!(source = %db.inner.source, "database open");
        Ok(db)
    }

    fn prepare_schema(&self, patches: Vec<Box<dyn Patch>>) -> std::result::Result<(), StoreError> {
        let conn = self.checkout().map_err(|e| self.init_fault("no connection for schema setup", e))?;
        schema::create_tables(&conn).map_err(|e| self.init_fault("cannot create tables", e))?;
        let summary = PatchRunner::new(patches, Arc::clone(&self.inner.reporter)).run(&conn)?;
        *self.inner.patch_summary.lock() = summary;
        Ok(())
    }

    fn init_fault(&self, message: &str, source: DbOpError) -> StoreError {
        let fault = StoreError::init(message, source);
        self.inner.reporter.report(Severity::Fatal, ORIGIN, &fault);
        fault
    }

    /// Start the keep-alive thread probing every `interval`.
    ///
    /// On a failed probe the keeper reopens the pool once from the same
    /// source, see [`reopen`]. Calling this while a keeper is running does
    /// nothing.
    pub fn start_keep_alive(&self, interval: Duration) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.keeper.lock();
        if guard.is_some() {
            return Ok(());
        }
        let source = self.inner.source.clone();
        let config = self.inner.config.clone();
        let reporter = Arc::clone(&self.inner.reporter);
        let mut keeper = ConnectionKeeper::new(
            Arc::clone(&self.inner.slot),
            connection::probe,
            move || reopen(&source, &config, &reporter),
            Arc::clone(&self.inner.reporter),
        );
        keeper
            .start(interval)
            .map_err(|e| self.init_fault("cannot start keep-alive thread", DbOpError::Io(e)))?;
        *guard = Some(keeper);
        Ok(())
    }

    /// Stop accepting operations and stop the keep-alive thread.
    pub fn close(&self) {
        if self.state() == DbState::Closed {
            return;
        }
        self.set_state(DbState::Closing);
        if let Some(mut keeper) = self.inner.keeper.lock().take() {
            keeper.stop();
        }
        self.set_state(DbState::Closed);
        info!(source = %self.inner.source, "database closed");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DbState {
        *self.inner.state.read()
    }

    /// Where this database lives.
    pub fn source(&self) -> &DbSource {
        &self.inner.source
    }

    /// Reporter faults from this database go to.
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.inner.reporter
    }

    /// What the startup patch run did.
    pub fn patch_summary(&self) -> PatchSummary {
        self.inner.patch_summary.lock().clone()
    }

    /// Whether the keep-alive gave up after a failed reconnect.
    pub fn keep_alive_cancelled(&self) -> bool {
        self.inner
            .keeper
            .lock()
            .as_ref()
            .is_some_and(ConnectionKeeper::is_cancelled)
    }

    /// Execute `transaction`.
    ///
    /// The guard is evaluated first; a false guard skips without touching the
    /// database. Otherwise the effect runs inside one `SQLite` transaction that
    /// commits on success and rolls back on any failure. The effect runs at
    /// most once per `Transaction` value.
    pub fn execute(&self, transaction: &Transaction) -> Result<Outcome> {
        if !transaction.should_be_executed() {
            debug!(transaction = transaction.name(), "guard declined, skipping");
            return Ok(Outcome::Skipped);
        }
        self.ensure_open()?;

        let mut conn = self.checkout()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !transaction.claim() {
            debug!(transaction = transaction.name(), "already executed");
            return Ok(Outcome::AlreadyExecuted);
        }
        if let Err(e) = transaction.perform_operations(&TxContext::new(&tx)) {
            warn!(transaction = transaction.name(), error = %e, "transaction rolled back");
            return Err(e);
        }
        tx.commit()?;
        debug!(transaction = transaction.name(), "transaction committed");
        Ok(Outcome::Executed)
    }

    /// Run a read-only query on its own connection.
    pub fn query<T>(&self, query: &Query<T>) -> Result<T> {
        self.ensure_open()?;
        let conn = self.checkout()?;
        let result = query.run(&conn);
        if let Err(e) = &result {
            warn!(query = query.name(), error = %e, "query failed");
        }
        result
    }

    /// Run `f` with a checked-out connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let conn = self.checkout()?;
        f(&conn)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            DbState::Open => Ok(()),
            other => Err(DbOpError::NotOpen(other)),
        }
    }

    fn checkout(&self) -> Result<PooledConnection> {
        Ok(self.inner.slot.current().get()?)
    }

    fn set_state(&self, next: DbState) {
        let mut state = self.inner.state.write();
        debug!(from = state.as_str(), to = next.as_str(), "database state change");
        *state = next;
    }
}

/// Open a replacement pool for `source` with the schema fully in place.
///
/// An in-memory database cannot be reopened: a fresh pool would be a
/// different, empty database.
pub fn reopen(
    source: &DbSource,
    config: &ConnectionConfig,
    reporter: &Arc<dyn ErrorReporter>,
) -> Result<ConnectionPool> {
    if matches!(source, DbSource::Memory) {
        return Err(DbOpError::CannotReopen(source.clone()));
    }
    let pool = open_pool(source, config)?;
    {
        let conn = pool.get()?;
        schema::create_tables(&conn)?;
        let _ = PatchRunner::new(patches::all_patches(), Arc::clone(reporter))
            .run(&conn)
            .map_err(|fault| match fault {
                StoreError::Migration { source, .. } => source,
                other => DbOpError::InvalidData(other.to_string()),
            })?;
    }
    Ok(pool)
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("source", &self.inner.source)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
