//! Guarded transactions and read-only queries.
//!
//! A [`Transaction`] pairs an optional guard with an effect. The guard is a
//! cheap, side-effect-free predicate evaluated immediately before execution;
//! when it returns false the effect never runs. The effect receives a
//! [`TxContext`] bound to one open `SQLite` transaction and runs at most once
//! per `Transaction` value, no matter how many times it is submitted.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::{Connection, OptionalExtension, Params, Row, Statement};

use crate::errors::Result;

type Guard = Box<dyn Fn() -> bool + Send + Sync>;
type Effect = Box<dyn Fn(&TxContext<'_>) -> Result<()> + Send + Sync>;
type Reader<T> = Box<dyn Fn(&Connection) -> Result<T> + Send + Sync>;

/// What happened when a transaction was handed to the executor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The effect ran and its writes were committed.
    Executed,
    /// The guard returned false; nothing was written.
    Skipped,
    /// The effect had already run for this transaction value.
    AlreadyExecuted,
}

/// A unit of writes with an optional pre-execution guard.
pub struct Transaction {
    name: Cow<'static, str>,
    guard: Option<Guard>,
    effect: Effect,
    executed: AtomicBool,
}

impl Transaction {
    /// Create a transaction whose effect always runs.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, effect: F) -> Self
    where
        F: Fn(&TxContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            guard: None,
            effect: Box::new(effect),
            executed: AtomicBool::new(false),
        }
    }

    /// Attach a guard. The effect only runs when the guard returns true.
    #[must_use]
    pub fn with_guard<G>(mut self, guard: G) -> Self
    where
        G: Fn() -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    /// Name used in logs and fault reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the guard.
    pub fn should_be_executed(&self) -> bool {
        self.guard.as_ref().is_none_or(|guard| guard())
    }

    /// Whether the effect has been claimed by an executor.
    pub fn was_executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    /// Claim the single execution. Returns false if already claimed.
    pub(crate) fn claim(&self) -> bool {
        !self.executed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn perform_operations(&self, ctx: &TxContext<'_>) -> Result<()> {
        (self.effect)(ctx)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("name", &self.name)
            .field("guarded", &self.guard.is_some())
            .field("executed", &self.was_executed())
            .finish()
    }
}

/// Statement helpers available inside a transaction effect.
///
/// Every statement runs on the connection that owns the open transaction, so
/// all writes of one effect commit or roll back together.
pub struct TxContext<'c> {
    conn: &'c Connection,
}

impl<'c> TxContext<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Execute one statement. Returns true when at least one row was affected.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<bool> {
        Ok(self.conn.execute(sql, params)? > 0)
    }

    /// Execute one statement whose parameters are bound by `bind`.
    ///
    /// Returns true when at least one row was affected.
    pub fn execute_with<B>(&self, sql: &str, bind: B) -> Result<bool>
    where
        B: FnOnce(&mut Statement<'_>) -> rusqlite::Result<()>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        bind(&mut *stmt)?;
        Ok(stmt.raw_execute()? > 0)
    }

    /// Execute one statement once per item, reusing the prepared statement.
    ///
    /// Returns the total number of affected rows.
    pub fn execute_batch<T, I, B>(&self, sql: &str, items: I, mut bind: B) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
        B: FnMut(&mut Statement<'_>, T) -> rusqlite::Result<()>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut affected = 0;
        for item in items {
            bind(&mut *stmt, item)?;
            affected += stmt.raw_execute()?;
        }
        Ok(affected)
    }

    /// Read at most one row.
    pub fn query_row<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.conn.query_row(sql, params, map).optional()?)
    }

    /// Read every matching row.
    pub fn query_map<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, map)?.collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        self.conn
    }
}

/// A read-only operation producing a `T`.
pub struct Query<T> {
    name: Cow<'static, str>,
    read: Reader<T>,
}

impl<T> Query<T> {
    /// Create a query.
    pub fn new<F>(name: impl Into<Cow<'static, str>>, read: F) -> Self
    where
        F: Fn(&Connection) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            read: Box::new(read),
        }
    }

    /// Name used in logs and fault reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(&self, conn: &Connection) -> Result<T> {
        (self.read)(conn)
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query").field("name", &self.name).finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
