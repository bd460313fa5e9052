#![allow(missing_docs, unused_results)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::{Condvar, Mutex};
use tally_core::{MemoryReporter, ServerUuid, Severity};
use tally_store::records::ServerInfo;
use tally_store::{
    ConnectionConfig, Database, DbSource, Outcome, Transaction, queries, transactions,
};
use tally_tasks::{Priority, ProcessorConfig, TaskError, TaskProcessor};

fn config(critical_workers: usize, grace: Duration) -> ProcessorConfig {
    ProcessorConfig {
        critical_workers,
        non_critical_workers: 1,
        critical_grace: grace,
        termination_check: Duration::from_secs(1),
    }
}

struct Gate {
    open: Mutex<bool>,
    cvar: Condvar,
}

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(false),
            cvar: Condvar::new(),
        })
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cvar.wait(&mut open);
        }
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.cvar.notify_all();
    }
}

#[test]
fn expired_grace_finishes_every_critical_task_inline() {
    let reporter = Arc::new(MemoryReporter::new());
    let tasks = TaskProcessor::start(config(1, Duration::ZERO), reporter.clone()).unwrap();
    let seen = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let seen = Arc::clone(&seen);
            tasks.submit(Priority::Critical, format!("write-{i}"), move || {
                thread::sleep(Duration::from_millis(20));
                seen.lock().insert(i);
                Ok(i)
            })
        })
        .collect();

    let report = tasks.shutdown();
    assert!(!report.drained);
    assert!(report.finished_inline >= 1);
    assert_eq!(seen.lock().len(), 10);
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.wait().unwrap(), i);
    }
    assert!(reporter.is_empty());
}

#[test]
fn queued_background_work_is_cancelled() {
    let reporter = Arc::new(MemoryReporter::new());
    let tasks = TaskProcessor::start(config(1, Duration::from_secs(3)), reporter.clone()).unwrap();
    let gate = Gate::new();
    let started = Arc::new(AtomicUsize::new(0));

    let blocker = {
        let gate = Arc::clone(&gate);
        let started = Arc::clone(&started);
        tasks.submit(Priority::NonCritical, "slow report", move || {
            started.fetch_add(1, Ordering::SeqCst);
            gate.wait();
            Ok(())
        })
    };
    while started.load(Ordering::SeqCst) == 0 {
        thread::sleep(Duration::from_millis(1));
    }
    let queued: Vec<_> = (0..5)
        .map(|i| tasks.submit(Priority::NonCritical, format!("refresh-{i}"), || Ok(())))
        .collect();

    let report = tasks.shutdown();
    assert_eq!(report.cancelled, 5);
    assert_eq!(report.detached, 1);
    for handle in queued {
        assert_matches!(handle.wait(), Err(TaskError::Cancelled { .. }));
    }

    gate.release();
    blocker.wait().unwrap();
}

#[test]
fn failing_inline_task_does_not_abort_shutdown() {
    let reporter = Arc::new(MemoryReporter::new());
    let tasks = TaskProcessor::start(config(1, Duration::ZERO), reporter.clone()).unwrap();
    let gate = Gate::new();
    let counter = Arc::new(AtomicUsize::new(0));

    let blocker = {
        let gate = Arc::clone(&gate);
        tasks.submit(Priority::Critical, "held", move || {
            gate.wait();
            Ok(())
        })
    };
    let broken = tasks.submit::<(), _>(Priority::Critical, "broken", || panic!("bad write"));
    let after = {
        let counter = Arc::clone(&counter);
        tasks.submit(Priority::Critical, "after", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    };

    let releaser = {
        let gate = Arc::clone(&gate);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            gate.release();
        })
    };
    let report = tasks.shutdown();
    releaser.join().unwrap();

    assert!(!report.drained);
    assert_matches!(broken.wait(), Err(TaskError::Panicked { .. }));
    after.wait().unwrap();
    blocker.wait().unwrap();
    assert!(counter.load(Ordering::SeqCst) >= 1);
    assert!(reporter.count(Severity::Error) >= 1);
}

#[test]
fn critical_transactions_apply_once_across_forced_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(
        DbSource::File(dir.path().join("tasks.db")),
        ConnectionConfig::default(),
        Arc::new(MemoryReporter::new()),
    )
    .unwrap();
    let server = ServerUuid::random();
    db.execute(&transactions::store_server(ServerInfo {
        uuid: server,
        name: "Lobby".into(),
        web_address: None,
        max_players: 50,
    }))
    .unwrap();

    let reporter = Arc::new(MemoryReporter::new());
    let tasks = TaskProcessor::start(config(2, Duration::ZERO), reporter.clone()).unwrap();
    let handles: Vec<_> = (0..20)
        .map(|_| {
            tasks.submit_transaction(
                Priority::Critical,
                &db,
                transactions::store_command_usage(server, "/spawn"),
            )
        })
        .collect();
    let _ = tasks.shutdown();

    for handle in handles {
        assert_matches!(
            handle.wait(),
            Ok(Outcome::Executed | Outcome::AlreadyExecuted)
        );
    }
    assert_eq!(db.query(&queries::command_usage(server)).unwrap()["/spawn"], 20);
    assert!(reporter.is_empty());
}

#[test]
fn slow_critical_write_commits_before_shutdown_returns() {
    let db = Database::open(
        DbSource::Memory,
        ConnectionConfig {
            connection_timeout: Duration::from_millis(200),
            ..Default::default()
        },
        Arc::new(MemoryReporter::new()),
    )
    .unwrap();
    let reporter = Arc::new(MemoryReporter::new());
    let tasks = TaskProcessor::start(
        ProcessorConfig {
            critical_workers: 1,
            non_critical_workers: 1,
            critical_grace: Duration::from_millis(50),
            termination_check: Duration::from_millis(50),
        },
        reporter.clone(),
    )
    .unwrap();

    let slow = Transaction::new("slow_server", |ctx| {
        thread::sleep(Duration::from_millis(800));
        ctx.execute(
            "INSERT INTO plan_servers (uuid, name) VALUES ('slow', 'slow')",
            [],
        )?;
        Ok(())
    });
    let handle = tasks.submit_transaction(Priority::Critical, &db, slow);
    thread::sleep(Duration::from_millis(20));
    let report = tasks.shutdown();

    assert!(!report.drained);
    assert_eq!(report.finished_inline, 0);
    assert_eq!(report.detached, 0);
    let servers = db
        .with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM plan_servers", [], |r| r.get::<_, i64>(0))?)
        })
        .unwrap();
    assert_eq!(servers, 1);
    assert_matches!(handle.wait(), Ok(Outcome::Executed));
    assert!(reporter.is_empty());
}
