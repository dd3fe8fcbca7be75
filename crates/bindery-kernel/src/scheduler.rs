use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use bindery_store::{BindingStore, Transaction};

use crate::error::{KernelError, KernelResult};

/// A unit of work run later in its own transaction.
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, txn: &Transaction) -> KernelResult<()>;
}

pub trait TaskScheduler: Send + Sync {
    /// Queue `task` to run in a new transaction once `txn` commits. Nothing
    /// is queued if `txn` aborts.
    fn schedule(&self, txn: &Transaction, task: Box<dyn Task>, durable: bool) -> KernelResult<()>;
}

struct Scheduled {
    task: Box<dyn Task>,
    durable: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub completed: usize,
    pub failed: usize,
    /// Re-runs after a conflict or timeout, across all tasks.
    pub retries: usize,
    /// Durable tasks put back on the queue after running out of retries.
    pub requeued: usize,
}

impl TaskReport {
    fn merge(&mut self, other: TaskReport) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.retries += other.retries;
        self.requeued += other.requeued;
    }
}

/// FIFO scheduler that runs each task in a fresh, retried transaction.
#[derive(Clone)]
pub struct TxnScheduler {
    store: BindingStore,
    queue: Arc<Mutex<VecDeque<Scheduled>>>,
    accepting: Arc<AtomicBool>,
    max_retries: u32,
}

impl std::fmt::Debug for TxnScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnScheduler")
            .field("pending", &self.pending())
            .field("accepting", &self.accepting.load(Ordering::SeqCst))
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl TxnScheduler {
    pub fn new(store: BindingStore, max_retries: u32) -> Self {
        Self {
            store,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            accepting: Arc::new(AtomicBool::new(true)),
            max_retries,
        }
    }

    pub fn pending(&self) -> usize {
        self.lock_queue().len()
    }

    /// Refuse all further scheduling. Queued tasks can still be run.
    pub fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        log::debug!("scheduler shut down with {} pending task(s)", self.pending());
    }

    pub fn is_shut_down(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }

    /// Run queued tasks on the calling thread until the queue is empty. Tasks
    /// scheduled by running tasks are picked up in the same call; a requeued
    /// durable task waits for the next call.
    pub fn run_pending(&self) -> TaskReport {
        let mut report = TaskReport::default();
        let mut deferred = Vec::new();
        while let Some(item) = self.pop() {
            if let Some(item) = self.execute(item, &mut report) {
                deferred.push(item);
            }
        }
        self.requeue(deferred);
        report
    }

    /// Like [`run_pending`](Self::run_pending) but drains the queue with
    /// `workers` threads.
    pub fn run_with_workers(&self, workers: usize) -> TaskReport {
        if workers <= 1 {
            return self.run_pending();
        }
        let total = Mutex::new(TaskReport::default());
        let deferred = Mutex::new(Vec::new());
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut report = TaskReport::default();
                    while let Some(item) = self.pop() {
                        if let Some(item) = self.execute(item, &mut report) {
                            lock(&deferred).push(item);
                        }
                    }
                    lock(&total).merge(report);
                });
            }
        });
        self.requeue(deferred.into_inner().unwrap_or_else(PoisonError::into_inner));
        total.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the task when it should go back on the queue.
    fn execute(&self, item: Scheduled, report: &mut TaskReport) -> Option<Scheduled> {
        let name = item.task.name().to_string();
        let (result, retries) =
            retrying(&self.store, self.max_retries, &name, |txn| item.task.run(txn));
        report.retries += retries as usize;
        match result {
            Ok(()) => {
                report.completed += 1;
                log::debug!("task '{name}' completed");
                None
            }
            Err(err) if item.durable && err.is_retryable() => {
                report.requeued += 1;
                log::warn!("durable task '{name}' out of retries ({err}); requeued");
                Some(item)
            }
            Err(err) => {
                report.failed += 1;
                log::warn!("task '{name}' failed: {err}");
                None
            }
        }
    }

    fn pop(&self) -> Option<Scheduled> {
        self.lock_queue().pop_front()
    }

    fn requeue(&self, items: Vec<Scheduled>) {
        if !items.is_empty() {
            self.lock_queue().extend(items);
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, VecDeque<Scheduled>> {
        lock(&self.queue)
    }
}

impl TaskScheduler for TxnScheduler {
    fn schedule(&self, txn: &Transaction, task: Box<dyn Task>, durable: bool) -> KernelResult<()> {
        if self.is_shut_down() {
            return Err(KernelError::SchedulingFailure {
                task: task.name().to_string(),
                reason: "scheduler is shut down".into(),
            });
        }
        let queue = self.queue.clone();
        txn.on_commit(move || lock(&queue).push_back(Scheduled { task, durable }))?;
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `work` in a new transaction and commit it, starting over in a fresh
/// transaction after a conflict or timeout, at most `max_retries` times.
pub fn run_transaction<T>(
    store: &BindingStore,
    max_retries: u32,
    name: &str,
    work: impl FnMut(&Transaction) -> KernelResult<T>,
) -> KernelResult<T> {
    retrying(store, max_retries, name, work).0
}

fn retrying<T>(
    store: &BindingStore,
    max_retries: u32,
    name: &str,
    mut work: impl FnMut(&Transaction) -> KernelResult<T>,
) -> (KernelResult<T>, u32) {
    let mut retries = 0;
    loop {
        let txn = store.begin();
        let outcome = match work(&txn) {
            Ok(value) => txn.commit().map(|_| value).map_err(KernelError::from),
            Err(err) => Err(err),
        };
        let err = match outcome {
            Ok(value) => return (Ok(value), retries),
            Err(err) => err,
        };
        txn.abort();
        if !err.is_retryable() || retries >= max_retries {
            return (Err(err), retries);
        }
        retries += 1;
        log::warn!("'{name}' aborted: {err}; retry {retries}/{max_retries}");
    }
}
