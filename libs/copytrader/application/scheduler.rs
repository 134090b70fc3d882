//! Periodic tick scheduler and worker pool
//!
//! Every running task gets a repeating tick at a fixed cadence,
//! delivered at-least-once into a bounded queue drained by a small pool
//! of workers. Delivery is best-effort by design: a full queue or a
//! dropped tick is healed by the next period, and the per-task lock
//! keeps redeliveries single-flight.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{CopyEngine, TickOutcome};

/// Attempts per delivered tick before it is dropped.
const TICK_RETRY_ATTEMPTS: u32 = 3;

/// First retry delay; doubles per attempt.
const TICK_RETRY_BASE: Duration = Duration::from_secs(1);

/// Queue slack per worker.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

struct Inner {
    engine: Arc<CopyEngine>,
    interval: Duration,
    tx: mpsc::Sender<String>,
    entries: DashMap<String, JoinHandle<()>>,
    in_flight: AtomicUsize,
}

pub struct Scheduler {
    inner: Arc<Inner>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Spin up the worker pool. No tasks are scheduled yet.
    pub fn start(engine: Arc<CopyEngine>) -> Self {
        let cfg = engine.config();
        let concurrency = cfg.worker_concurrency;
        let interval = Duration::from_millis(cfg.tick_interval_ms);

        let (tx, rx) = mpsc::channel::<String>(concurrency * QUEUE_DEPTH_PER_WORKER);
        let rx = Arc::new(Mutex::new(rx));

        let inner = Arc::new(Inner {
            engine,
            interval,
            tx,
            entries: DashMap::new(),
            in_flight: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let inner = Arc::clone(&inner);
            let rx = Arc::clone(&rx);
            workers.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(task_id) = job else {
                        break;
                    };

                    inner.in_flight.fetch_add(1, Ordering::SeqCst);
                    run_tick_with_retry(&inner, &task_id).await;
                    inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                }
                debug!(worker_id, "Tick worker stopped");
            }));
        }

        info!(
            "Scheduler started: {} workers, {} ms cadence",
            concurrency,
            interval.as_millis()
        );

        Self {
            inner,
            workers: parking_lot::Mutex::new(workers),
        }
    }

    /// Register a repeating tick for a task. Idempotent: scheduling an
    /// already-scheduled task does not duplicate ticks.
    pub fn schedule(&self, task_id: &str) {
        match self.inner.entries.entry(task_id.to_string()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(vacant) => {
                let inner = Arc::clone(&self.inner);
                let id = task_id.to_string();
                let handle = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(inner.interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    loop {
                        ticker.tick().await;
                        if inner.tx.try_send(id.clone()).is_err() {
                            // Queue full; the next period re-delivers.
                            debug!(task_id = %id, "Tick queue full, dropping tick");
                        }
                    }
                });
                vacant.insert(handle);
                info!(task_id, "Task scheduled");
            }
        }
    }

    /// Remove a task's repeating tick.
    pub fn unschedule(&self, task_id: &str) {
        if let Some((_, handle)) = self.inner.entries.remove(task_id) {
            handle.abort();
            info!(task_id, "Task unscheduled");
        }
    }

    /// Drop every periodic entry. Run at startup to purge zombie entries
    /// from a prior instance, and at shutdown to stop new ticks.
    pub fn clear_all(&self) {
        let ids: Vec<String> = self
            .inner
            .entries
            .iter()
            .map(|e| e.key().clone())
            .collect();
        for id in ids {
            if let Some((_, handle)) = self.inner.entries.remove(&id) {
                handle.abort();
            }
        }
    }

    /// Ticks currently being executed by workers.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.entries.len()
    }

    /// Abort the worker pool. Call after draining in-flight ticks.
    pub fn stop_workers(&self) {
        for handle in self.workers.lock().drain(..) {
            handle.abort();
        }
    }
}

async fn run_tick_with_retry(inner: &Inner, task_id: &str) {
    let mut delay = TICK_RETRY_BASE;

    for attempt in 1..=TICK_RETRY_ATTEMPTS {
        match inner.engine.run_tick(task_id).await {
            Ok(TickOutcome::Completed(report)) => {
                if report.handled > 0 || report.failed > 0 || report.reconciled {
                    debug!(
                        task_id,
                        handled = report.handled,
                        failed = report.failed,
                        reconciled = report.reconciled,
                        "Tick completed"
                    );
                }
                return;
            }
            Ok(TickOutcome::SkippedLocked) => return,
            Ok(TickOutcome::TaskGone) => {
                if let Some((_, handle)) = inner.entries.remove(task_id) {
                    handle.abort();
                    info!(task_id, "Task gone; unscheduled");
                }
                return;
            }
            Err(e) => {
                warn!(
                    task_id,
                    attempt,
                    "Tick failed (attempt {}/{}): {}",
                    attempt,
                    TICK_RETRY_ATTEMPTS,
                    e
                );
                if attempt < TICK_RETRY_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                } else {
                    // Dropped; the next period re-delivers.
                    warn!(task_id, "Tick dropped after {} attempts", TICK_RETRY_ATTEMPTS);
                }
            }
        }
    }
}
