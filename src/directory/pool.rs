//! Bounded worker pool for directory queries.
//!
//! A directory lookup must never stall the cascade. Queries run on a small set
//! of worker threads fed by a bounded queue; the caller waits on a one-shot
//! reply channel with a timeout and gives up when it expires.
//!
//! Giving up is cooperative:
//!
//! - a job still queued when its caller gives up is skipped by the worker
//!   that dequeues it;
//! - a job already running is reported to the caller's `on_abandon` hook with
//!   the worker's thread id, so the store can interrupt it, and a replacement
//!   worker is started so live queries are not stuck behind it. The stalled
//!   worker retires once its job returns. Replacements are capped at
//!   `STALLED_WORKERS_PER_WORKER` per configured worker.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use super::traits::StorageError;

const STALLED_WORKERS_PER_WORKER: usize = 4;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;
const CANCELLED: u8 = 3;
const ABANDONED: u8 = 4;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Lifecycle of one job, shared by the caller and the worker.
#[derive(Default)]
struct Ticket {
    stage: AtomicU8,
    worker: OnceLock<ThreadId>,
}

impl Ticket {
    fn advance(&self, from: u8, to: u8) -> bool {
        self.stage
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

struct Task {
    job: Job,
    ticket: Arc<Ticket>,
}

struct Shared {
    rx: Receiver<Task>,
    target: usize,
    max_live: usize,
    live: AtomicUsize,
    spawned: AtomicUsize,
}

impl Shared {
    /// Claims a slot for one more worker thread.
    fn reserve(&self) -> bool {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_live).then_some(n + 1)
            })
            .is_ok()
    }

    /// Gives up a slot if the pool is above its configured size.
    fn retire(&self) -> bool {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n > self.target).then(|| n - 1)
            })
            .is_ok()
    }
}

fn work(shared: &Shared) {
    while let Ok(task) = shared.rx.recv() {
        let ticket = task.ticket;
        let _ = ticket.worker.set(thread::current().id());
        if !ticket.advance(QUEUED, RUNNING) {
            continue;
        }
        // A panicking store must not take the worker down with it;
        // the caller sees a dropped reply channel instead.
        let _ = panic::catch_unwind(AssertUnwindSafe(task.job));
        if !ticket.advance(RUNNING, DONE) && shared.retire() {
            debug!("stalled directory worker retiring");
            break;
        }
    }
}

fn spawn_worker(shared: &Arc<Shared>) -> std::io::Result<JoinHandle<()>> {
    let idx = shared.spawned.fetch_add(1, Ordering::Relaxed);
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("namecascade-directory-{idx}"))
        .spawn(move || work(&shared))
}

pub(crate) struct QueryPool {
    tx: Option<Sender<Task>>,
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    queue_capacity: usize,
}

impl QueryPool {
    pub(crate) fn start(workers: usize, queue_capacity: usize) -> Result<Self, StorageError> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Task>(queue_capacity);

        let shared = Arc::new(Shared {
            rx,
            target: workers,
            max_live: workers * (1 + STALLED_WORKERS_PER_WORKER),
            live: AtomicUsize::new(workers),
            spawned: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let handle = spawn_worker(&shared).map_err(|e| {
                StorageError::BackendError(format!("failed to spawn directory worker: {e}"))
            })?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            shared,
            workers: Mutex::new(handles),
            queue_capacity,
        })
    }

    /// Runs `f` on a worker and waits at most `timeout` for its result.
    ///
    /// If `f` is still running when the wait ends, `on_abandon` receives the
    /// id of the worker thread running it.
    pub(crate) fn run<T, F, A>(
        &self,
        timeout: Duration,
        f: F,
        on_abandon: A,
    ) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        A: FnOnce(ThreadId),
    {
        let duration_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if timeout.is_zero() {
            return Err(StorageError::Timeout { duration_ms });
        }

        let tx = self.tx.as_ref().ok_or(StorageError::Disconnected)?;
        let (reply_tx, reply_rx) = bounded::<T>(1);
        let ticket = Arc::new(Ticket::default());
        let task = Task {
            job: Box::new(move || {
                let _ = reply_tx.send(f());
            }),
            ticket: Arc::clone(&ticket),
        };

        match tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(StorageError::QueueFull {
                    capacity: self.queue_capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => return Err(StorageError::Disconnected),
        }

        match reply_rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Disconnected) => Err(StorageError::Disconnected),
            Err(RecvTimeoutError::Timeout) => {
                if ticket.advance(QUEUED, CANCELLED) {
                    debug!(duration_ms, "directory query dropped before it started");
                } else if ticket.advance(RUNNING, ABANDONED) {
                    if let Some(worker) = ticket.worker.get() {
                        on_abandon(*worker);
                    }
                    self.replace_stalled_worker();
                }
                Err(StorageError::Timeout { duration_ms })
            }
        }
    }

    fn replace_stalled_worker(&self) {
        if !self.shared.reserve() {
            warn!(
                max_workers = self.shared.max_live,
                "directory workers exhausted by stalled queries"
            );
            return;
        }
        match spawn_worker(&self.shared) {
            Ok(handle) => {
                let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
                workers.retain(|h| !h.is_finished());
                workers.push(handle);
            }
            Err(e) => {
                self.shared.live.fetch_sub(1, Ordering::AcqRel);
                warn!(error = %e, "failed to spawn replacement directory worker");
            }
        }
    }

    #[cfg(test)]
    fn live_workers(&self) -> usize {
        self.shared.live.load(Ordering::Acquire)
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        // Close the channel: workers drain queued jobs then exit.
        drop(self.tx.take());
        let workers = self.workers.get_mut().unwrap_or_else(PoisonError::into_inner);
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    use super::*;

    fn ignore(_: ThreadId) {}

    /// Keeps the pool's only worker busy until the returned sender drops.
    fn occupy(pool: &Arc<QueryPool>) -> (Sender<()>, JoinHandle<Result<(), StorageError>>) {
        let (block_tx, block_rx) = bounded::<()>(0);
        let (started_tx, started_rx) = bounded::<()>(1);
        let holder = {
            let pool = Arc::clone(pool);
            thread::spawn(move || {
                pool.run(
                    Duration::from_secs(10),
                    move || {
                        let _ = started_tx.send(());
                        let _ = block_rx.recv();
                    },
                    ignore,
                )
            })
        };
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        (block_tx, holder)
    }

    #[test]
    fn test_run_returns_value() {
        let pool = QueryPool::start(2, 8).unwrap();
        let v = pool.run(Duration::from_secs(5), || 40 + 2, ignore).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn test_run_times_out() {
        let pool = QueryPool::start(1, 8).unwrap();
        let err = pool
            .run(
                Duration::from_millis(20),
                || thread::sleep(Duration::from_millis(300)),
                ignore,
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { duration_ms: 20 }));
    }

    #[test]
    fn test_zero_budget_times_out_without_queueing() {
        let pool = QueryPool::start(1, 1).unwrap();
        let err = pool.run(Duration::ZERO, || (), ignore).unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));
    }

    #[test]
    fn test_queue_full() {
        let pool = Arc::new(QueryPool::start(1, 1).unwrap());
        let (release, holder) = occupy(&pool);

        // Fill the single queue slot.
        let _ = pool.run(Duration::from_millis(1), || (), ignore);

        let err = pool.run(Duration::from_millis(1), || (), ignore).unwrap_err();
        assert!(matches!(err, StorageError::QueueFull { capacity: 1 }));

        drop(release);
        holder.join().unwrap().unwrap();
    }

    #[test]
    fn test_job_whose_caller_left_is_skipped() {
        let pool = Arc::new(QueryPool::start(1, 4).unwrap());
        let (release, holder) = occupy(&pool);

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let err = pool
            .run(
                Duration::from_millis(10),
                move || flag.store(true, Ordering::SeqCst),
                ignore,
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));

        drop(release);
        holder.join().unwrap().unwrap();

        // FIFO: by the time this answers, the dropped job has been dequeued.
        assert_eq!(pool.run(Duration::from_secs(5), || 1, ignore).unwrap(), 1);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stalled_worker_is_replaced() {
        let pool = QueryPool::start(1, 4).unwrap();

        let mut abandoned = None;
        let err = pool
            .run(
                Duration::from_millis(20),
                || thread::sleep(Duration::from_millis(400)),
                |worker| abandoned = Some(worker),
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout { .. }));
        let worker = abandoned.unwrap();
        assert_ne!(worker, thread::current().id());
        assert_eq!(pool.live_workers(), 2);

        // The next query does not wait behind the stalled one.
        let started = Instant::now();
        assert_eq!(pool.run(Duration::from_secs(5), || 7_u8, ignore).unwrap(), 7);
        assert!(started.elapsed() < Duration::from_millis(300));

        // Once its job returns, the stalled worker retires.
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.live_workers() > 1 {
            assert!(Instant::now() < deadline, "stalled worker never retired");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_replacements_are_capped() {
        let pool = QueryPool::start(1, 64).unwrap();
        for _ in 0..20 {
            let _ = pool.run(
                Duration::from_millis(10),
                || thread::sleep(Duration::from_secs(1)),
                ignore,
            );
            assert!(pool.live_workers() <= 1 + STALLED_WORKERS_PER_WORKER);
        }
        assert_eq!(pool.live_workers(), 1 + STALLED_WORKERS_PER_WORKER);
    }

    #[test]
    fn test_panicking_job_reports_disconnected_and_worker_survives() {
        let pool = QueryPool::start(1, 4).unwrap();
        let err = pool
            .run(Duration::from_secs(5), || -> u8 { panic!("store exploded") }, ignore)
            .unwrap_err();
        assert!(matches!(err, StorageError::Disconnected));

        let v = pool.run(Duration::from_secs(5), || 7_u8, ignore).unwrap();
        assert_eq!(v, 7);
    }
}
