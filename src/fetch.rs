use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::aggregate::{AggregateReport, AggregateTracker};
use crate::decode::{DecodedTile, read_tile_payload};
use crate::error::{Error, Result};
use crate::stats::{TileStats, collect_tile_stats};

const FALLBACK_WORKERS: usize = 4;

struct FetchJob {
    id: u64,
    key: String,
}

struct FetchOutcome {
    id: u64,
    key: String,
    result: Result<TileStats>,
}

type PendingMap = Arc<Mutex<HashMap<u64, Sender<Result<TileStats>>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Worker thread count, 0 picks the available parallelism.
    pub workers: usize,
    pub timeout: Option<Duration>,
}

/// Dispatches tile decode jobs onto worker threads and correlates responses
/// back to their callers by request id, so responses arriving out of order
/// still resolve the right waiter. Successful results are folded into an
/// `AggregateTracker` as they come back.
pub struct FetchCoordinator {
    job_tx: Option<Sender<FetchJob>>,
    pending: PendingMap,
    tracker: Arc<Mutex<AggregateTracker>>,
    timeout: Option<Duration>,
    next_id: u64,
    workers: Vec<JoinHandle<()>>,
    router: Option<JoinHandle<()>>,
}

impl FetchCoordinator {
    pub fn new(options: FetchOptions) -> FetchCoordinator {
        let worker_count = if options.workers == 0 {
            thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(FALLBACK_WORKERS)
        } else {
            options.workers
        };
        let (job_tx, job_rx) = unbounded::<FetchJob>();
        let (outcome_tx, outcome_rx) = unbounded::<FetchOutcome>();
        let mut workers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let job_rx = job_rx.clone();
            let outcome_tx = outcome_tx.clone();
            workers.push(thread::spawn(move || worker_loop(job_rx, outcome_tx)));
        }
        // only the worker threads hold clones now, so disconnects propagate
        drop(job_rx);
        drop(outcome_tx);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let tracker = Arc::new(Mutex::new(AggregateTracker::new()));
        let router = {
            let pending = Arc::clone(&pending);
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || router_loop(outcome_rx, pending, tracker))
        };
        FetchCoordinator {
            job_tx: Some(job_tx),
            pending,
            tracker,
            timeout: options.timeout,
            next_id: 0,
            workers,
            router: Some(router),
        }
    }

    /// Queues one tile for decoding. The key doubles as the aggregation
    /// dedup key.
    pub fn request(&mut self, key: &str) -> Result<PendingFetch> {
        let job_tx = self.job_tx.as_ref().ok_or(Error::WorkerUnavailable)?;
        self.next_id += 1;
        let id = self.next_id;
        let (reply_tx, reply_rx) = unbounded();
        lock(&self.pending).insert(id, reply_tx);
        let job = FetchJob { id, key: key.to_string() };
        if job_tx.send(job).is_err() {
            lock(&self.pending).remove(&id);
            return Err(Error::WorkerUnavailable);
        }
        Ok(PendingFetch {
            id,
            key: key.to_string(),
            reply_rx,
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        })
    }

    pub fn summary(&self) -> AggregateReport {
        lock(&self.tracker).summary()
    }

    /// Stops accepting requests and joins every thread.
    pub fn shutdown(&mut self) {
        self.job_tx = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        if let Some(router) = self.router.take() {
            let _ = router.join();
        }
    }
}

impl Drop for FetchCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle for one in-flight request. `cancel` releases the pending slot
/// without waiting for the response.
#[derive(Debug)]
pub struct PendingFetch {
    id: u64,
    key: String,
    reply_rx: Receiver<Result<TileStats>>,
    pending: PendingMap,
    timeout: Option<Duration>,
}

impl PendingFetch {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn wait(self) -> Result<TileStats> {
        match self.timeout {
            Some(timeout) => match self.reply_rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    lock(&self.pending).remove(&self.id);
                    Err(Error::FetchTimeout(timeout.as_millis() as u64))
                }
                Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerUnavailable),
            },
            None => self
                .reply_rx
                .recv()
                .map_err(|_| Error::WorkerUnavailable)?,
        }
    }

    pub fn cancel(self) {
        lock(&self.pending).remove(&self.id);
    }
}

fn worker_loop(job_rx: Receiver<FetchJob>, outcome_tx: Sender<FetchOutcome>) {
    while let Ok(job) = job_rx.recv() {
        let result = fetch_tile_stats(&job.key);
        let outcome = FetchOutcome { id: job.id, key: job.key, result };
        if outcome_tx.send(outcome).is_err() {
            break;
        }
    }
}

fn fetch_tile_stats(key: &str) -> Result<TileStats> {
    let payload = read_tile_payload(Path::new(key))?;
    let tile = DecodedTile::decode(payload)?;
    collect_tile_stats(&tile)
}

// Outcomes whose slot was released (cancelled, timed out) are dropped without
// touching the tracker.
fn router_loop(
    outcome_rx: Receiver<FetchOutcome>,
    pending: PendingMap,
    tracker: Arc<Mutex<AggregateTracker>>,
) {
    while let Ok(outcome) = outcome_rx.recv() {
        let Some(reply_tx) = lock(&pending).remove(&outcome.id) else {
            tracing::debug!(tile = %outcome.key, id = outcome.id, "dropping response with no waiter");
            continue;
        };
        if let Ok(stats) = &outcome.result {
            lock(&tracker).ingest(&outcome.key, stats);
        }
        if reply_tx.send(outcome.result).is_err() {
            tracing::debug!(id = outcome.id, "waiter went away before delivery");
        }
    }
}
