use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::task::JoinHandle;

use crate::zip::ZipEntry;

use super::{ExtractError, PipelineError};

/// Processes one entry on a pipeline worker.
///
/// Implemented by [`Materializer`](super::Materializer) for real
/// extraction; tests substitute their own handlers.
#[async_trait]
pub trait EntryHandler: Send + Sync + 'static {
    async fn handle(&self, entry: &ZipEntry) -> Result<(), ExtractError>;
}

/// Invoked exactly once per dispatched entry, in completion order.
/// `None` marks success.
pub type OutcomeCallback = Arc<dyn Fn(&ZipEntry, Option<&ExtractError>) + Send + Sync>;

/// Cloneable handle that fires the pipeline's cancellation signal.
///
/// Cancelling lets workers finish the entry they are on — never a
/// mid-copy abort, which would leave a truncated file looking done —
/// then exit; further `send` calls fail with
/// [`PipelineError::Closed`].
#[derive(Clone)]
pub struct CancelHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        // send_replace updates the value even with no live receivers,
        // so cancelling before start() still closes the pipeline.
        self.cancel.send_replace(true);
    }
}

/// Counters shared between the producer side and the workers.
struct Progress {
    submitted: AtomicUsize,
    completed: AtomicUsize,
    /// Workers still running; drops to zero once every worker task has
    /// exited (drain or cancellation).
    active_workers: AtomicUsize,
    changed: Notify,
}

/// Bounded-concurrency extraction pipeline.
///
/// A fixed pool of workers consumes entries from a bounded intake
/// queue. The producer enumerates the archive and [`send`]s entries one
/// at a time; a full queue suspends the producer, so it can never
/// outrun the workers by more than the queue capacity. Each entry's
/// outcome is delivered through the registered callback; completion
/// order across workers is unordered and callers must not rely on one
/// file being fully written before another starts.
///
/// Lifecycle: [`new`] → [`start`] → [`send`]× → [`wait`] → [`stop`].
///
/// [`new`]: Pipeline::new
/// [`start`]: Pipeline::start
/// [`send`]: Pipeline::send
/// [`wait`]: Pipeline::wait
/// [`stop`]: Pipeline::stop
pub struct Pipeline {
    workers: usize,
    depth: usize,
    handler: Arc<dyn EntryHandler>,
    callback: Option<OutcomeCallback>,
    cancel: Arc<watch::Sender<bool>>,
    progress: Arc<Progress>,
    intake: Option<mpsc::Sender<ZipEntry>>,
    joins: Vec<JoinHandle<()>>,
    started: bool,
}

impl Pipeline {
    /// Configure a pipeline with `workers` concurrent workers and an
    /// intake queue of `depth` entries. The queue always holds at least
    /// one entry; a depth of zero is clamped.
    ///
    /// Nothing runs until [`start`](Pipeline::start).
    pub fn new(workers: usize, depth: usize, handler: Arc<dyn EntryHandler>) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            workers,
            depth,
            handler,
            callback: None,
            cancel: Arc::new(cancel),
            progress: Arc::new(Progress {
                submitted: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                active_workers: AtomicUsize::new(0),
                changed: Notify::new(),
            }),
            intake: None,
            joins: Vec::new(),
            started: false,
        }
    }

    /// Register the per-entry outcome callback.
    ///
    /// Must be called before [`start`](Pipeline::start); workers capture
    /// the callback when they are spawned.
    pub fn set_outcome_callback<F>(&mut self, callback: F)
    where
        F: Fn(&ZipEntry, Option<&ExtractError>) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
    }

    /// Handle for firing the shared cancellation signal from outside
    /// the producer loop.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancel: self.cancel.clone(),
        }
    }

    /// Spawn the worker pool.
    ///
    /// Fails without spawning anything if the worker count is zero or
    /// the pipeline was already started.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::NoWorkers);
        }
        if self.started {
            return Err(PipelineError::AlreadyStarted);
        }
        self.started = true;

        let (tx, rx) = mpsc::channel(self.depth.max(1));
        let rx = Arc::new(Mutex::new(rx));
        self.progress
            .active_workers
            .store(self.workers, Ordering::SeqCst);

        for _ in 0..self.workers {
            self.joins.push(tokio::spawn(worker_loop(
                rx.clone(),
                self.handler.clone(),
                self.callback.clone(),
                self.progress.clone(),
                self.cancel.subscribe(),
            )));
        }

        self.intake = Some(tx);
        Ok(())
    }

    /// Submit one entry to the intake queue.
    ///
    /// Suspends while the queue is full — this is the backpressure that
    /// keeps the producer from outrunning the workers. Fails with
    /// [`PipelineError::Closed`] before `start`, after `stop`, or after
    /// cancellation.
    pub async fn send(&self, entry: ZipEntry) -> Result<(), PipelineError> {
        let intake = self.intake.as_ref().ok_or(PipelineError::Closed)?;

        let mut cancel = self.cancel.subscribe();
        if *cancel.borrow() {
            return Err(PipelineError::Closed);
        }

        tokio::select! {
            biased;
            _ = cancel.changed() => Err(PipelineError::Closed),
            sent = intake.send(entry) => match sent {
                Ok(()) => {
                    self.progress.submitted.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                Err(_) => Err(PipelineError::Closed),
            },
        }
    }

    /// Block until every submitted entry has produced an outcome.
    ///
    /// The intake queue stays open — the caller must simply have
    /// stopped sending. After cancellation this returns as soon as
    /// every worker has exited; entries still queued at that point
    /// produce no outcome.
    pub async fn wait(&mut self) -> &mut Self {
        loop {
            let changed = self.progress.changed.notified();

            let drained = self.progress.completed.load(Ordering::SeqCst)
                >= self.progress.submitted.load(Ordering::SeqCst);
            let halted = *self.cancel.borrow()
                && self.progress.active_workers.load(Ordering::SeqCst) == 0;
            if drained || halted {
                break;
            }

            changed.await;
        }
        self
    }

    /// Shut the pipeline down.
    ///
    /// Signals cancellation, closes the intake queue so idle workers
    /// exit, and joins every worker. Idempotent, and safe to call even
    /// if [`start`](Pipeline::start) never succeeded.
    pub async fn stop(&mut self) {
        self.cancel.send_replace(true);
        self.intake = None;
        for join in self.joins.drain(..) {
            let _ = join.await;
        }
    }
}

/// One worker: take an entry, process it, report the outcome, repeat.
///
/// Exits when the intake queue is closed and drained, or when the
/// cancellation signal fires between entries.
async fn worker_loop(
    intake: Arc<Mutex<mpsc::Receiver<ZipEntry>>>,
    handler: Arc<dyn EntryHandler>,
    callback: Option<OutcomeCallback>,
    progress: Arc<Progress>,
    mut cancel: watch::Receiver<bool>,
) {
    loop {
        let entry = {
            let mut intake = intake.lock().await;
            tokio::select! {
                biased;
                _ = cancel.changed() => None,
                entry = intake.recv() => entry,
            }
        };
        let Some(entry) = entry else { break };

        let result = handler.handle(&entry).await;
        if let Some(callback) = &callback {
            callback(&entry, result.as_ref().err());
        }

        progress.completed.fetch_add(1, Ordering::SeqCst);
        progress.changed.notify_waiters();
    }

    progress.active_workers.fetch_sub(1, Ordering::SeqCst);
    progress.changed.notify_waiters();
}
