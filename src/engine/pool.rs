//! Bounded worker pool with suspended retries and a pool-wide pause
//!
//! This module provides the `WorkerPool` struct, a scheduler for keyed
//! asynchronous tasks. A task runs once and yields what should happen next:
//! finish, run again after a delay, or pause the whole pool and then run
//! again.
//!
//! # Design
//!
//! A single scheduler loop owns all queues and selects over:
//! - incoming commands (new tasks, explicit pauses)
//! - the `JoinSet` of running tasks, never larger than the capacity
//! - a `DelayQueue` of suspended tasks; a waiting task holds no slot
//! - the end of the current pause, if any
//!
//! While paused, running tasks finish normally but nothing new is started.
//! Delays and pauses longer than [`MAX_DELAY`] are cut down to it.
//!
//! # Thread Safety
//!
//! `WorkerPool` is a cheap cloneable handle. The set of tracked keys is a
//! `DashSet` shared between the handles and the loop, so a key can be
//! tracked by at most one task at any time no matter how many callers
//! submit concurrently.

use dashmap::DashSet;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::fmt;
use std::future::{poll_fn, Future};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

/// Longest delay or pause the scheduler honours
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

fn bounded(delay: Duration) -> Duration {
    if delay > MAX_DELAY {
        warn!(
            requested_ms = delay.as_millis() as u64,
            max_ms = MAX_DELAY.as_millis() as u64,
            "delay clamped"
        );
        return MAX_DELAY;
    }
    delay
}

/// What a task asks the pool to do after one run
#[derive(Debug)]
pub enum Yield {
    /// The task is finished; its key is released
    Done,

    /// Run `task` again once `delay` has elapsed
    Retry { delay: Duration, task: Task },

    /// Stop starting tasks for `pause`, then run `task` first
    Throttle { pause: Duration, task: Task },
}

/// A keyed unit of work
///
/// Continuations returned through [`Yield`] must carry the same key as the
/// task that produced them.
pub struct Task {
    key: String,
    run: Box<dyn FnOnce() -> BoxFuture<'static, Yield> + Send>,
}

impl Task {
    pub fn new<F, Fut>(key: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Yield> + Send + 'static,
    {
        Self {
            key: key.into(),
            run: Box::new(move || run().boxed()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("key", &self.key).finish()
    }
}

enum Command {
    Schedule { task: Task, delay: Duration },
    Pause(Duration),
}

/// State shared between pool handles and the scheduler loop
struct Shared {
    commands: mpsc::UnboundedSender<Command>,

    /// Keys of every task queued, suspended or running
    tracked: DashSet<String>,

    running: AtomicUsize,

    /// Signalled whenever `tracked` becomes empty
    idle: Notify,

    shutdown: CancellationToken,

    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn release(&self, key: &str) {
        self.tracked.remove(key);
        if self.tracked.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to a running worker pool
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    capacity: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("tracked", &self.shared.tracked.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl WorkerPool {
    /// Start a pool running at most `capacity` tasks at once
    ///
    /// Must be called from within a tokio runtime. A zero capacity is
    /// raised to one.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of concurrently running tasks
    ///
    /// # Returns
    ///
    /// A cloneable handle; every clone drives the same scheduler.
    pub fn start(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (commands, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            commands,
            tracked: DashSet::new(),
            running: AtomicUsize::new(0),
            idle: Notify::new(),
            shutdown: CancellationToken::new(),
            scheduler: Mutex::new(None),
        });

        let scheduler = Scheduler {
            shared: Arc::clone(&shared),
            capacity,
            ready: VecDeque::new(),
            delayed: DelayQueue::new(),
            running: JoinSet::new(),
            paused_until: None,
        };
        let handle = tokio::spawn(scheduler.run(receiver));
        if let Ok(mut slot) = shared.scheduler.lock() {
            *slot = Some(handle);
        }

        Self { shared, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue a task to run as soon as a slot is free
    ///
    /// Returns `false` when a task with the same key is already tracked or
    /// the pool has shut down.
    pub fn submit(&self, task: Task) -> bool {
        self.submit_after(task, Duration::ZERO)
    }

    /// Queue a task to become runnable after `delay`
    ///
    /// The task is tracked from this call on, so a second submission with
    /// the same key is rejected while the first is still waiting.
    pub fn submit_after(&self, task: Task, delay: Duration) -> bool {
        if self.shared.shutdown.is_cancelled() {
            return false;
        }

        if !self.shared.tracked.insert(task.key.clone()) {
            debug!(task = %task.key, "task already tracked, ignoring submission");
            return false;
        }

        let key = task.key.clone();
        if self
            .shared
            .commands
            .send(Command::Schedule { task, delay })
            .is_err()
        {
            self.shared.release(&key);
            return false;
        }
        true
    }

    /// Stop starting tasks for `pause`
    ///
    /// Overlapping pauses extend to the latest end; a shorter pause never
    /// cuts a longer one short.
    pub fn pause_for(&self, pause: Duration) {
        let _ = self.shared.commands.send(Command::Pause(pause));
    }

    /// Whether a task with `key` is queued, suspended or running
    pub fn is_tracked(&self, key: &str) -> bool {
        self.shared.tracked.contains(key)
    }

    /// Number of tracked tasks
    pub fn pending(&self) -> usize {
        self.shared.tracked.len()
    }

    /// Number of tasks currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Wait until no task is tracked any more
    ///
    /// Returns immediately after shutdown.
    pub async fn drain(&self) {
        loop {
            let idle = self.shared.idle.notified();
            if self.shared.tracked.is_empty() || self.shared.shutdown.is_cancelled() {
                return;
            }
            idle.await;
        }
    }

    /// Stop the scheduler, abandoning queued, suspended and running tasks
    ///
    /// Subsequent submissions are rejected.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let handle = self
            .shared
            .scheduler
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "worker pool scheduler failed");
            }
        }
    }
}

/// Outcome of one spawned run: the task key and its yield, `None` on panic
type Finished = (String, Option<Yield>);

struct Scheduler {
    shared: Arc<Shared>,
    capacity: usize,
    ready: VecDeque<Task>,
    delayed: DelayQueue<Task>,
    running: JoinSet<Finished>,
    paused_until: Option<Instant>,
}

impl Scheduler {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            self.dispatch();
            let resume_at = self.paused_until;

            tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                Some(joined) = self.running.join_next() => self.finish(joined),
                Some(command) = commands.recv() => self.accept(command),
                Some(expired) = poll_fn(|cx| self.delayed.poll_expired(cx)) => {
                    self.ready.push_back(expired.into_inner());
                }
                _ = sleep_until(resume_at.unwrap_or_else(Instant::now)), if resume_at.is_some() => {
                    self.paused_until = None;
                    info!("pause elapsed, resuming dispatch");
                }
            }
        }

        let abandoned = self.shared.tracked.len();
        self.running.shutdown().await;
        self.ready.clear();
        self.delayed.clear();
        self.shared.tracked.clear();
        self.shared.running.store(0, Ordering::Relaxed);
        self.shared.idle.notify_waiters();
        info!(abandoned, "worker pool stopped");
    }

    /// Start ready tasks until the pool is full, paused or out of work
    fn dispatch(&mut self) {
        if let Some(until) = self.paused_until {
            if Instant::now() < until {
                return;
            }
            self.paused_until = None;
        }

        while self.running.len() < self.capacity {
            let Some(task) = self.ready.pop_front() else {
                break;
            };
            let Task { key, run } = task;
            let future = run();
            self.running.spawn(async move {
                let yielded = AssertUnwindSafe(future).catch_unwind().await.ok();
                (key, yielded)
            });
        }
        self.shared
            .running
            .store(self.running.len(), Ordering::Relaxed);
    }

    fn accept(&mut self, command: Command) {
        match command {
            Command::Schedule { task, delay } if delay.is_zero() => self.ready.push_back(task),
            Command::Schedule { task, delay } => {
                self.delayed.insert(task, bounded(delay));
            }
            Command::Pause(pause) => self.pause(pause),
        }
    }

    fn finish(&mut self, joined: Result<Finished, JoinError>) {
        self.shared
            .running
            .store(self.running.len(), Ordering::Relaxed);

        let (key, yielded) = match joined {
            Ok(finished) => finished,
            Err(e) => {
                error!(error = %e, "task aborted outside shutdown");
                return;
            }
        };

        match yielded {
            None => {
                error!(task = %key, "task panicked, releasing its key");
                self.shared.release(&key);
            }
            Some(Yield::Done) => self.shared.release(&key),
            Some(Yield::Retry { delay, task }) => {
                debug_assert_eq!(task.key, key);
                self.delayed.insert(task, bounded(delay));
            }
            Some(Yield::Throttle { pause, task }) => {
                debug_assert_eq!(task.key, key);
                self.pause(pause);
                self.ready.push_front(task);
            }
        }
    }

    fn pause(&mut self, pause: Duration) {
        let pause = bounded(pause);
        let until = Instant::now() + pause;
        let until = match self.paused_until {
            Some(current) if current >= until => current,
            _ => until,
        };
        if self.paused_until != Some(until) {
            warn!(pause_ms = pause.as_millis() as u64, "pausing dispatch");
        }
        self.paused_until = Some(until);
    }
}
