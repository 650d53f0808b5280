//! Marshaling onto the host's authoritative thread.
//!
//! The host owns exactly one thread that may touch world state.  Script
//! invocations may run anywhere (the caller's thread, the worker pool), so
//! every host call goes through a [`HostBridge`]: on the authoritative thread
//! it calls straight through, elsewhere it submits a [`Job`] through the
//! [`MainThread`] port and blocks on a channel until the job answers or the
//! timeout expires.

use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::host::{Animation, Entity, Host, ItemStack, Location};
use crate::script::RuntimeFault;

/// A unit of work to run on the authoritative thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

// ── MainThread port ───────────────────────────────────────────────────────────

/// "Run on the authoritative thread" port.
pub trait MainThread: Send + Sync {
    /// Whether the calling thread is the authoritative one.
    fn is_current(&self) -> bool;

    /// Queue `job` for the authoritative thread.  Returns `false` if the
    /// thread no longer accepts work.
    fn submit(&self, job: Job) -> bool;
}

/// Treats every thread as authoritative; jobs run inline.
///
/// For hosts without thread affinity (the console binary, tests).
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateMainThread;

impl MainThread for ImmediateMainThread {
    fn is_current(&self) -> bool {
        true
    }

    fn submit(&self, job: Job) -> bool {
        job();
        true
    }
}

/// Job queue drained by the host from its own thread.
///
/// The thread that creates the queue becomes the authoritative thread.  The
/// host calls [`run_pending`](Self::run_pending) once per tick.
pub struct MainThreadQueue {
    owner: ThreadId,
    tx: mpsc::UnboundedSender<Job>,
    rx: Mutex<mpsc::UnboundedReceiver<Job>>,
}

impl MainThreadQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        MainThreadQueue { owner: thread::current().id(), tx, rx: Mutex::new(rx) }
    }

    /// Run every queued job.  Returns the number run.  Does nothing when
    /// called off the authoritative thread.
    pub fn run_pending(&self) -> usize {
        if !self.is_current() {
            log::warn!("run_pending called off the authoritative thread");
            return 0;
        }
        let mut ran = 0;
        loop {
            // Release the receiver before running the job; jobs may submit more.
            let job = self.rx.lock().try_recv();
            match job {
                Ok(job) => {
                    job();
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        ran
    }
}

impl Default for MainThreadQueue {
    fn default() -> Self {
        MainThreadQueue::new()
    }
}

impl MainThread for MainThreadQueue {
    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn submit(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }
}

// ── HostBridge ────────────────────────────────────────────────────────────────

/// Thread-correct access to the [`Host`].
#[derive(Clone)]
pub struct HostBridge {
    host: Arc<dyn Host>,
    main: Arc<dyn MainThread>,
    timeout: Duration,
}

impl HostBridge {
    pub fn new(host: Arc<dyn Host>, main: Arc<dyn MainThread>, timeout: Duration) -> Self {
        HostBridge { host, main, timeout }
    }

    pub fn main_thread(&self) -> &Arc<dyn MainThread> {
        &self.main
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `f` on the authoritative thread and wait for its answer.
    pub fn run_on_main<R, F>(&self, f: F) -> Result<R, RuntimeFault>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.main.is_current() {
            return Ok(f());
        }
        let (tx, rx) = std_mpsc::channel();
        let job: Job = Box::new(move || {
            // The waiter may have timed out and gone away.
            let _ = tx.send(f());
        });
        if !self.main.submit(job) {
            return Err(RuntimeFault::MainThreadUnavailable(self.timeout));
        }
        rx.recv_timeout(self.timeout)
            .map_err(|_| RuntimeFault::MainThreadUnavailable(self.timeout))
    }

    /// Run `f` against the host on the authoritative thread.
    pub fn call<R, F>(&self, f: F) -> Result<R, RuntimeFault>
    where
        F: FnOnce(&dyn Host) -> R + Send + 'static,
        R: Send + 'static,
    {
        let host = Arc::clone(&self.host);
        self.run_on_main(move || f(host.as_ref()))
    }

    // ── Host services ──────────────────────────────────────────────────────

    pub fn find_entity(&self, name: &str) -> Result<Option<Entity>, RuntimeFault> {
        let name = name.to_owned();
        self.call(move |h| h.find_entity(&name))
    }

    pub fn online_entities(&self) -> Result<Vec<Entity>, RuntimeFault> {
        self.call(|h| h.online_entities())
    }

    pub fn send_message(&self, target: Entity, text: String) -> Result<(), RuntimeFault> {
        self.call(move |h| h.send_message(&target, &text))
    }

    pub fn broadcast(&self, text: String) -> Result<(), RuntimeFault> {
        self.call(move |h| h.broadcast(&text))
    }

    pub fn resolve_item(&self, descriptor: String, amount: u32) -> Result<Option<ItemStack>, RuntimeFault> {
        self.call(move |h| h.resolve_item(&descriptor, amount))
    }

    pub fn resolve_location(
        &self,
        descriptor: String,
        actor: Option<Entity>,
    ) -> Result<Option<Location>, RuntimeFault> {
        self.call(move |h| h.resolve_location(&descriptor, actor.as_ref()))
    }

    pub fn teleport(&self, target: Entity, to: Location) -> Result<(), RuntimeFault> {
        self.call(move |h| h.teleport(&target, &to))
    }

    pub fn give_item(&self, target: Entity, item: ItemStack) -> Result<(), RuntimeFault> {
        self.call(move |h| h.give_item(&target, &item))
    }

    pub fn play_animation(
        &self,
        animation: Animation,
        params: Vec<String>,
        actor: Option<Entity>,
    ) -> Result<(), RuntimeFault> {
        self.call(move |h| h.play_animation(animation, &params, actor.as_ref()))
    }

    pub fn has_permission(&self, entity: Entity, permission: String) -> Result<bool, RuntimeFault> {
        self.call(move |h| h.has_permission(&entity, &permission))
    }
}

impl std::fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBridge").field("timeout", &self.timeout).finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
