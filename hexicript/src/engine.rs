//! The script engine: the surface a host embeds.
//!
//! | Entry point | Runs on | Returns |
//! |-------------|---------|---------|
//! | [`execute`](ScriptEngine::execute) / [`execute_named`](ScriptEngine::execute_named) | caller's thread | the result |
//! | [`execute_inline`](ScriptEngine::execute_inline) | caller's thread | the result of a throwaway script |
//! | [`execute_sync`](ScriptEngine::execute_sync) | authoritative thread | the result, waiting up to `max_execution_time` |
//! | [`spawn`](ScriptEngine::spawn) / [`parse_async`](ScriptEngine::parse_async) | worker pool | a `JoinHandle` |
//! | [`dispatch_event`](ScriptEngine::dispatch_event) / [`dispatch_command`](ScriptEngine::dispatch_command) | caller's thread | a per-dispatch report |
//! | [`tick`](ScriptEngine::tick) | authoritative thread | scheduled invocations run |
//!
//! Host calls made by a script are always marshaled through the engine's
//! [`HostBridge`], whichever thread the invocation itself runs on.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::dispatch::{HostBridge, ImmediateMainThread, MainThread};
use crate::event::EventKind;
use crate::host::{Entity, Host};
use crate::registry::ScriptRegistry;
use crate::scheduler::{Scheduler, TaskId};
use crate::script::program::average;
use crate::script::{
    ExecutionContext, ExecutionResult, Executor, Invocation, Parser, RuntimeFault, Script, ScriptError,
    ScriptStats, Value, VariableStats, VariableStore,
};

/// Invocations slower than this are logged at `warn`.
const SLOW_SCRIPT: Duration = Duration::from_millis(1000);

/// How often the worker pool reaps stale ephemeral variables.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Local holding everything after the command word.
pub const ARGS: &str = "args";

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is shutting down")]
    ShuttingDown,
    #[error("cannot start worker pool: {0}")]
    Runtime(#[source] io::Error),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error("no script named '{0}'")]
    UnknownScript(String),
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

// ── Reports ───────────────────────────────────────────────────────────────────

/// Engine-wide counters.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    pub scripts: usize,
    pub total_executions: u64,
    pub total_time: Duration,
    pub average_time: Duration,
    pub scheduled: usize,
    pub variables: VariableStats,
}

/// What one [`dispatch_event`](ScriptEngine::dispatch_event) did.
#[derive(Debug, Clone, Default)]
pub struct EventReport {
    /// Number of handlers run.
    pub handled: usize,
    /// Whether any handler ended in `cancel`.
    pub cancelled: bool,
    /// Error results, as `script: message`.
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
struct Totals {
    executions: AtomicU64,
    nanos: AtomicU64,
}

impl Totals {
    fn record(&self, elapsed: Duration) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// Everything an invocation needs; shared with worker tasks.
struct Inner {
    config: EngineConfig,
    parser: Parser,
    bridge: HostBridge,
    vars: VariableStore,
    registry: ScriptRegistry,
    scheduler: Mutex<Scheduler>,
    closing: AtomicBool,
    totals: Totals,
    inline_seq: AtomicU64,
}

impl Inner {
    fn check_open(&self) -> Result<(), EngineError> {
        if self.closing.load(Ordering::Acquire) {
            Err(EngineError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn parse(&self, name: &str, source: &str) -> Result<Script, ScriptError> {
        let script = Script::parse(name, source, &self.parser);
        script.validate(self.config.max_script_lines)?;
        Ok(script)
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(&self.bridge, &self.vars, self.config.limits())
    }

    /// Run a whole script, fold the outcome into the statistics.
    fn run(&self, script: &Script, ctx: &mut ExecutionContext) -> ExecutionResult {
        if !script.is_enabled() {
            return ExecutionResult::fault(RuntimeFault::ScriptDisabled(script.name().to_owned()));
        }
        ctx.restart_clock();
        let started = Instant::now();
        let result = self.executor().run(Invocation { script: script.name(), tree: script.tree() }, ctx);
        self.finish(script, started.elapsed(), &result);
        result
    }

    fn finish(&self, script: &Script, elapsed: Duration, result: &ExecutionResult) {
        script.record_execution(elapsed, result);
        self.totals.record(elapsed);
        if elapsed > SLOW_SCRIPT {
            log::warn!("slow script '{}': {elapsed:?}", script.name());
        } else {
            log::debug!("executed '{}' in {elapsed:?}", script.name());
        }
    }
}

// ── ScriptEngine ──────────────────────────────────────────────────────────────

pub struct ScriptEngine {
    inner: Arc<Inner>,
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
}

impl ScriptEngine {
    /// Engine for a host without thread affinity.
    pub fn new(config: EngineConfig, host: Arc<dyn Host>) -> Result<Self, EngineError> {
        Self::with_main_thread(config, host, Arc::new(ImmediateMainThread))
    }

    /// Engine whose host calls are marshaled through `main`.
    pub fn with_main_thread(
        config: EngineConfig,
        host: Arc<dyn Host>,
        main: Arc<dyn MainThread>,
    ) -> Result<Self, EngineError> {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.thread_name("hexicript-worker").enable_time();
        if config.worker_threads > 0 {
            builder.worker_threads(config.worker_threads);
        }
        let runtime = builder.build().map_err(EngineError::Runtime)?;
        let handle = runtime.handle().clone();

        let inner = Arc::new(Inner {
            parser: Parser::new().map_err(ScriptError::from)?,
            bridge: HostBridge::new(host, main, config.max_execution_time),
            vars: VariableStore::new(config.variable_retention),
            registry: ScriptRegistry::new(),
            scheduler: Mutex::new(Scheduler::new()),
            closing: AtomicBool::new(false),
            totals: Totals::default(),
            inline_seq: AtomicU64::new(0),
            config,
        });
        spawn_reaper(&handle, Arc::downgrade(&inner));

        Ok(ScriptEngine { inner, runtime: Mutex::new(Some(runtime)), handle })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn bridge(&self) -> &HostBridge {
        &self.inner.bridge
    }

    pub fn variables(&self) -> &VariableStore {
        &self.inner.vars
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire)
    }

    // ── Loading ────────────────────────────────────────────────────────────

    /// Parse and validate without registering.
    pub fn parse(&self, name: &str, source: &str) -> Result<Script, EngineError> {
        self.inner.check_open()?;
        Ok(self.inner.parse(name, source)?)
    }

    /// [`parse`](Self::parse) on the worker pool.
    pub fn parse_async(
        &self,
        name: &str,
        source: &str,
    ) -> Result<JoinHandle<Result<Script, ScriptError>>, EngineError> {
        self.inner.check_open()?;
        let inner = Arc::clone(&self.inner);
        let (name, source) = (name.to_owned(), source.to_owned());
        Ok(self.handle.spawn_blocking(move || inner.parse(&name, &source)))
    }

    /// Register an already parsed script, replacing one of the same name.
    pub fn register(&self, script: Script) -> Result<Arc<Script>, EngineError> {
        self.inner.check_open()?;
        let name = script.name().to_owned();
        let statements = script.statement_count();
        let replaced = self.inner.registry.insert(script).is_some();
        log::info!(
            "{} script '{name}' ({statements} statements)",
            if replaced { "reloaded" } else { "loaded" }
        );
        self.inner.registry.require(&name).map_err(EngineError::from)
    }

    /// Parse, validate and register.  A script that fails validation is
    /// not registered and does not replace an existing one.
    pub fn load(&self, name: &str, source: &str) -> Result<Arc<Script>, EngineError> {
        let script = self.parse(name, source)?;
        self.register(script)
    }

    /// Load a file under its stem (`greet.hxs` → `greet`).
    pub fn load_file(&self, path: &Path) -> Result<Arc<Script>, EngineError> {
        let source = std::fs::read_to_string(path)
            .map_err(|source| ScriptError::Io { path: path.to_owned(), source })?;
        let name = path.file_stem().map_or_else(|| path.display().to_string(), |s| s.to_string_lossy().into_owned());
        self.load(&name, &source)
    }

    /// Re-parse a loaded script from its stored source.
    pub fn reload(&self, name: &str) -> Result<Arc<Script>, EngineError> {
        let current = self.script(name)?;
        self.load(name, current.source())
    }

    /// Remove a script and its scheduled runs.
    pub fn unload(&self, name: &str) -> Result<Arc<Script>, EngineError> {
        let script = self
            .inner
            .registry
            .remove(name)
            .ok_or_else(|| EngineError::UnknownScript(name.to_owned()))?;
        let dropped = self.inner.scheduler.lock().cancel_script(name);
        log::info!("unloaded script '{name}' ({dropped} scheduled runs dropped)");
        Ok(script)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), EngineError> {
        self.inner
            .registry
            .set_enabled(name, enabled)
            .map_err(|_| EngineError::UnknownScript(name.to_owned()))
    }

    pub fn script(&self, name: &str) -> Result<Arc<Script>, EngineError> {
        self.inner.registry.get(name).ok_or_else(|| EngineError::UnknownScript(name.to_owned()))
    }

    /// Loaded script names, sorted.
    pub fn script_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    // ── Execution ──────────────────────────────────────────────────────────

    /// Run `script` on the calling thread.
    pub fn execute(&self, script: &Script, ctx: &mut ExecutionContext) -> Result<ExecutionResult, EngineError> {
        self.inner.check_open()?;
        Ok(self.inner.run(script, ctx))
    }

    pub fn execute_named(&self, name: &str, ctx: &mut ExecutionContext) -> Result<ExecutionResult, EngineError> {
        let script = self.script(name)?;
        self.execute(&script, ctx)
    }

    /// Parse `source` under a synthetic name and run it once.  The script
    /// is not registered.
    pub fn execute_inline(&self, source: &str, actor: Option<Entity>) -> Result<ExecutionResult, EngineError> {
        let seq = self.inner.inline_seq.fetch_add(1, Ordering::Relaxed);
        let script = self.parse(&format!("inline-{seq}"), source)?;
        self.execute(&script, &mut ExecutionContext::new(actor))
    }

    /// Run a registered script on the authoritative thread.  Off that
    /// thread, blocks up to `max_execution_time` for the answer.
    pub fn execute_sync(&self, name: &str, ctx: ExecutionContext) -> Result<ExecutionResult, EngineError> {
        self.inner.check_open()?;
        let script = self.script(name)?;
        let inner = Arc::clone(&self.inner);
        let mut ctx = ctx.with_async(false);
        let outcome = self.inner.bridge.run_on_main(move || inner.run(&script, &mut ctx));
        Ok(outcome.unwrap_or_else(|fault| {
            log::error!("{name}: {fault}");
            ExecutionResult::fault(fault)
        }))
    }

    /// Run a registered script on the worker pool.  With async execution
    /// disabled it runs now, on the calling thread, and the handle is
    /// already complete.
    pub fn spawn(&self, name: &str, ctx: ExecutionContext) -> Result<JoinHandle<ExecutionResult>, EngineError> {
        self.inner.check_open()?;
        let script = self.script(name)?;
        if !self.inner.config.enable_async_execution {
            let result = self.inner.run(&script, &mut ctx.with_async(false));
            return Ok(self.handle.spawn(async move { result }));
        }
        let inner = Arc::clone(&self.inner);
        let mut ctx = ctx.with_async(true);
        Ok(self.handle.spawn_blocking(move || inner.run(&script, &mut ctx)))
    }

    /// Block the calling thread until a worker task finishes.  Must not be
    /// called from inside the worker pool.
    pub fn wait<T>(&self, task: JoinHandle<T>) -> Result<T, EngineError> {
        Ok(self.handle.block_on(task)?)
    }

    // ── Dispatch ───────────────────────────────────────────────────────────

    /// Run every `on <event>:` handler of every enabled script, each with a
    /// fresh context carrying the trigger.
    pub fn dispatch_event(
        &self,
        kind: &EventKind,
        payload: Value,
        actor: Option<Entity>,
    ) -> Result<EventReport, EngineError> {
        self.inner.check_open()?;
        let mut report = EventReport::default();
        let exec = self.inner.executor();
        for script in self.inner.registry.enabled() {
            let inv = Invocation { script: script.name(), tree: script.tree() };
            for handler in script.handlers_for(kind) {
                let mut ctx = ExecutionContext::new(actor.clone()).with_trigger(kind.clone(), payload.clone());
                let started = Instant::now();
                let result = exec.run_body(handler, inv, &mut ctx);
                self.inner.finish(&script, started.elapsed(), &result);
                report.handled += 1;
                if matches!(result, ExecutionResult::Cancel) {
                    report.cancelled = true;
                }
                if let Some(error) = result.describe_error() {
                    report.errors.push(format!("{}: {error}", script.name()));
                }
            }
        }
        log::debug!("event {kind}: {} handlers, cancelled={}", report.handled, report.cancelled);
        Ok(report)
    }

    /// Run the first enabled `on command "/word":` handler matching the
    /// command word of `line`.  Arguments are bound as `arg-1`…`arg-N` and
    /// `args`.  `None` when no script handles the command.
    pub fn dispatch_command(
        &self,
        line: &str,
        actor: Option<Entity>,
    ) -> Result<Option<ExecutionResult>, EngineError> {
        self.inner.check_open()?;
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        for script in self.inner.registry.enabled() {
            let Some(handler) = script.command_handler(word) else {
                continue;
            };
            let mut ctx = ExecutionContext::new(actor);
            for (i, arg) in rest.split_whitespace().enumerate() {
                ctx.set_local(format!("arg-{}", i + 1), Value::from_script_text(arg));
            }
            ctx.set_local(ARGS, Value::Text(rest.to_owned()));
            let inv = Invocation { script: script.name(), tree: script.tree() };
            let started = Instant::now();
            let result = self.inner.executor().run_body(handler, inv, &mut ctx);
            self.inner.finish(&script, started.elapsed(), &result);
            return Ok(Some(result));
        }
        log::debug!("no handler for command {word}");
        Ok(None)
    }

    // ── Scheduling ─────────────────────────────────────────────────────────

    /// Run `name` once, `delay` from now, at the first [`tick`](Self::tick)
    /// after that.
    pub fn schedule_later(&self, name: &str, delay: Duration) -> Result<TaskId, EngineError> {
        self.inner.check_open()?;
        self.script(name)?;
        Ok(self.inner.scheduler.lock().later(name, delay, Instant::now()))
    }

    /// Run `name` `delay` from now and then every `period`, `count` times in
    /// all (`None` = until cancelled).
    pub fn schedule_repeating(
        &self,
        name: &str,
        delay: Duration,
        period: Duration,
        count: Option<u32>,
    ) -> Result<TaskId, EngineError> {
        self.inner.check_open()?;
        self.script(name)?;
        Ok(self.inner.scheduler.lock().repeating(name, delay, period, count, Instant::now()))
    }

    pub fn cancel_scheduled(&self, id: TaskId) -> bool {
        self.inner.scheduler.lock().cancel(id)
    }

    pub fn next_scheduled(&self) -> Option<Instant> {
        self.inner.scheduler.lock().next_due()
    }

    /// Run every scheduled invocation due at `now`.  Called by the host from
    /// its authoritative thread.  Returns the number run.
    pub fn tick(&self, now: Instant) -> usize {
        if self.is_shutting_down() {
            return 0;
        }
        let due = self.inner.scheduler.lock().take_due(now);
        let mut ran = 0;
        for task in due {
            let Some(script) = self.inner.registry.get(&task.script) else {
                log::debug!("dropping task {}: script '{}' is gone", task.id, task.script);
                continue;
            };
            self.inner.run(&script, &mut ExecutionContext::console());
            ran += 1;
            self.inner.scheduler.lock().requeue(task);
        }
        ran
    }

    // ── Housekeeping ───────────────────────────────────────────────────────

    /// Drop stale ephemeral variables now.  Also runs periodically on the
    /// worker pool.
    pub fn reap_variables(&self) -> usize {
        self.inner.vars.reap()
    }

    pub fn stats(&self) -> EngineStats {
        let executions = self.inner.totals.executions.load(Ordering::Relaxed);
        let total_time = Duration::from_nanos(self.inner.totals.nanos.load(Ordering::Relaxed));
        EngineStats {
            scripts: self.inner.registry.len(),
            total_executions: executions,
            total_time,
            average_time: average(total_time, executions),
            scheduled: self.inner.scheduler.lock().len(),
            variables: self.inner.vars.stats(),
        }
    }

    pub fn script_stats(&self, name: &str) -> Result<ScriptStats, EngineError> {
        Ok(self.script(name)?.stats())
    }

    /// Stop accepting work, drop scheduled runs and wait up to the grace
    /// period for in-flight worker tasks.  Later calls do nothing.
    pub fn shutdown(&self) {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("script engine shutting down");
        self.inner.scheduler.lock().clear();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_timeout(self.inner.config.shutdown_grace);
        }
        log::info!("script engine stopped");
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("scripts", &self.inner.registry.len())
            .field("closing", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

fn spawn_reaper(handle: &Handle, inner: Weak<Inner>) {
    handle.spawn(async move {
        let mut interval = tokio::time::interval(REAP_INTERVAL);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let Some(inner) = inner.upgrade() else { break };
            if inner.closing.load(Ordering::Acquire) {
                break;
            }
            inner.vars.reap();
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Animation, ItemStack, Location};

    #[derive(Default)]
    struct Quiet {
        said: Mutex<Vec<String>>,
    }

    impl Host for Quiet {
        fn find_entity(&self, name: &str) -> Option<Entity> {
            Some(Entity::named(name, "world"))
        }
        fn online_entities(&self) -> Vec<Entity> {
            Vec::new()
        }
        fn send_message(&self, target: &Entity, text: &str) {
            self.said.lock().push(format!("{}: {text}", target.name));
        }
        fn broadcast(&self, text: &str) {
            self.said.lock().push(text.to_owned());
        }
        fn resolve_item(&self, _descriptor: &str, _amount: u32) -> Option<ItemStack> {
            None
        }
        fn resolve_location(&self, _descriptor: &str, _actor: Option<&Entity>) -> Option<Location> {
            None
        }
        fn teleport(&self, _target: &Entity, _to: &Location) {}
        fn give_item(&self, _target: &Entity, _item: &ItemStack) {}
        fn play_animation(&self, _animation: Animation, _params: &[String], _actor: Option<&Entity>) {}
        fn has_permission(&self, _entity: &Entity, _permission: &str) -> bool {
            true
        }
    }

    fn engine() -> (ScriptEngine, Arc<Quiet>) {
        let host = Arc::new(Quiet::default());
        (ScriptEngine::new(EngineConfig::default(), host.clone()).unwrap(), host)
    }

    #[test]
    fn load_execute_and_count() {
        let (e, host) = engine();
        e.load("hi", "broadcast \"hello\"").unwrap();
        let r = e.execute_named("hi", &mut ExecutionContext::console()).unwrap();
        assert!(r.is_success());
        assert_eq!(*host.said.lock(), ["hello"]);
        assert_eq!(e.stats().total_executions, 1);
        assert_eq!(e.script_stats("hi").unwrap().executions, 1);
    }

    #[test]
    fn validation_failure_keeps_previous() {
        let host = Arc::new(Quiet::default());
        let config = EngineConfig { max_script_lines: 2, ..EngineConfig::default() };
        let e = ScriptEngine::new(config, host).unwrap();
        e.load("s", "stop").unwrap();
        let err = e.load("s", "stop\nstop\nstop").unwrap_err();
        assert!(matches!(err, EngineError::Script(ScriptError::Validation { statements: 3, .. })));
        assert_eq!(e.script("s").unwrap().source(), "stop");
    }

    #[test]
    fn disabled_script_faults() {
        let (e, _) = engine();
        e.load("s", "broadcast \"x\"").unwrap();
        e.set_enabled("s", false).unwrap();
        let r = e.execute_named("s", &mut ExecutionContext::console()).unwrap();
        assert!(matches!(
            r,
            ExecutionResult::Error { fault: Some(RuntimeFault::ScriptDisabled(_)), .. }
        ));
    }

    #[test]
    fn unknown_names() {
        let (e, _) = engine();
        assert!(matches!(e.unload("nope"), Err(EngineError::UnknownScript(_))));
        assert!(matches!(e.reload("nope"), Err(EngineError::UnknownScript(_))));
        assert!(matches!(e.schedule_later("nope", Duration::ZERO), Err(EngineError::UnknownScript(_))));
    }

    #[test]
    fn command_arguments_bound() {
        let (e, host) = engine();
        e.load("cmds", "on command \"/say\":\n    broadcast \"%arg-1%|%arg-2%|%args%\"").unwrap();
        let steve = Entity::named("Steve", "world");
        let r = e.dispatch_command("/say hi there", Some(steve)).unwrap().unwrap();
        assert!(r.is_success());
        assert_eq!(*host.said.lock(), ["hi|there|hi there"]);
        assert!(e.dispatch_command("/other", None).unwrap().is_none());
    }

    #[test]
    fn shutdown_refuses_work() {
        let (e, _) = engine();
        e.load("s", "stop").unwrap();
        e.schedule_later("s", Duration::from_secs(60)).unwrap();
        e.shutdown();
        e.shutdown();
        assert!(e.is_shutting_down());
        assert_eq!(e.stats().scheduled, 0);
        assert!(matches!(e.load("t", "stop"), Err(EngineError::ShuttingDown)));
        assert!(matches!(e.spawn("s", ExecutionContext::console()), Err(EngineError::ShuttingDown)));
        assert_eq!(e.tick(Instant::now()), 0);
    }
}
