//! Per-invocation execution state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::event::EventKind;
use crate::host::Entity;

use super::value::Value;

/// The event that triggered an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub kind: EventKind,
    /// Opaque host-supplied payload (chat text, block type, …).
    pub payload: Value,
}

/// State carried through one invocation of a script.
///
/// `Clone` produces a fully independent child context; the locals map is
/// copied, so nothing the callee writes is visible to the caller.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    actor: Option<Entity>,
    locals: HashMap<String, Value>,
    trigger: Option<TriggerEvent>,
    started: Instant,
    loop_depth: usize,
    is_async: bool,
}

impl ExecutionContext {
    pub fn new(actor: Option<Entity>) -> Self {
        ExecutionContext {
            actor,
            locals: HashMap::new(),
            trigger: None,
            started: Instant::now(),
            loop_depth: 0,
            is_async: false,
        }
    }

    /// Context with no acting entity (console or scheduler).
    pub fn console() -> Self {
        ExecutionContext::new(None)
    }

    pub fn with_trigger(mut self, kind: EventKind, payload: Value) -> Self {
        self.trigger = Some(TriggerEvent { kind, payload });
        self
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    pub fn actor(&self) -> Option<&Entity> {
        self.actor.as_ref()
    }

    pub fn trigger(&self) -> Option<&TriggerEvent> {
        self.trigger.as_ref()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Restart the elapsed-time anchor.
    pub fn restart_clock(&mut self) {
        self.started = Instant::now();
    }

    pub fn loop_depth(&self) -> usize {
        self.loop_depth
    }

    pub fn enter_loop(&mut self) {
        self.loop_depth += 1;
    }

    pub fn leave_loop(&mut self) {
        self.loop_depth = self.loop_depth.saturating_sub(1);
    }

    // ── Locals ────────────────────────────────────────────────────────────

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    pub fn set_local(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn remove_local(&mut self, name: &str) -> Option<Value> {
        self.locals.remove(name)
    }

    pub fn locals(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.locals.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext::console()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_independent() {
        let mut parent = ExecutionContext::new(Some(Entity::named("Steve", "world")));
        parent.set_local("x", Value::Int(1));
        let mut child = parent.clone();
        child.set_local("x", Value::Int(2));
        child.set_local("y", Value::Int(3));
        assert_eq!(parent.local("x"), Some(&Value::Int(1)));
        assert!(parent.local("y").is_none());
        assert_eq!(child.actor().map(|e| e.name.as_str()), Some("Steve"));
    }

    #[test]
    fn loop_depth_never_underflows() {
        let mut ctx = ExecutionContext::console();
        ctx.leave_loop();
        assert_eq!(ctx.loop_depth(), 0);
        ctx.enter_loop();
        ctx.enter_loop();
        ctx.leave_loop();
        assert_eq!(ctx.loop_depth(), 1);
    }

    #[test]
    fn trigger_metadata() {
        let ctx = ExecutionContext::console().with_trigger(EventKind::PlayerChat, "hello".into());
        let t = ctx.trigger().unwrap();
        assert_eq!(t.kind, EventKind::PlayerChat);
        assert_eq!(t.payload, Value::Text("hello".into()));
    }
}
