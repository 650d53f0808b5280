//! hexicript tree-walking interpreter.
//!
//! The [`Executor`] walks a statement forest against an
//! [`ExecutionContext`].  Every step yields an [`ExecutionResult`]; blocks
//! decide per variant whether to keep going:
//!
//! | Block                              | Stops on                       |
//! |------------------------------------|--------------------------------|
//! | event, command, condition, else    | any non-success                |
//! | function body                      | error, return, cancel          |
//! | loop body (per pass)               | any non-success; break ends the loop, continue the pass |
//! | top level                          | error, return, cancel          |
//!
//! Stray `break`/`continue` reaching the top level count as success.  The
//! wall-clock cap is checked before every statement of every block.

use std::time::{Duration, Instant};

use crate::dispatch::HostBridge;
use crate::host::{Animation, Entity};

use super::context::ExecutionContext;
use super::expand::{expand, expand_references, VarLookup};
use super::expr::{eval_condition, eval_value, EvalEnv};
use super::result::{ExecutionResult, RuntimeFault};
use super::stmt::{LoopSource, Statement, StatementKind};
use super::value::Value;
use super::vars::VariableStore;

/// Local bound to the 1-based pass number of `loop N times` / `while`.
pub const LOOP_NUMBER: &str = "loop-number";
/// Local bound to the current entity of `loop all players`.
pub const LOOP_PLAYER: &str = "loop-player";

// ── Limits ────────────────────────────────────────────────────────────────────

/// Per-invocation resource caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Iteration cap applied to every loop statement.
    pub max_loops: u64,
    /// Wall-clock cap for one invocation.
    pub max_execution_time: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Limits { max_loops: 1000, max_execution_time: Duration::from_millis(5000) }
    }
}

/// The script an invocation belongs to: its name for logs and its
/// top-level forest for `call` lookups.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub script: &'a str,
    pub tree: &'a [Statement],
}

/// How a block treats a child's non-success result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockMode {
    /// Any non-success ends the block.
    Strict,
    /// Only error, return and cancel end the block (function bodies and
    /// the top level).
    Lenient,
}

impl BlockMode {
    fn stops_on(self, r: &ExecutionResult) -> bool {
        match self {
            BlockMode::Strict => !r.is_success(),
            BlockMode::Lenient => matches!(
                r,
                ExecutionResult::Error { .. } | ExecutionResult::Return(_) | ExecutionResult::Cancel
            ),
        }
    }
}

/// Outcome of one loop pass.
enum Pass {
    Next,
    Done(ExecutionResult),
}

// ── Executor ──────────────────────────────────────────────────────────────────

/// Executes statement trees.  Holds only shared references, so one
/// executor per invocation costs nothing.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    bridge: &'a HostBridge,
    vars: &'a VariableStore,
    limits: Limits,
}

impl<'a> Executor<'a> {
    pub fn new(bridge: &'a HostBridge, vars: &'a VariableStore, limits: Limits) -> Self {
        Executor { bridge, vars, limits }
    }

    /// Run a whole forest.  Errors, returns and cancels end the invocation
    /// and are handed back unchanged.
    pub fn run(&self, inv: Invocation<'_>, ctx: &mut ExecutionContext) -> ExecutionResult {
        let result = self.run_block(inv.tree, BlockMode::Lenient, inv, ctx);
        if let Some(error) = result.describe_error() {
            log::error!("{}: {error}", inv.script);
        }
        match result {
            ExecutionResult::Break | ExecutionResult::Continue => ExecutionResult::success(),
            other => other,
        }
    }

    /// Run the body of one block-capable node, as the event and command
    /// dispatchers do.  The body is the invocation boundary, so stray
    /// break/continue count as success.
    pub fn run_body(&self, node: &Statement, inv: Invocation<'_>, ctx: &mut ExecutionContext) -> ExecutionResult {
        let started = Instant::now();
        let result = self.run_block(node.children(), BlockMode::Strict, inv, ctx);
        node.record(started.elapsed());
        if let Some(error) = result.describe_error() {
            log::error!("{}: {error}", inv.script);
        }
        match result {
            ExecutionResult::Break | ExecutionResult::Continue => ExecutionResult::success(),
            other => other,
        }
    }

    fn check_time(&self, ctx: &ExecutionContext) -> Option<ExecutionResult> {
        let elapsed = ctx.elapsed();
        (elapsed > self.limits.max_execution_time).then(|| {
            ExecutionResult::fault(RuntimeFault::Timeout { elapsed, limit: self.limits.max_execution_time })
        })
    }

    fn run_block(
        &self,
        children: &[Statement],
        mode: BlockMode,
        inv: Invocation<'_>,
        ctx: &mut ExecutionContext,
    ) -> ExecutionResult {
        // Whether the current if / else-if chain already took a branch.
        let mut chain: Option<bool> = None;
        for child in children {
            if let Some(timeout) = self.check_time(ctx) {
                log::warn!("{}: line {}: {timeout}", inv.script, child.line_number());
                return timeout.at_line(child.line_number());
            }
            let result = self.exec(child, inv, ctx, &mut chain).at_line(child.line_number());
            if mode.stops_on(&result) {
                if let ExecutionResult::Error { message, .. } = &result {
                    log::debug!("{}: line {}: {message}", inv.script, child.line_number());
                }
                return result;
            }
        }
        ExecutionResult::success()
    }

    /// Execute one node, recording its counters whatever the outcome.
    fn exec(
        &self,
        node: &Statement,
        inv: Invocation<'_>,
        ctx: &mut ExecutionContext,
        chain: &mut Option<bool>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let result = self.dispatch(node, inv, ctx, chain);
        node.record(started.elapsed());
        result
    }

    fn dispatch(
        &self,
        node: &Statement,
        inv: Invocation<'_>,
        ctx: &mut ExecutionContext,
        chain: &mut Option<bool>,
    ) -> ExecutionResult {
        let kind = node.kind();
        if !matches!(kind, StatementKind::Condition { .. } | StatementKind::Else { .. }) {
            *chain = None;
        }
        match kind {
            StatementKind::Event { .. } | StatementKind::Command { .. } => {
                self.run_block(node.children(), BlockMode::Strict, inv, ctx)
            }
            // Definitions run only through `call`.
            StatementKind::Function { .. } => ExecutionResult::success(),

            StatementKind::Condition { condition } => {
                let taken = eval_condition(condition, ctx, &self.env());
                *chain = Some(taken);
                if taken {
                    self.run_block(node.children(), BlockMode::Strict, inv, ctx)
                } else {
                    ExecutionResult::success()
                }
            }
            StatementKind::Else { condition } => {
                if *chain == Some(true) {
                    return ExecutionResult::success();
                }
                let taken = match condition {
                    Some(c) => eval_condition(c, ctx, &self.env()),
                    None => true,
                };
                *chain = condition.as_ref().map(|_| taken);
                if taken {
                    self.run_block(node.children(), BlockMode::Strict, inv, ctx)
                } else {
                    ExecutionResult::success()
                }
            }
            StatementKind::Loop { source } => self.exec_loop(node, source, inv, ctx),

            StatementKind::SetVariable { variable, value } => {
                let v = eval_value(value, ctx, self.vars);
                let name = self.variable_name(variable, ctx);
                self.vars.set(&name, v, ctx);
                ExecutionResult::success()
            }
            StatementKind::AddVariable { variable, value } => {
                let v = eval_value(value, ctx, self.vars);
                let name = self.variable_name(variable, ctx);
                self.vars.add(&name, v, ctx);
                ExecutionResult::success()
            }
            StatementKind::DeleteVariable { variable } => {
                let name = self.variable_name(variable, ctx);
                self.vars.remove(&name, ctx);
                ExecutionResult::success()
            }

            StatementKind::SendMessage { message, target } => {
                self.outcome(self.send_message(message, target, ctx), "message sent")
            }
            StatementKind::Broadcast { message } => {
                let text = expand(message, ctx, self.vars);
                self.outcome(self.bridge.broadcast(text), "message broadcast")
            }
            StatementKind::GiveItem { target, amount, item } => {
                self.outcome(self.give_item(target, amount, item, ctx), "item given")
            }
            StatementKind::Teleport { target, location } => {
                self.outcome(self.teleport(target, location, ctx), "player teleported")
            }
            StatementKind::Animate { animation, params } => {
                self.outcome(self.animate(animation, params, ctx), "animation played")
            }

            StatementKind::Break => ExecutionResult::Break,
            StatementKind::Continue => ExecutionResult::Continue,
            StatementKind::Return { value } => {
                ExecutionResult::Return(value.as_deref().map(|v| eval_value(v, ctx, self.vars)))
            }
            StatementKind::Cancel => ExecutionResult::Cancel,
            StatementKind::Call { function, args } => self.call(function, args, inv, ctx),

            StatementKind::Action => {
                let text = expand(node.line(), ctx, self.vars);
                log::debug!("{}: line {}: generic action: {text}", inv.script, node.line_number());
                ExecutionResult::success_with("action executed")
            }
        }
    }

    fn outcome(&self, r: Result<(), RuntimeFault>, done: &str) -> ExecutionResult {
        match r {
            Ok(()) => ExecutionResult::success_with(done),
            Err(fault) => ExecutionResult::fault(fault),
        }
    }

    fn env(&self) -> Env<'_> {
        Env { exec: self }
    }

    // ── Loops ──────────────────────────────────────────────────────────────

    fn exec_loop(
        &self,
        node: &Statement,
        source: &LoopSource,
        inv: Invocation<'_>,
        ctx: &mut ExecutionContext,
    ) -> ExecutionResult {
        let cap = self.limits.max_loops;
        let saved = [LOOP_NUMBER, LOOP_PLAYER].map(|k| ctx.local(k).cloned());
        ctx.enter_loop();

        let mut passes = 0u64;
        let result = loop {
            if passes >= cap {
                if !matches!(source, LoopSource::Times(n) if *n <= cap) {
                    log::debug!("{}: line {}: loop stopped at cap {cap}", inv.script, node.line_number());
                }
                break ExecutionResult::success();
            }
            match source {
                LoopSource::Times(n) if passes >= *n => break ExecutionResult::success(),
                LoopSource::Times(_) => {}
                LoopSource::Players => {
                    // Snapshot taken on the first pass.
                    break self.loop_players(node, inv, ctx, cap);
                }
                LoopSource::While(cond) => {
                    if !eval_condition(cond, ctx, &self.env()) {
                        break ExecutionResult::success();
                    }
                }
                LoopSource::Unknown(_) => break ExecutionResult::success(),
            }
            passes += 1;
            ctx.set_local(LOOP_NUMBER, Value::Int(passes as i64));
            if let Pass::Done(r) = self.pass(node, inv, ctx) {
                break r;
            }
        };

        ctx.leave_loop();
        for (key, old) in [LOOP_NUMBER, LOOP_PLAYER].into_iter().zip(saved) {
            match old {
                Some(v) => ctx.set_local(key, v),
                None => {
                    ctx.remove_local(key);
                }
            }
        }
        result
    }

    fn loop_players(
        &self,
        node: &Statement,
        inv: Invocation<'_>,
        ctx: &mut ExecutionContext,
        cap: u64,
    ) -> ExecutionResult {
        let players = match self.bridge.online_entities() {
            Ok(p) => p,
            Err(fault) => return ExecutionResult::fault(fault),
        };
        for (i, player) in players.into_iter().take(cap as usize).enumerate() {
            ctx.set_local(LOOP_NUMBER, Value::Int(i as i64 + 1));
            ctx.set_local(LOOP_PLAYER, Value::Entity(player));
            if let Pass::Done(r) = self.pass(node, inv, ctx) {
                return r;
            }
        }
        ExecutionResult::success()
    }

    /// One pass over a loop body.
    fn pass(&self, node: &Statement, inv: Invocation<'_>, ctx: &mut ExecutionContext) -> Pass {
        match self.run_block(node.children(), BlockMode::Strict, inv, ctx) {
            ExecutionResult::Success { .. } | ExecutionResult::Continue => Pass::Next,
            ExecutionResult::Break => Pass::Done(ExecutionResult::success()),
            other => Pass::Done(other),
        }
    }

    // ── Functions ──────────────────────────────────────────────────────────

    fn call(
        &self,
        function: &str,
        args: &[String],
        inv: Invocation<'_>,
        ctx: &mut ExecutionContext,
    ) -> ExecutionResult {
        let Some((def, params)) = inv.tree.iter().find_map(|n| match n.kind() {
            StatementKind::Function { name, params } if name == function => Some((n, params)),
            _ => None,
        }) else {
            return ExecutionResult::fault(RuntimeFault::UnknownFunction(function.to_owned()));
        };
        if params.len() != args.len() {
            return ExecutionResult::fault(RuntimeFault::InvalidArgument(format!(
                "{function} takes {} argument(s), got {}",
                params.len(),
                args.len()
            )));
        }

        let mut callee = ctx.clone();
        for (param, arg) in params.iter().zip(args) {
            let v = eval_value(arg, ctx, self.vars);
            callee.set_local(param.clone(), v);
        }

        let started = Instant::now();
        let result = self.run_block(def.children(), BlockMode::Lenient, inv, &mut callee);
        def.record(started.elapsed());
        match result {
            ExecutionResult::Return(v) => ExecutionResult::success_value(v),
            ExecutionResult::Break | ExecutionResult::Continue => ExecutionResult::success(),
            other => other,
        }
    }

    // ── Host actions ───────────────────────────────────────────────────────

    /// A variable reference with any nested `{…}` references expanded.
    fn variable_name(&self, raw: &str, ctx: &ExecutionContext) -> String {
        let raw = raw.trim();
        match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(inner) if inner.contains('{') => format!("{{{}}}", expand_references(inner, ctx, self.vars)),
            _ => raw.to_owned(),
        }
    }

    /// `player` is the acting entity; a local holding an entity is used
    /// directly; anything else is looked up by name.
    fn resolve_target(&self, text: &str, ctx: &ExecutionContext) -> Result<Entity, RuntimeFault> {
        let name = expand(text.trim(), ctx, self.vars);
        let name = name.trim();
        if name.eq_ignore_ascii_case("player") {
            return ctx
                .actor()
                .cloned()
                .ok_or_else(|| RuntimeFault::TargetNotFound("player (no acting entity)".to_owned()));
        }
        if let Some(Value::Entity(e)) = ctx.local(name) {
            return Ok(e.clone());
        }
        self.bridge
            .find_entity(name)?
            .ok_or_else(|| RuntimeFault::TargetNotFound(name.to_owned()))
    }

    fn send_message(&self, message: &str, target: &str, ctx: &ExecutionContext) -> Result<(), RuntimeFault> {
        let entity = self.resolve_target(target, ctx)?;
        let text = expand(message, ctx, self.vars);
        self.bridge.send_message(entity, text)
    }

    fn give_item(&self, target: &str, amount: &str, item: &str, ctx: &ExecutionContext) -> Result<(), RuntimeFault> {
        let entity = self.resolve_target(target, ctx)?;
        let amount_text = expand(amount, ctx, self.vars);
        let amount = amount_text
            .trim()
            .parse::<u32>()
            .map_err(|_| RuntimeFault::InvalidArgument(format!("bad item amount '{amount_text}'")))?;
        let descriptor = expand(item, ctx, self.vars);
        let stack = self
            .bridge
            .resolve_item(descriptor.clone(), amount)?
            .ok_or(RuntimeFault::InvalidItem(descriptor))?;
        self.bridge.give_item(entity, stack)
    }

    fn teleport(&self, target: &str, location: &str, ctx: &ExecutionContext) -> Result<(), RuntimeFault> {
        let entity = self.resolve_target(target, ctx)?;
        let descriptor = expand(location, ctx, self.vars);
        let to = self
            .bridge
            .resolve_location(descriptor.clone(), ctx.actor().cloned())?
            .ok_or(RuntimeFault::InvalidLocation(descriptor))?;
        self.bridge.teleport(entity, to)
    }

    fn animate(&self, animation: &str, params: &[String], ctx: &ExecutionContext) -> Result<(), RuntimeFault> {
        let kind: Animation = animation
            .parse()
            .map_err(|_| RuntimeFault::UnknownAnimation(animation.to_owned()))?;
        let params = params.iter().map(|p| expand(p, ctx, self.vars)).collect();
        self.bridge.play_animation(kind, params, ctx.actor().cloned())
    }
}

// ── Condition environment ─────────────────────────────────────────────────────

struct Env<'c> {
    exec: &'c Executor<'c>,
}

impl VarLookup for Env<'_> {
    fn lookup(&self, reference: &str, ctx: &ExecutionContext) -> Option<Value> {
        self.exec.vars.get(reference, ctx)
    }
}

impl EvalEnv for Env<'_> {
    fn has_permission(&self, target: &str, permission: &str, ctx: &ExecutionContext) -> bool {
        let entity = match self.exec.resolve_target(target, ctx) {
            Ok(e) => e,
            Err(_) => return false,
        };
        self.exec
            .bridge
            .has_permission(entity, permission.to_owned())
            .unwrap_or(false)
    }

    fn vars(&self) -> &dyn VarLookup {
        self.exec.vars
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
