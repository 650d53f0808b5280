//! hexicript statement tree.
//!
//! A script is an ordered forest of [`Statement`]s.  Nesting lives entirely
//! in each node's `children`; only block-capable kinds (event, command,
//! function, condition, else, loop) ever own children.  Nodes are built
//! whole by the parser and never change shape afterwards; the per-node
//! execution counters are the only post-parse mutation and use atomics so a
//! parsed tree can be executed through a shared reference.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::event::EventKind;

// ── Loop sources ──────────────────────────────────────────────────────────────

/// What a `loop …:` / `while …:` header iterates over.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopSource {
    /// `loop N times:` binds `loop-number` (1-based).
    Times(u64),
    /// `loop all players:` binds `loop-player` to each connected entity.
    Players,
    /// `while <condition>:` with the condition already normalized.
    While(String),
    /// Anything else; iterates zero times.
    Unknown(String),
}

// ── Statement kinds ───────────────────────────────────────────────────────────

/// The closed set of statement kinds, each carrying only its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `on <declaration>:`
    Event { event: EventKind },
    /// `on command "/name":`
    Command { command: String },
    /// `function name(a, b):`
    Function { name: String, params: Vec<String> },
    /// `if <condition>:`; the condition is normalized at parse time.
    Condition { condition: String },
    /// `else:` or `else if <condition>:`
    Else { condition: Option<String> },
    Loop { source: LoopSource },
    /// `set {var} to <value>`
    SetVariable { variable: String, value: String },
    /// `add <value> to {var}`
    AddVariable { variable: String, value: String },
    /// `send "<message>" to <target>`
    SendMessage { message: String, target: String },
    /// `broadcast "<message>"`
    Broadcast { message: String },
    /// `give <target> [amount] <item>`
    GiveItem { target: String, amount: String, item: String },
    /// `teleport <target> to <location>`
    Teleport { target: String, location: String },
    /// `animate_<kind>(params…)`
    Animate { animation: String, params: Vec<String> },
    Break,
    Continue,
    /// `return [value]` or `stop`
    Return { value: Option<String> },
    /// `cancel [event]`
    Cancel,
    /// `delete {var}` / `clear {var}`
    DeleteVariable { variable: String },
    /// `call name(args…)`
    Call { function: String, args: Vec<String> },
    /// Any line no other pattern recognised; the text is the original line.
    Action,
}

impl StatementKind {
    /// Whether this kind may own child statements.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            StatementKind::Event { .. }
                | StatementKind::Command { .. }
                | StatementKind::Function { .. }
                | StatementKind::Condition { .. }
                | StatementKind::Else { .. }
                | StatementKind::Loop { .. }
        )
    }

    /// Short stable tag, used in listings and structural comparisons.
    pub fn tag(&self) -> &'static str {
        match self {
            StatementKind::Event { .. } => "event",
            StatementKind::Command { .. } => "command",
            StatementKind::Function { .. } => "function",
            StatementKind::Condition { .. } => "condition",
            StatementKind::Else { .. } => "else",
            StatementKind::Loop { .. } => "loop",
            StatementKind::SetVariable { .. } => "variable-set",
            StatementKind::AddVariable { .. } => "variable-add",
            StatementKind::SendMessage { .. } => "send-message",
            StatementKind::Broadcast { .. } => "broadcast",
            StatementKind::GiveItem { .. } => "give-item",
            StatementKind::Teleport { .. } => "teleport",
            StatementKind::Animate { .. } => "animate",
            StatementKind::Break => "break",
            StatementKind::Continue => "continue",
            StatementKind::Return { .. } => "return",
            StatementKind::Cancel => "cancel",
            StatementKind::DeleteVariable { .. } => "variable-delete",
            StatementKind::Call { .. } => "call",
            StatementKind::Action => "action",
        }
    }
}

// ── Execution counters ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct NodeStats {
    invocations: AtomicU64,
    total_nanos: AtomicU64,
}

impl NodeStats {
    fn snapshot(&self) -> NodeStats {
        NodeStats {
            invocations: AtomicU64::new(self.invocations.load(Ordering::Relaxed)),
            total_nanos: AtomicU64::new(self.total_nanos.load(Ordering::Relaxed)),
        }
    }
}

// ── Statement ─────────────────────────────────────────────────────────────────

/// One parsed instruction.
#[derive(Debug)]
pub struct Statement {
    kind: StatementKind,
    /// The trimmed source line the node was parsed from.
    line: String,
    /// 1-based line number in the script source.
    line_number: usize,
    /// Indentation level (leading whitespace in spaces / 4).
    indent: usize,
    children: Vec<Statement>,
    stats: NodeStats,
}

impl Statement {
    pub fn new(kind: StatementKind, line: impl Into<String>, line_number: usize, indent: usize) -> Self {
        Statement {
            kind,
            line: line.into(),
            line_number,
            indent,
            children: Vec::new(),
            stats: NodeStats::default(),
        }
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn children(&self) -> &[Statement] {
        &self.children
    }

    pub fn is_block(&self) -> bool {
        self.kind.is_block()
    }

    /// Append a child.  Leaf kinds refuse and hand the child back so the
    /// caller can place it elsewhere instead of losing it.
    pub fn add_child(&mut self, child: Statement) -> Result<(), Statement> {
        if !self.is_block() {
            log::warn!(
                "line {}: {} statement cannot contain line {}",
                self.line_number,
                self.kind.tag(),
                child.line_number
            );
            return Err(child);
        }
        self.children.push(child);
        Ok(())
    }

    /// Record one execution of this node.
    pub fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.stats.invocations.fetch_add(1, Ordering::Relaxed);
        self.stats.total_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn invocations(&self) -> u64 {
        self.stats.invocations.load(Ordering::Relaxed)
    }

    pub fn total_time(&self) -> Duration {
        Duration::from_nanos(self.stats.total_nanos.load(Ordering::Relaxed))
    }

    pub fn average_time(&self) -> Duration {
        match self.invocations() {
            0 => Duration::ZERO,
            n => self.total_time() / u32::try_from(n).unwrap_or(u32::MAX),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Statement::count).sum::<usize>()
    }
}

impl Clone for Statement {
    /// Deep copy: the whole subtree and every field, with counters copied
    /// into fresh cells so the two trees never share mutable state.
    fn clone(&self) -> Self {
        Statement {
            kind: self.kind.clone(),
            line: self.line.clone(),
            line_number: self.line_number,
            indent: self.indent,
            children: self.children.clone(),
            stats: self.stats.snapshot(),
        }
    }
}

// ── Tree helpers ──────────────────────────────────────────────────────────────

/// Depth-first, pre-order walk over a forest.
pub fn walk(tree: &[Statement]) -> Vec<&Statement> {
    fn visit<'a>(node: &'a Statement, out: &mut Vec<&'a Statement>) {
        out.push(node);
        for child in &node.children {
            visit(child, out);
        }
    }
    let mut out = Vec::new();
    for node in tree {
        visit(node, &mut out);
    }
    out
}

/// Total node count of a forest.
pub fn count(tree: &[Statement]) -> usize {
    tree.iter().map(Statement::count).sum()
}

/// `(depth, kind tag)` for every node in pre-order; depth is structural
/// nesting, not source indentation.
pub fn outline(tree: &[Statement]) -> Vec<(usize, &'static str)> {
    fn visit(node: &Statement, depth: usize, out: &mut Vec<(usize, &'static str)>) {
        out.push((depth, node.kind.tag()));
        for child in &node.children {
            visit(child, depth + 1, out);
        }
    }
    let mut out = Vec::new();
    for node in tree {
        visit(node, 0, &mut out);
    }
    out
}

/// Re-serialize a forest as source text, indenting each line four spaces
/// per nesting level.
pub fn render(tree: &[Statement]) -> String {
    fn visit(node: &Statement, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("    ");
        }
        out.push_str(&node.line);
        out.push('\n');
        for child in &node.children {
            visit(child, depth + 1, out);
        }
    }
    let mut out = String::new();
    for node in tree {
        visit(node, 0, &mut out);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> Statement {
        Statement::new(StatementKind::Event { event: EventKind::PlayerJoin }, "on player join:", 1, 0)
    }

    fn broadcast(line_number: usize) -> Statement {
        Statement::new(
            StatementKind::Broadcast { message: "hi".into() },
            "broadcast \"hi\"",
            line_number,
            1,
        )
    }

    #[test]
    fn block_kinds() {
        assert!(event().is_block());
        assert!(!broadcast(2).is_block());
        assert!(StatementKind::Loop { source: LoopSource::Players }.is_block());
        assert!(!StatementKind::Action.is_block());
    }

    #[test]
    fn leaf_refuses_children_and_returns_them() {
        let mut leaf = broadcast(1);
        let child = broadcast(2);
        let back = leaf.add_child(child).unwrap_err();
        assert_eq!(back.line_number(), 2);
        assert!(leaf.children().is_empty());
    }

    #[test]
    fn block_accepts_children() {
        let mut ev = event();
        ev.add_child(broadcast(2)).unwrap();
        ev.add_child(broadcast(3)).unwrap();
        assert_eq!(ev.children().len(), 2);
        assert_eq!(ev.count(), 3);
    }

    #[test]
    fn record_accumulates() {
        let node = broadcast(1);
        node.record(Duration::from_millis(4));
        node.record(Duration::from_millis(2));
        assert_eq!(node.invocations(), 2);
        assert_eq!(node.total_time(), Duration::from_millis(6));
        assert_eq!(node.average_time(), Duration::from_millis(3));
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let mut ev = event();
        ev.add_child(broadcast(2)).unwrap();
        ev.children()[0].record(Duration::from_millis(1));
        let copy = ev.clone();
        copy.children()[0].record(Duration::from_millis(1));
        assert_eq!(ev.children()[0].invocations(), 1);
        assert_eq!(copy.children()[0].invocations(), 2);
        assert_eq!(copy.children()[0].line(), "broadcast \"hi\"");
    }

    #[test]
    fn outline_and_render() {
        let mut ev = event();
        ev.add_child(broadcast(2)).unwrap();
        let tree = vec![ev];
        assert_eq!(outline(&tree), vec![(0, "event"), (1, "broadcast")]);
        assert_eq!(render(&tree), "on player join:\n    broadcast \"hi\"\n");
        assert_eq!(walk(&tree).len(), 2);
        assert_eq!(count(&tree), 2);
    }
}
