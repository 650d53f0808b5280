//! The Script entity: a parsed tree plus what was learned about it.
//!
//! Metadata directives are comment lines read once at load time:
//!
//! ```text
//! # @author Steve
//! # @version 1.2
//! # @description Greets players
//! # @requires Vault
//! # @permission greet.use
//! ```
//!
//! Everything else derived here (events, functions, variables, permissions)
//! comes from a single walk over the statement tree at construction.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use thiserror::Error;

use crate::event::EventKind;

use super::parse::{ParseIssue, Parser};
use super::result::ExecutionResult;
use super::stmt::{self, LoopSource, Statement, StatementKind};

/// Runtime errors kept per script; older ones are dropped first.
const MAX_KEPT_ERRORS: usize = 100;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script '{name}' has {statements} statements (max {max})")]
    Validation { name: String, statements: usize, max: usize },
    #[error("cannot read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("statement grammar failed to compile: {0}")]
    Grammar(#[from] regex::Error),
    #[error("no script named '{0}'")]
    UnknownScript(String),
}

// ── Metadata ──────────────────────────────────────────────────────────────────

/// Values of the `# @…` directives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub author: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub requires: Vec<String>,
    pub permissions: Vec<String>,
}

impl Metadata {
    /// Read every directive in `source`.  Unknown directives are ignored.
    pub fn from_source(source: &str) -> Metadata {
        let mut meta = Metadata::default();
        for line in source.lines() {
            let Some(directive) = line.trim().strip_prefix('#').map(str::trim) else {
                continue;
            };
            let Some(directive) = directive.strip_prefix('@') else {
                continue;
            };
            let (key, value) = directive.split_once(char::is_whitespace).unwrap_or((directive, ""));
            let value = value.trim().to_owned();
            if value.is_empty() {
                continue;
            }
            match key.to_ascii_lowercase().as_str() {
                "author" => meta.author = Some(value),
                "version" => meta.version = Some(value),
                "description" => meta.description = Some(value),
                "requires" => meta.requires.push(value),
                "permission" => meta.permissions.push(value),
                other => log::debug!("ignoring unknown directive @{other}"),
            }
        }
        meta
    }
}

// ── Statistics ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct RunTotals {
    executions: u64,
    total: Duration,
    last: Duration,
    last_executed: Option<SystemTime>,
}

#[derive(Debug, Default)]
struct Issues {
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Point-in-time report for one script.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStats {
    pub name: String,
    pub enabled: bool,
    pub statements: usize,
    pub functions: usize,
    pub events: usize,
    pub variables: usize,
    pub executions: u64,
    pub total_time: Duration,
    pub average_time: Duration,
    pub last_time: Duration,
    pub last_executed: Option<SystemTime>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

// ── Script ────────────────────────────────────────────────────────────────────

/// One loaded script.  Shared as `Arc<Script>`; all post-load mutation goes
/// through atomics and mutexes.
#[derive(Debug)]
pub struct Script {
    name: String,
    source: String,
    tree: Vec<Statement>,
    metadata: Metadata,
    created: SystemTime,
    modified: SystemTime,
    enabled: AtomicBool,
    compiled: bool,
    events: BTreeSet<String>,
    commands: BTreeSet<String>,
    functions: BTreeSet<String>,
    variables: BTreeSet<String>,
    permissions: BTreeSet<String>,
    plugins: BTreeSet<String>,
    issues: Mutex<Issues>,
    totals: Mutex<RunTotals>,
}

impl Script {
    /// Parse `source` and analyze the result.  Never fails: lines that do
    /// not parse become warnings.
    pub fn parse(name: &str, source: &str, parser: &Parser) -> Script {
        let output = parser.parse(name, source);
        let metadata = Metadata::from_source(source);
        let now = SystemTime::now();
        let mut script = Script {
            name: name.to_owned(),
            source: source.to_owned(),
            compiled: !output.issues.iter().any(|i| i.skipped),
            tree: output.tree,
            created: now,
            modified: now,
            enabled: AtomicBool::new(true),
            events: BTreeSet::new(),
            commands: BTreeSet::new(),
            functions: BTreeSet::new(),
            variables: BTreeSet::new(),
            permissions: metadata.permissions.iter().cloned().collect(),
            plugins: metadata.requires.iter().cloned().collect(),
            metadata,
            issues: Mutex::new(Issues::default()),
            totals: Mutex::new(RunTotals::default()),
        };
        script.analyze(&output.issues);
        script
    }

    fn analyze(&mut self, parse_issues: &[ParseIssue]) {
        let mut warnings: Vec<String> = parse_issues.iter().map(ParseIssue::to_string).collect();

        for node in stmt::walk(&self.tree) {
            for reference in references(node.line()) {
                self.variables.insert(reference.to_owned());
            }
            match node.kind() {
                StatementKind::Event { event } => {
                    self.events.insert(event.to_string());
                }
                StatementKind::Command { command } => {
                    self.commands.insert(command.clone());
                    if let Some(perm) = command_permission(command) {
                        self.permissions.insert(perm.to_owned());
                    }
                }
                StatementKind::Function { name, .. } => {
                    self.functions.insert(name.clone());
                }
                StatementKind::Condition { condition } | StatementKind::Else { condition: Some(condition) } => {
                    self.permissions.extend(permissions_in(condition));
                }
                StatementKind::Loop { source: LoopSource::While(cond) } if cond.trim() == "true" => {
                    warnings.push(format!(
                        "line {}: possible infinite loop ({})",
                        node.line_number(),
                        node.line()
                    ));
                }
                StatementKind::SetVariable { variable, .. }
                | StatementKind::AddVariable { variable, .. }
                | StatementKind::DeleteVariable { variable } => {
                    self.variables.insert(variable.clone());
                }
                _ => {}
            }
        }
        self.issues.get_mut().warnings = warnings;
    }

    /// Check the statement count against `max_statements`.
    pub fn validate(&self, max_statements: usize) -> Result<(), ScriptError> {
        let statements = self.statement_count();
        if statements > max_statements {
            return Err(ScriptError::Validation { name: self.name.clone(), statements, max: max_statements });
        }
        Ok(())
    }

    /// Keep the identity of the script this one replaces.
    pub(crate) fn inherit(&mut self, previous: &Script) {
        self.created = previous.created;
        self.enabled.store(previous.is_enabled(), Ordering::Relaxed);
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tree(&self) -> &[Statement] {
        &self.tree
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn created(&self) -> SystemTime {
        self.created
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn last_executed(&self) -> Option<SystemTime> {
        self.totals.lock().last_executed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether every line parsed cleanly.
    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn statement_count(&self) -> usize {
        stmt::count(&self.tree)
    }

    pub fn events(&self) -> &BTreeSet<String> {
        &self.events
    }

    pub fn commands(&self) -> &BTreeSet<String> {
        &self.commands
    }

    pub fn functions(&self) -> &BTreeSet<String> {
        &self.functions
    }

    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn plugins(&self) -> &BTreeSet<String> {
        &self.plugins
    }

    pub fn errors(&self) -> Vec<String> {
        self.issues.lock().errors.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.issues.lock().warnings.clone()
    }

    // ── Lookups ────────────────────────────────────────────────────────────

    /// Top-level handlers for `event`, in source order.
    pub fn handlers_for<'s>(&'s self, event: &'s EventKind) -> impl Iterator<Item = &'s Statement> + 's {
        self.tree
            .iter()
            .filter(move |n| matches!(n.kind(), StatementKind::Event { event: e } if e == event))
    }

    /// Top-level handler for a command word (`/heal`, case-insensitive).
    pub fn command_handler(&self, command: &str) -> Option<&Statement> {
        let wanted = format!("/{}", command.trim_start_matches('/').to_lowercase());
        self.tree
            .iter()
            .find(|n| matches!(n.kind(), StatementKind::Command { command: c } if *c == wanted))
    }

    /// Statements ordered by cumulative time, slowest first.
    pub fn hot_statements(&self, limit: usize) -> Vec<&Statement> {
        let mut nodes: Vec<&Statement> = stmt::walk(&self.tree)
            .into_iter()
            .filter(|n| n.invocations() > 0)
            .collect();
        nodes.sort_by(|a, b| b.total_time().cmp(&a.total_time()));
        nodes.truncate(limit);
        nodes
    }

    // ── Running totals ─────────────────────────────────────────────────────

    /// Fold one finished invocation into the totals.  Error results are
    /// appended to the error list.
    pub fn record_execution(&self, elapsed: Duration, result: &ExecutionResult) {
        {
            let mut t = self.totals.lock();
            t.executions += 1;
            t.total += elapsed;
            t.last = elapsed;
            t.last_executed = Some(SystemTime::now());
        }
        if let Some(error) = result.describe_error() {
            self.add_error(error);
        }
    }

    pub fn add_error(&self, message: impl Into<String>) {
        let mut issues = self.issues.lock();
        issues.errors.push(message.into());
        if issues.errors.len() > MAX_KEPT_ERRORS {
            let excess = issues.errors.len() - MAX_KEPT_ERRORS;
            issues.errors.drain(..excess);
        }
    }

    pub fn add_warning(&self, message: impl Into<String>) {
        self.issues.lock().warnings.push(message.into());
    }

    pub fn clear_errors(&self) {
        self.issues.lock().errors.clear();
    }

    pub fn stats(&self) -> ScriptStats {
        let totals = *self.totals.lock();
        let issues = self.issues.lock();
        ScriptStats {
            name: self.name.clone(),
            enabled: self.is_enabled(),
            statements: self.statement_count(),
            functions: self.functions.len(),
            events: self.events.len(),
            variables: self.variables.len(),
            executions: totals.executions,
            total_time: totals.total,
            average_time: average(totals.total, totals.executions),
            last_time: totals.last,
            last_executed: totals.last_executed,
            errors: issues.errors.clone(),
            warnings: issues.warnings.clone(),
        }
    }

    /// `ERROR:` / `WARNING:` lines, errors first.
    pub fn issues(&self) -> Vec<String> {
        let issues = self.issues.lock();
        issues
            .errors
            .iter()
            .map(|e| format!("ERROR: {e}"))
            .chain(issues.warnings.iter().map(|w| format!("WARNING: {w}")))
            .collect()
    }

    /// Multi-line human-readable report.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let mut out = String::new();
        let _ = writeln!(out, "Script: {}", self.name);
        if let Some(author) = &self.metadata.author {
            let _ = writeln!(out, "  Author: {author}");
        }
        if let Some(version) = &self.metadata.version {
            let _ = writeln!(out, "  Version: {version}");
        }
        if let Some(description) = &self.metadata.description {
            let _ = writeln!(out, "  Description: {description}");
        }
        let _ = writeln!(out, "  Enabled: {}", if stats.enabled { "yes" } else { "no" });
        let _ = writeln!(
            out,
            "  Statements: {}  Functions: {}  Events: {}  Variables: {}",
            stats.statements, stats.functions, stats.events, stats.variables
        );
        let _ = writeln!(
            out,
            "  Executions: {}  Average: {:.2}ms",
            stats.executions,
            stats.average_time.as_secs_f64() * 1000.0
        );
        if !self.permissions.is_empty() {
            let perms: Vec<&str> = self.permissions.iter().map(String::as_str).collect();
            let _ = writeln!(out, "  Permissions: {}", perms.join(", "));
        }
        let _ = write!(out, "  Errors: {}  Warnings: {}", stats.errors.len(), stats.warnings.len());
        out
    }
}

pub(crate) fn average(total: Duration, count: u64) -> Duration {
    match count {
        0 => Duration::ZERO,
        n => total / u32::try_from(n).unwrap_or(u32::MAX),
    }
}

// ── Analysis helpers ──────────────────────────────────────────────────────────

/// Permission implied by a handler for one of the host's own commands.
fn command_permission(command: &str) -> Option<&'static str> {
    match command {
        "/gamemode" => Some("minecraft.command.gamemode"),
        "/give" => Some("minecraft.command.give"),
        "/tp" | "/teleport" => Some("minecraft.command.teleport"),
        "/op" => Some("minecraft.command.op"),
        _ => None,
    }
}

/// Permission names tested by a normalized condition.
fn permissions_in(condition: &str) -> Vec<String> {
    condition
        .match_indices("hasPermission")
        .filter_map(|(pos, pat)| {
            let rest = condition[pos + pat.len()..].trim_start();
            let rest = rest.strip_prefix('(').unwrap_or(rest);
            let token = rest
                .trim_start_matches(['"', '\''])
                .split(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ')'))
                .next()
                .unwrap_or_default();
            (!token.is_empty() && !token.contains(['{', '%'])).then(|| token.to_owned())
        })
        .collect()
}

/// Outermost balanced `{…}` spans in `line`.
fn references(line: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in line.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    out.push(&line[start..=i]);
                }
            }
            _ => {}
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
# @author Steve
# @version 1.2
# @description Greets players
# @requires Vault
# @permission greet.use

on player join:
    set {visits::%player%} to 1
    if player has permission \"greet.vip\":
        broadcast \"vip!\"
on command \"/gamemode\":
    send \"ok\" to player
function greet(name):
    send \"hi %name%\" to player
while true:
    stop
";

    fn script() -> Script {
        Script::parse("greeter", SOURCE, &Parser::new().unwrap())
    }

    #[test]
    fn metadata_directives() {
        let s = script();
        let m = s.metadata();
        assert_eq!(m.author.as_deref(), Some("Steve"));
        assert_eq!(m.version.as_deref(), Some("1.2"));
        assert_eq!(m.description.as_deref(), Some("Greets players"));
        assert!(s.plugins().contains("Vault"));
    }

    #[test]
    fn derived_sets() {
        let s = script();
        assert!(s.events().contains("player_join"));
        assert!(s.commands().contains("/gamemode"));
        assert!(s.functions().contains("greet"));
        assert!(s.variables().contains("{visits::%player%}"));
        for p in ["greet.use", "greet.vip", "minecraft.command.gamemode"] {
            assert!(s.permissions().contains(p), "missing {p}");
        }
    }

    #[test]
    fn infinite_loop_warning() {
        let s = script();
        assert!(s.warnings().iter().any(|w| w.contains("possible infinite loop")));
        assert!(s.issues().iter().any(|i| i.starts_with("WARNING: ")));
    }

    #[test]
    fn validation_counts_every_statement() {
        let s = script();
        assert_eq!(s.statement_count(), 10);
        assert!(s.validate(10).is_ok());
        let err = s.validate(9).unwrap_err();
        assert!(matches!(err, ScriptError::Validation { statements: 10, max: 9, .. }));
    }

    #[test]
    fn lookups() {
        let s = script();
        assert_eq!(s.handlers_for(&EventKind::PlayerJoin).count(), 1);
        assert!(s.command_handler("GAMEMODE").is_some());
        assert!(s.command_handler("/op").is_none());
    }

    #[test]
    fn totals_and_errors() {
        let s = script();
        s.record_execution(Duration::from_millis(10), &ExecutionResult::success());
        s.record_execution(Duration::from_millis(30), &ExecutionResult::error("boom"));
        let stats = s.stats();
        assert_eq!(stats.executions, 2);
        assert_eq!(stats.average_time, Duration::from_millis(20));
        assert_eq!(stats.last_time, Duration::from_millis(30));
        assert_eq!(stats.errors, vec!["boom".to_owned()]);
        assert_eq!(s.issues()[0], "ERROR: boom");
        assert!(s.last_executed().is_some());
    }

    #[test]
    fn error_list_is_bounded() {
        let s = script();
        for i in 0..(MAX_KEPT_ERRORS + 5) {
            s.add_error(format!("e{i}"));
        }
        let errors = s.errors();
        assert_eq!(errors.len(), MAX_KEPT_ERRORS);
        assert_eq!(errors[0], "e5");
    }

    #[test]
    fn summary_mentions_key_facts() {
        let s = script();
        let text = s.summary();
        assert!(text.starts_with("Script: greeter"));
        assert!(text.contains("Author: Steve"));
        assert!(text.contains("Enabled: yes"));
        assert!(text.contains("Statements: 10"));
    }

    #[test]
    fn permission_extraction_forms() {
        assert_eq!(permissions_in("player hasPermission \"a.b\""), vec!["a.b"]);
        assert_eq!(permissions_in("hasPermission(c.d) && x hasPermission e"), vec!["c.d", "e"]);
        assert!(permissions_in("player hasPermission {_perm}").is_empty());
    }

    #[test]
    fn reference_scan() {
        assert_eq!(references("send \"{_a} {b::{_c}}\" to player"), vec!["{_a}", "{b::{_c}}"]);
    }
}
