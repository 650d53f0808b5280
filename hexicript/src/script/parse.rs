//! hexicript parser: source text → statement tree.
//!
//! Each non-blank, non-comment line is classified on its own against an
//! ordered pattern table (first match wins, every pattern anchored to the
//! whole trimmed line):
//!
//! | #  | Kind          | Shape                               |
//! |----|---------------|-------------------------------------|
//! | 1  | command       | `on command "/name":`               |
//! | 2  | event         | `on <declaration>:`                 |
//! | 3  | function      | `function name(a, b):`              |
//! | 4  | condition     | `if <condition>:`                   |
//! | 5  | else          | `else:` / `else if <condition>:`    |
//! | 6  | loop          | `loop <source>:` / `while <cond>:`  |
//! | 7  | variable-set  | `set <var> to <value>`              |
//! | 8  | variable-add  | `add <value> to <var>`              |
//! | 9  | send-message  | `send "<text>" [to <target>]`       |
//! | 10 | broadcast     | `broadcast "<text>"`                |
//! | 11 | give-item     | `give <target> [amount] <item>`     |
//! | 12 | teleport      | `teleport <target> to <location>`   |
//! | 13 | animate       | `animate_<kind>(params)`            |
//! | 14 | break         | `break`                             |
//! | 15 | continue      | `continue`                          |
//! | 16 | return        | `return [value]` / `stop`           |
//! | 17 | cancel        | `cancel [event]`                    |
//! | 18 | delete        | `delete <var>` / `clear <var>`      |
//! | 19 | call          | `call name(args)`                   |
//! | -  | action        | anything else                       |
//!
//! Nesting comes from indentation alone.  The parser keeps a stack of open
//! blocks, each strictly deeper than the one below it; a new line first
//! closes every open block at its own depth or deeper, then attaches to
//! whatever block is left open (or becomes top-level).
//!
//! A line that fails to parse is logged, reported as a [`ParseIssue`], and
//! skipped; it never aborts the rest of the file.

use regex::{Captures, Regex};

use crate::event::EventKind;

use super::expr::{find_outside_quotes, opens_quote, split_outside_quotes, unquote};
use super::stmt::{LoopSource, Statement, StatementKind};

// ── Output ────────────────────────────────────────────────────────────────────

/// A line the parser skipped or could only partly understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub line_number: usize,
    pub line: String,
    pub message: String,
    /// The line was dropped from the tree.
    pub skipped: bool,
}

impl std::fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {} ({})", self.line_number, self.message, self.line)
    }
}

/// A parsed statement forest plus the issues met along the way.
#[derive(Debug, Clone, Default)]
pub struct ParseOutput {
    pub tree: Vec<Statement>,
    pub issues: Vec<ParseIssue>,
}

// ── Grammar ───────────────────────────────────────────────────────────────────

/// The compiled pattern table.
#[derive(Debug)]
struct Grammar {
    command: Regex,
    event: Regex,
    function: Regex,
    condition: Regex,
    else_: Regex,
    loop_: Regex,
    set: Regex,
    add: Regex,
    send: Regex,
    broadcast: Regex,
    give: Regex,
    teleport: Regex,
    animate: Regex,
    return_: Regex,
    cancel: Regex,
    delete: Regex,
    call: Regex,
    times: Regex,
    players: Regex,
    /// Natural-language rewrites applied to condition text, in order.
    rewrites: Vec<(Regex, &'static str)>,
}

impl Grammar {
    fn new() -> Result<Self, regex::Error> {
        Ok(Grammar {
            command: Regex::new(r#"(?i)^on\s+command\s+"?(/?[^":]+?)"?\s*:$"#)?,
            event: Regex::new(r"(?i)^on\s+(.+?)\s*:$")?,
            function: Regex::new(r"(?i)^function\s+([A-Za-z_][\w-]*)\s*\((.*)\)\s*(?:::\s*[\w ]+?)?\s*:$")?,
            condition: Regex::new(r"(?i)^if\s+(.+?)\s*:$")?,
            else_: Regex::new(r"(?i)^else(?:\s+if\s+(.+?))?\s*:$")?,
            loop_: Regex::new(r"(?i)^(loop|while)\s+(.+?)\s*:$")?,
            set: Regex::new(r"(?i)^set\s+(.+?)\s+to\s+(.+)$")?,
            add: Regex::new(r"(?i)^add\s+(.+?)\s+to\s+(.+)$")?,
            send: Regex::new(r#"(?i)^send\s+"(.*?)"(?:\s+to\s+(.+))?$"#)?,
            broadcast: Regex::new(r"(?i)^broadcast\s+(.+)$")?,
            give: Regex::new(r"(?i)^give\s+(\S+)\s+(?:(\d+|\{[^}\s]+\})\s+)?(.+)$")?,
            teleport: Regex::new(r"(?i)^teleport\s+(.+?)\s+to\s+(.+)$")?,
            animate: Regex::new(r"(?i)^animate_(\w+)\s*\((.*)\)$")?,
            return_: Regex::new(r"(?i)^(?:return(?:\s+(.+))?|stop)$")?,
            cancel: Regex::new(r"(?i)^cancel(?:\s+(?:the\s+)?event)?$")?,
            delete: Regex::new(r"(?i)^(?:delete|clear)\s+(.+)$")?,
            call: Regex::new(r"(?i)^call\s+([A-Za-z_][\w-]*)\s*\((.*)\)$")?,
            times: Regex::new(r"(?i)^(\d+)\s+times?$")?,
            players: Regex::new(r"(?i)^(?:all\s+)?(?:online\s+)?players$")?,
            rewrites: vec![
                (Regex::new(r"(?i)\bis\s+not\b")?, "!="),
                (Regex::new(r"(?i)\bis\s+(?:greater|more)\s+than\s+or\s+equal\s+to\b")?, ">="),
                (Regex::new(r"(?i)\bis\s+(?:less|smaller)\s+than\s+or\s+equal\s+to\b")?, "<="),
                (Regex::new(r"(?i)\bis\s+(?:greater|more)\s+than\b")?, ">"),
                (Regex::new(r"(?i)\bis\s+(?:less|smaller)\s+than\b")?, "<"),
                (Regex::new(r"(?i)\bis\b")?, "=="),
                (Regex::new(r"(?i)\bhas\s+permission\b")?, "hasPermission"),
                (Regex::new(r"(?i)\bhas\b")?, "contains"),
                (Regex::new(r"(?i)\band\b")?, "&&"),
                (Regex::new(r"(?i)\bor\b")?, "||"),
            ],
        })
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Line-oriented parser.  Build once and reuse; it holds no per-parse state.
#[derive(Debug)]
pub struct Parser {
    grammar: Grammar,
}

impl Parser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Parser { grammar: Grammar::new()? })
    }

    /// Parse a whole script.  `name` is only used for log messages.
    pub fn parse(&self, name: &str, source: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let mut open: Vec<Statement> = Vec::new();

        for (idx, raw) in source.lines().enumerate() {
            let line_number = idx + 1;
            let Some(text) = code_of(raw) else {
                continue;
            };
            let indent = indent_level(raw);

            let kind = match self.classify(text) {
                Ok(kind) => kind,
                Err(message) => {
                    log::warn!("{name}: line {line_number}: {message}: {text}");
                    out.issues.push(ParseIssue {
                        line_number,
                        line: text.to_owned(),
                        message,
                        skipped: true,
                    });
                    continue;
                }
            };
            if let StatementKind::Loop { source: LoopSource::Unknown(src) } = &kind {
                out.issues.push(ParseIssue {
                    line_number,
                    line: text.to_owned(),
                    message: format!("unknown loop source '{src}' never iterates"),
                    skipped: false,
                });
            }

            let node = Statement::new(kind, text, line_number, indent);
            while open.last().is_some_and(|top| top.indent() >= indent) {
                close_top(&mut open, &mut out.tree);
            }
            if node.is_block() {
                open.push(node);
            } else {
                attach(node, &mut open, &mut out.tree);
            }
        }
        while !open.is_empty() {
            close_top(&mut open, &mut out.tree);
        }
        out
    }

    /// Classify one trimmed, comment-free line.
    pub fn classify(&self, line: &str) -> Result<StatementKind, String> {
        if has_unterminated_quote(line) {
            return Err("unterminated string".to_owned());
        }
        let g = &self.grammar;

        if let Some(c) = g.command.captures(line) {
            let word = cap(&c, 1).split_whitespace().next().unwrap_or_default();
            let command = format!("/{}", word.trim_start_matches('/').to_lowercase());
            if command == "/" {
                return Err("empty command name".to_owned());
            }
            return Ok(StatementKind::Command { command });
        }
        if let Some(c) = g.event.captures(line) {
            return Ok(StatementKind::Event { event: EventKind::from_declaration(cap(&c, 1)) });
        }
        if let Some(c) = g.function.captures(line) {
            let params = split_list(cap(&c, 2))
                .into_iter()
                .map(|p| p.split(':').next().unwrap_or_default().trim().to_owned())
                .collect::<Vec<_>>();
            if let Some(bad) = params.iter().find(|p| !is_identifier(p)) {
                return Err(format!("invalid parameter name '{bad}'"));
            }
            return Ok(StatementKind::Function { name: cap(&c, 1).to_owned(), params });
        }
        if let Some(c) = g.condition.captures(line) {
            return Ok(StatementKind::Condition { condition: self.normalize_condition(cap(&c, 1)) });
        }
        if let Some(c) = g.else_.captures(line) {
            let condition = c.get(1).map(|m| self.normalize_condition(m.as_str()));
            return Ok(StatementKind::Else { condition });
        }
        if let Some(c) = g.loop_.captures(line) {
            let source = if cap(&c, 1).eq_ignore_ascii_case("while") {
                LoopSource::While(self.normalize_condition(cap(&c, 2)))
            } else {
                self.loop_source(cap(&c, 2))?
            };
            return Ok(StatementKind::Loop { source });
        }
        if let Some(c) = g.set.captures(line) {
            let variable = reference(cap(&c, 1))?;
            return Ok(StatementKind::SetVariable { variable, value: unquote(cap(&c, 2)).to_owned() });
        }
        if let Some(c) = g.add.captures(line) {
            let variable = reference(cap(&c, 2))?;
            return Ok(StatementKind::AddVariable { variable, value: unquote(cap(&c, 1)).to_owned() });
        }
        if let Some(c) = g.send.captures(line) {
            let target = c.get(2).map_or("player", |m| m.as_str()).trim();
            return Ok(StatementKind::SendMessage {
                message: cap(&c, 1).to_owned(),
                target: unquote(target).to_owned(),
            });
        }
        if let Some(c) = g.broadcast.captures(line) {
            return Ok(StatementKind::Broadcast { message: unquote(cap(&c, 1)).to_owned() });
        }
        if let Some(c) = g.give.captures(line) {
            return Ok(StatementKind::GiveItem {
                target: cap(&c, 1).to_owned(),
                amount: c.get(2).map_or("1", |m| m.as_str()).to_owned(),
                item: unquote(cap(&c, 3)).to_owned(),
            });
        }
        if let Some(c) = g.teleport.captures(line) {
            return Ok(StatementKind::Teleport {
                target: unquote(cap(&c, 1)).to_owned(),
                location: unquote(cap(&c, 2)).to_owned(),
            });
        }
        if let Some(c) = g.animate.captures(line) {
            return Ok(StatementKind::Animate {
                animation: cap(&c, 1).to_lowercase(),
                params: split_list(cap(&c, 2)),
            });
        }
        if line.eq_ignore_ascii_case("break") {
            return Ok(StatementKind::Break);
        }
        if line.eq_ignore_ascii_case("continue") {
            return Ok(StatementKind::Continue);
        }
        if let Some(c) = g.return_.captures(line) {
            let value = c.get(1).map(|m| unquote(m.as_str().trim()).to_owned());
            return Ok(StatementKind::Return { value });
        }
        if g.cancel.is_match(line) {
            return Ok(StatementKind::Cancel);
        }
        if let Some(c) = g.delete.captures(line) {
            return Ok(StatementKind::DeleteVariable { variable: reference(cap(&c, 1))? });
        }
        if let Some(c) = g.call.captures(line) {
            return Ok(StatementKind::Call { function: cap(&c, 1).to_owned(), args: split_list(cap(&c, 2)) });
        }
        Ok(StatementKind::Action)
    }

    fn loop_source(&self, text: &str) -> Result<LoopSource, String> {
        let text = text.trim();
        if let Some(c) = self.grammar.times.captures(text) {
            let n = cap(&c, 1)
                .parse::<u64>()
                .map_err(|e| format!("bad loop count '{}': {e}", cap(&c, 1)))?;
            return Ok(LoopSource::Times(n));
        }
        if self.grammar.players.is_match(text) {
            return Ok(LoopSource::Players);
        }
        if text.eq_ignore_ascii_case("forever") {
            return Ok(LoopSource::While("true".to_owned()));
        }
        Ok(LoopSource::Unknown(text.to_owned()))
    }

    /// Rewrite natural-language condition words into operators.  Quoted
    /// strings and `{…}` references are left untouched.
    pub fn normalize_condition(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for (segment, literal) in segments(text.trim()) {
            if literal {
                out.push_str(segment);
                continue;
            }
            let mut s = segment.to_owned();
            for (re, rep) in &self.grammar.rewrites {
                s = re.replace_all(&s, *rep).into_owned();
            }
            out.push_str(&s);
        }
        out
    }
}

// ── Nesting ───────────────────────────────────────────────────────────────────

fn attach(node: Statement, open: &mut [Statement], roots: &mut Vec<Statement>) {
    match open.last_mut() {
        Some(parent) => {
            if let Err(orphan) = parent.add_child(node) {
                roots.push(orphan);
            }
        }
        None => roots.push(node),
    }
}

fn close_top(open: &mut Vec<Statement>, roots: &mut Vec<Statement>) {
    if let Some(node) = open.pop() {
        attach(node, open, roots);
    }
}

// ── Line helpers ──────────────────────────────────────────────────────────────

/// Nesting level of a raw line: leading whitespace in spaces (tab = 4),
/// divided by four.
pub fn indent_level(raw: &str) -> usize {
    let spaces: usize = raw
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum();
    spaces / 4
}

/// The code part of a raw line, or `None` for blank and comment lines.
fn code_of(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let code = match find_outside_quotes(trimmed, " #") {
        Some(pos) => trimmed[..pos].trim_end(),
        None => trimmed,
    };
    (!code.is_empty()).then_some(code)
}

fn cap<'t>(c: &Captures<'t>, i: usize) -> &'t str {
    c.get(i).map_or("", |m| m.as_str().trim())
}

fn has_unterminated_quote(line: &str) -> bool {
    line.chars().filter(|&c| c == '"').count() % 2 == 1
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Validate a variable reference: `{…}` or a bare local name.
fn reference(text: &str) -> Result<String, String> {
    let t = text.trim();
    let braced = t.starts_with('{') && t.ends_with('}') && t.len() > 2;
    if braced || is_identifier(t) {
        Ok(t.to_owned())
    } else {
        Err(format!("invalid variable reference '{t}'"))
    }
}

/// Split a comma-separated argument list, unquoting each entry.
fn split_list(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    split_outside_quotes(text, ",")
        .into_iter()
        .map(|s| unquote(s.trim()).to_owned())
        .collect()
}

/// Split text into `(segment, is_literal)` runs, where quoted strings and
/// `{…}` references are literal.
fn segments(text: &str) -> Vec<(&str, bool)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let close = match c {
            '{' => '}',
            _ if opens_quote(text, i, c) => c,
            _ => continue,
        };
        if i > start {
            out.push((&text[start..i], false));
        }
        let mut end = text.len();
        for (j, d) in chars.by_ref() {
            if d == close {
                end = j + d.len_utf8();
                break;
            }
        }
        out.push((&text[i..end], true));
        start = end;
    }
    if start < text.len() {
        out.push((&text[start..], false));
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::stmt::outline;

    fn parser() -> Parser {
        Parser::new().unwrap()
    }

    fn kind(line: &str) -> StatementKind {
        parser().classify(line).unwrap()
    }

    #[test]
    fn indent_levels() {
        assert_eq!(indent_level("x"), 0);
        assert_eq!(indent_level("    x"), 1);
        assert_eq!(indent_level("\tx"), 1);
        assert_eq!(indent_level("\t    x"), 2);
        assert_eq!(indent_level("  x"), 0);
        assert_eq!(indent_level("      x"), 1);
    }

    #[test]
    fn command_beats_event() {
        assert_eq!(kind("on command \"/heal\":"), StatementKind::Command { command: "/heal".into() });
        assert_eq!(kind("on command /Spawn:"), StatementKind::Command { command: "/spawn".into() });
        assert_eq!(kind("on player join:"), StatementKind::Event { event: EventKind::PlayerJoin });
    }

    #[test]
    fn function_definition() {
        assert_eq!(
            kind("function greet(name, times: number):"),
            StatementKind::Function { name: "greet".into(), params: vec!["name".into(), "times".into()] }
        );
        assert_eq!(kind("function noop():"), StatementKind::Function { name: "noop".into(), params: vec![] });
        assert!(parser().classify("function bad(1x):").is_err());
    }

    #[test]
    fn condition_normalization() {
        assert_eq!(kind("if {_x} is 5:"), StatementKind::Condition { condition: "{_x} == 5".into() });
        assert_eq!(
            kind("if {_x} is not 5 and player has permission \"a.b\":"),
            StatementKind::Condition { condition: "{_x} != 5 && player hasPermission \"a.b\"".into() }
        );
        assert_eq!(
            kind("if {_x} is greater than 3 or {_y} is less than 2:"),
            StatementKind::Condition { condition: "{_x} > 3 || {_y} < 2".into() }
        );
        assert_eq!(
            kind("if {list::*} has \"this is it\":"),
            StatementKind::Condition { condition: "{list::*} contains \"this is it\"".into() }
        );
    }

    #[test]
    fn normalization_skips_references() {
        let p = parser();
        assert_eq!(p.normalize_condition("{is_or_and} is 1"), "{is_or_and} == 1");
    }

    #[test]
    fn else_forms() {
        assert_eq!(kind("else:"), StatementKind::Else { condition: None });
        assert_eq!(kind("else if {_x} is 2:"), StatementKind::Else { condition: Some("{_x} == 2".into()) });
    }

    #[test]
    fn loop_sources() {
        assert_eq!(kind("loop 500 times:"), StatementKind::Loop { source: LoopSource::Times(500) });
        assert_eq!(kind("loop all players:"), StatementKind::Loop { source: LoopSource::Players });
        assert_eq!(kind("loop players:"), StatementKind::Loop { source: LoopSource::Players });
        assert_eq!(
            kind("while {_i} is less than 3:"),
            StatementKind::Loop { source: LoopSource::While("{_i} < 3".into()) }
        );
        assert_eq!(kind("loop forever:"), StatementKind::Loop { source: LoopSource::While("true".into()) });
        assert_eq!(
            kind("loop all zombies:"),
            StatementKind::Loop { source: LoopSource::Unknown("all zombies".into()) }
        );
    }

    #[test]
    fn variable_statements() {
        assert_eq!(
            kind("set {_x} to \"hello\""),
            StatementKind::SetVariable { variable: "{_x}".into(), value: "hello".into() }
        );
        assert_eq!(
            kind("add 3 to {_x}"),
            StatementKind::AddVariable { variable: "{_x}".into(), value: "3".into() }
        );
        assert_eq!(kind("delete {home::%player%}"), StatementKind::DeleteVariable { variable: "{home::%player%}".into() });
        assert_eq!(kind("clear counter"), StatementKind::DeleteVariable { variable: "counter".into() });
        assert!(parser().classify("set the mood to happy").is_err());
    }

    #[test]
    fn messaging() {
        assert_eq!(
            kind("send \"hi %player%\" to player"),
            StatementKind::SendMessage { message: "hi %player%".into(), target: "player".into() }
        );
        assert_eq!(
            kind("send \"hi\""),
            StatementKind::SendMessage { message: "hi".into(), target: "player".into() }
        );
        assert_eq!(kind("broadcast \"five\""), StatementKind::Broadcast { message: "five".into() });
    }

    #[test]
    fn give_teleport_animate() {
        assert_eq!(
            kind("give player 5 diamond"),
            StatementKind::GiveItem { target: "player".into(), amount: "5".into(), item: "diamond".into() }
        );
        assert_eq!(
            kind("give Alex diamond_sword"),
            StatementKind::GiveItem { target: "Alex".into(), amount: "1".into(), item: "diamond_sword".into() }
        );
        assert_eq!(
            kind("teleport player to 0, 64, 0"),
            StatementKind::Teleport { target: "player".into(), location: "0, 64, 0".into() }
        );
        assert_eq!(
            kind("animate_particle_circle(flame, 2)"),
            StatementKind::Animate { animation: "particle_circle".into(), params: vec!["flame".into(), "2".into()] }
        );
    }

    #[test]
    fn control_flow() {
        assert_eq!(kind("break"), StatementKind::Break);
        assert_eq!(kind("continue"), StatementKind::Continue);
        assert_eq!(kind("stop"), StatementKind::Return { value: None });
        assert_eq!(kind("return {_x}"), StatementKind::Return { value: Some("{_x}".into()) });
        assert_eq!(kind("cancel event"), StatementKind::Cancel);
        assert_eq!(kind("cancel"), StatementKind::Cancel);
        assert_eq!(
            kind("call greet(\"Steve\", 2)"),
            StatementKind::Call { function: "greet".into(), args: vec!["Steve".into(), "2".into()] }
        );
    }

    #[test]
    fn fallback_action() {
        assert_eq!(kind("heal the player"), StatementKind::Action);
    }

    #[test]
    fn nesting_follows_indentation() {
        let src = "\
on player join:
    set {_x} to 1
    if {_x} is 1:
        broadcast \"one\"
        loop 3 times:
            send \"%loop-number%\" to player
    else:
        broadcast \"other\"
    broadcast \"done\"
function f():
    return 1
";
        let out = parser().parse("test", src);
        assert!(out.issues.is_empty());
        assert_eq!(
            outline(&out.tree),
            vec![
                (0, "event"),
                (1, "variable-set"),
                (1, "condition"),
                (2, "broadcast"),
                (2, "loop"),
                (3, "send-message"),
                (1, "else"),
                (2, "broadcast"),
                (1, "broadcast"),
                (0, "function"),
                (1, "return"),
            ]
        );
    }

    #[test]
    fn blank_lines_and_comments_do_not_break_nesting() {
        let src = "on chat:\n\n    # comment\n    broadcast \"a\" # trailing\n\n    broadcast \"b # not a comment\"\n";
        let out = parser().parse("test", src);
        assert_eq!(out.tree.len(), 1);
        let children = out.tree[0].children();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].line(), "broadcast \"a\"");
        assert_eq!(
            children[1].kind(),
            &StatementKind::Broadcast { message: "b # not a comment".into() }
        );
        assert_eq!(children[1].line_number(), 6);
    }

    #[test]
    fn failing_line_is_skipped_not_fatal() {
        let src = "on player join:\n    set the mood to happy\n    broadcast \"still here\"\n";
        let out = parser().parse("test", src);
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].line_number, 2);
        assert_eq!(out.tree[0].children().len(), 1);
    }

    #[test]
    fn indented_leaf_without_block_is_top_level() {
        let out = parser().parse("test", "    broadcast \"a\"\nbroadcast \"b\"\n");
        assert_eq!(outline(&out.tree), vec![(0, "broadcast"), (0, "broadcast")]);
    }

    #[test]
    fn unknown_loop_source_is_reported() {
        let out = parser().parse("test", "loop all zombies:\n    broadcast \"x\"\n");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.tree[0].children().len(), 1);
    }

    #[test]
    fn segments_split_literals() {
        assert_eq!(
            segments("a \"b c\" {d} e"),
            vec![("a ", false), ("\"b c\"", true), (" ", false), ("{d}", true), (" e", false)]
        );
    }

    #[test]
    fn apostrophes_are_not_quotes() {
        let p = parser();
        assert_eq!(p.normalize_condition("{_n} is O'Brien and {_m} is 2"), "{_n} == O'Brien && {_m} == 2");
        assert_eq!(p.normalize_condition("{_n} is 'a and b'"), "{_n} == 'a and b'");
        let out = p.parse("test", "broadcast it's fine # note\n");
        assert!(out.issues.is_empty());
        assert_eq!(out.tree[0].line(), "broadcast it's fine");
    }
}
