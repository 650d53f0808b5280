//! Condition and value evaluation.
//!
//! Condition text reaches the evaluator already normalized by the parser
//! (`is` → `==`, `is not` → `!=`, `has permission` → `hasPermission`,
//! `has` → `contains`, `and`/`or` → `&&`/`||`).
//!
//! Grammar (loosest first):
//!   or-chain `a || b`  →  and-chain `a && b`  →  atom
//!
//! Atoms:
//!   `true` / `false`
//!   `hasPermission(perm)`                 acting entity holds `perm`
//!   `<target> hasPermission <perm>`       named entity (or `player`) holds `perm`
//!   `a contains b`                        substring, or list membership
//!   `a == b`, `a != b`                    numeric if both sides are numbers, else text
//!   `a > b`, `a < b`, `a >= b`, `a <= b`  numeric only
//!
//! Any other shape evaluates to `false`.

use super::context::ExecutionContext;
use super::expand::{expand, VarLookup};
use super::value::Value;

// ── EvalEnv ───────────────────────────────────────────────────────────────────

/// Services the evaluator needs from the executor.
pub trait EvalEnv: VarLookup {
    /// Whether `target` (`"player"` = the acting entity) holds `permission`.
    /// Unknown targets hold nothing.
    fn has_permission(&self, target: &str, permission: &str, ctx: &ExecutionContext) -> bool;

    /// `self` as a plain variable lookup.
    fn vars(&self) -> &dyn VarLookup;
}

// ── Conditions ────────────────────────────────────────────────────────────────

/// Evaluate normalized condition text.  Never fails: malformed conditions
/// are false.
pub fn eval_condition(cond: &str, ctx: &ExecutionContext, env: &dyn EvalEnv) -> bool {
    split_outside_quotes(cond, "||").into_iter().any(|disjunct| {
        split_outside_quotes(disjunct, "&&")
            .into_iter()
            .all(|atom| eval_atom(atom.trim(), ctx, env))
    })
}

fn eval_atom(atom: &str, ctx: &ExecutionContext, env: &dyn EvalEnv) -> bool {
    match atom {
        "true" => return true,
        "false" | "" => return false,
        _ => {}
    }

    if let Some(args) = atom
        .strip_prefix("hasPermission(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        let perm = operand(args, ctx, env);
        return env.has_permission("player", &perm, ctx);
    }

    if let Some(pos) = find_outside_quotes(atom, "hasPermission") {
        let target = operand(&atom[..pos], ctx, env);
        let perm = operand(&atom[pos + "hasPermission".len()..], ctx, env);
        if target.is_empty() || perm.is_empty() {
            return false;
        }
        return env.has_permission(&target, &perm, ctx);
    }

    if let Some(pos) = find_outside_quotes(atom, " contains ") {
        let needle = operand(&atom[pos + " contains ".len()..], ctx, env);
        let haystack = atom[..pos].trim();
        return match reference_value(haystack, ctx, env) {
            Some(v) => v.contains(&needle),
            None => operand(haystack, ctx, env).contains(&needle),
        };
    }

    for op in ["==", "!=", ">=", "<=", ">", "<"] {
        if let Some(pos) = find_outside_quotes(atom, op) {
            let lhs = operand(&atom[..pos], ctx, env);
            let rhs = operand(&atom[pos + op.len()..], ctx, env);
            return compare(&lhs, op, &rhs);
        }
    }

    log::debug!("unrecognized condition {atom:?} evaluates to false");
    false
}

fn compare(lhs: &str, op: &str, rhs: &str) -> bool {
    let nums = lhs.parse::<f64>().ok().zip(rhs.parse::<f64>().ok());
    match (op, nums) {
        ("==", Some((a, b))) => a == b,
        ("!=", Some((a, b))) => a != b,
        ("==", None) => lhs == rhs,
        ("!=", None) => lhs != rhs,
        (">", Some((a, b))) => a > b,
        ("<", Some((a, b))) => a < b,
        (">=", Some((a, b))) => a >= b,
        ("<=", Some((a, b))) => a <= b,
        _ => false,
    }
}

/// Expand and unquote one side of a comparison.  A bare local name
/// (`loop-number`) reads the local.
fn operand(text: &str, ctx: &ExecutionContext, env: &dyn EvalEnv) -> String {
    if let Some(v) = ctx.local(text.trim()) {
        return v.to_string();
    }
    let expanded = expand(text.trim(), ctx, env.vars());
    unquote(expanded.trim()).to_owned()
}

/// The stored value when `text` is exactly one `{…}` reference.
fn reference_value(text: &str, ctx: &ExecutionContext, env: &dyn EvalEnv) -> Option<Value> {
    if text.starts_with('{') && text.ends_with('}') && text.matches('{').count() == 1 {
        env.lookup(text, ctx)
    } else {
        None
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// Evaluate a right-hand side.  A lone `{…}` reference or local name keeps
/// its stored value (lists and entities included); anything else is
/// expanded and typed by [`Value::from_script_text`].
pub fn eval_value(text: &str, ctx: &ExecutionContext, env: &dyn VarLookup) -> Value {
    let t = text.trim();
    if t.starts_with('{') && t.ends_with('}') && t.matches('{').count() == 1 {
        if let Some(v) = env.lookup(t, ctx) {
            return v;
        }
    } else if let Some(v) = ctx.local(t) {
        return v.clone();
    }
    Value::from_script_text(&expand(t, ctx, env))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Strip one pair of matching surrounding quotes.
pub fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Whether `c` at byte `i` of `s` opens a quoted string.  A `'` only does
/// at the start of a word, so apostrophes (`it's`, `O'Brien`) stay text.
pub fn opens_quote(s: &str, i: usize, c: char) -> bool {
    match c {
        '"' => true,
        '\'' => s[..i]
            .chars()
            .next_back()
            .map_or(true, |prev| prev.is_whitespace() || matches!(prev, '(' | ',' | '=' | '!' | '<' | '>')),
        _ => false,
    }
}

/// Byte offset of the first `pat` not inside a quoted string.
pub fn find_outside_quotes(s: &str, pat: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if opens_quote(s, i, c) => quote = Some(c),
            None if s[i..].starts_with(pat) => return Some(i),
            None => {}
        }
    }
    None
}

/// Split on every `sep` not inside a quoted string.
pub fn split_outside_quotes<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(pos) = find_outside_quotes(rest, sep) {
        parts.push(&rest[..pos]);
        rest = &rest[pos + sep.len()..];
    }
    parts.push(rest);
    parts
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::host::Entity;

    struct Env {
        vars: HashMap<&'static str, Value>,
        perms: Vec<(&'static str, &'static str)>,
    }

    impl VarLookup for Env {
        fn lookup(&self, reference: &str, _ctx: &ExecutionContext) -> Option<Value> {
            self.vars.get(reference).cloned()
        }
    }

    impl EvalEnv for Env {
        fn has_permission(&self, target: &str, permission: &str, ctx: &ExecutionContext) -> bool {
            let who = match target {
                "player" => ctx.actor().map(|e| e.name.as_str()).unwrap_or(""),
                other => other,
            };
            self.perms.iter().any(|&(w, p)| w == who && p == permission)
        }

        fn vars(&self) -> &dyn VarLookup {
            self
        }
    }

    fn env() -> Env {
        Env {
            vars: HashMap::from([
                ("{_x}", Value::Int(5)),
                ("{name}", Value::Text("Steve".into())),
                ("{warps::*}", Value::default().push_item("spawn".into())),
            ]),
            perms: vec![("Steve", "kit.vip")],
        }
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(Some(Entity::named("Steve", "world")))
    }

    fn eval(cond: &str) -> bool {
        eval_condition(cond, &ctx(), &env())
    }

    #[test]
    fn equality_after_substitution() {
        assert!(eval("{_x} == 5"));
        assert!(eval("{_x} == 5.0"));
        assert!(!eval("{_x} != 5"));
        assert!(eval("{name} == \"Steve\""));
        assert!(eval("%player% == Steve"));
    }

    #[test]
    fn unset_variable_is_unequal() {
        assert!(!eval("{_y} == 5"));
        assert!(eval("{_y} != 5"));
    }

    #[test]
    fn numeric_ordering() {
        assert!(eval("{_x} > 3"));
        assert!(eval("{_x} <= 5"));
        assert!(!eval("{_x} < 5"));
        assert!(!eval("abc > 3"));
    }

    #[test]
    fn connectives() {
        assert!(eval("{_x} == 5 && {name} == Steve"));
        assert!(!eval("{_x} == 4 && {name} == Steve"));
        assert!(eval("{_x} == 4 || {name} == Steve"));
        assert!(eval("false || true"));
    }

    #[test]
    fn permission_forms() {
        assert!(eval("player hasPermission \"kit.vip\""));
        assert!(eval("hasPermission(kit.vip)"));
        assert!(eval("Steve hasPermission kit.vip"));
        assert!(!eval("Alex hasPermission kit.vip"));
        assert!(!eval("player hasPermission kit.admin"));
    }

    #[test]
    fn contains_text_and_list() {
        assert!(eval("{warps::*} contains spawn"));
        assert!(!eval("{warps::*} contains end"));
        assert!(eval("{name} contains \"eve\""));
    }

    #[test]
    fn unrecognized_shape_is_false() {
        assert!(!eval("the moon is full"));
        assert!(!eval(""));
    }

    #[test]
    fn operators_inside_quotes_are_literal() {
        assert!(eval("\"a == b\" == \"a == b\""));
        assert_eq!(split_outside_quotes("a && \"b && c\"", "&&").len(), 2);
        assert_eq!(split_outside_quotes("x == 'b && c'", "&&").len(), 1);
    }

    #[test]
    fn apostrophe_inside_word_is_text() {
        assert!(eval("{name} == O'Brien || {_x} == 5"));
        assert_eq!(split_outside_quotes("it's && Steve's", "&&"), ["it's ", " Steve's"]);
        assert_eq!(find_outside_quotes("don't # note", " #"), Some(5));
    }

    #[test]
    fn value_typing() {
        let c = ctx();
        let e = env();
        assert_eq!(eval_value("{_x}", &c, &e), Value::Int(5));
        assert_eq!(eval_value("{_x}0", &c, &e), Value::Int(50));
        assert_eq!(eval_value("true", &c, &e), Value::Bool(true));
        assert_eq!(eval_value("hello %player%", &c, &e), Value::Text("hello Steve".into()));
        assert!(matches!(eval_value("{warps::*}", &c, &e), Value::List(_)));
    }

    #[test]
    fn unquote_pairs_only() {
        assert_eq!(unquote("\"hi\""), "hi");
        assert_eq!(unquote("'hi'"), "hi");
        assert_eq!(unquote("\"hi"), "\"hi");
        assert_eq!(unquote("\""), "\"");
    }
}
