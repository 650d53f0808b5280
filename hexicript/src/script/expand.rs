//! Text substitution for hexicript fields.
//!
//! Every textual field of a statement (message, target, item, location,
//! right-hand side) is expanded before use:
//!
//! | Sequence          | Meaning                                              |
//! |-------------------|------------------------------------------------------|
//! | `{ref}`           | Variable reference, resolved through [`VarLookup`]   |
//! | `{a{b}}`          | Nested reference; the inner one is expanded first    |
//! | `%player%`        | Acting entity's name                                 |
//! | `%player_name%`   | Acting entity's display name                         |
//! | `%player_world%`  | Acting entity's world                                |
//! | `%player_uuid%`   | Acting entity's unique id                            |
//! | `%event%`         | Name of the triggering event                         |
//! | `%name%`          | Invocation-local variable `name`                     |
//!
//! Unset references and unknown placeholders are left verbatim.
//! Placeholders inside a `{…}` reference are not touched here: the variable
//! resolver needs to see them to pick the namespace and owner.

use super::context::ExecutionContext;
use super::value::Value;

/// Variable lookup used by [`expand`].
pub trait VarLookup {
    /// Value of the braced reference `reference` (e.g. `"{_x}"`), if set.
    fn lookup(&self, reference: &str, ctx: &ExecutionContext) -> Option<Value>;
}

/// Expand variable references and placeholders in `src`.
pub fn expand(src: &str, ctx: &ExecutionContext, vars: &dyn VarLookup) -> String {
    expand_with(src, ctx, vars, true)
}

/// Expand only the `{…}` references nested in `src`, leaving `%token%`
/// placeholders for the variable resolver.  Used on the inside of a
/// reference.
pub fn expand_references(src: &str, ctx: &ExecutionContext, vars: &dyn VarLookup) -> String {
    expand_with(src, ctx, vars, false)
}

fn expand_with(src: &str, ctx: &ExecutionContext, vars: &dyn VarLookup, placeholders: bool) -> String {
    let text = |literal: &str| {
        if placeholders {
            substitute_placeholders(literal, ctx)
        } else {
            literal.to_owned()
        }
    };
    let mut out = String::with_capacity(src.len());
    let mut rest = src;

    while let Some(open) = rest.find('{') {
        let Some(close) = matching_brace(&rest[open..]) else {
            break;
        };
        out.push_str(&text(&rest[..open]));

        let inner = expand_references(&rest[open + 1..open + close], ctx, vars);
        let reference = format!("{{{inner}}}");
        match vars.lookup(&reference, ctx) {
            Some(v) => out.push_str(&v.to_string()),
            None => out.push_str(&reference),
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(&text(rest));
    out
}

/// Offset of the `}` matching the `{` at `s[0]`, if balanced.
fn matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replace `%token%` placeholders from the acting entity, the trigger
/// event, or invocation-local variables.
pub fn substitute_placeholders(src: &str, ctx: &ExecutionContext) -> String {
    if !src.contains('%') {
        return src.to_owned();
    }
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(open) = rest.find('%') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(len) = after.find('%') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let token = &after[..len];
        if !is_token(token) {
            // Not a placeholder; keep this '%' and rescan from the next one.
            out.push('%');
            rest = after;
            continue;
        }
        match placeholder(token, ctx) {
            Some(v) => out.push_str(&v),
            None => {
                out.push('%');
                out.push_str(token);
                out.push('%');
            }
        }
        rest = &after[len + 1..];
    }
    out.push_str(rest);
    out
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn placeholder(token: &str, ctx: &ExecutionContext) -> Option<String> {
    let actor = ctx.actor();
    match token {
        "player" => actor.map(|e| e.name.clone()),
        "player_name" => actor.map(|e| e.display_name.clone()),
        "player_world" => actor.map(|e| e.world.clone()),
        "player_uuid" => actor.map(|e| e.id.clone()),
        "event" => ctx.trigger().map(|t| t.kind.to_string()),
        local => ctx.local(local).map(Value::to_string),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
