//! Runtime value type for hexicript.
//!
//! Script text is untyped; values acquire a type when a right-hand side is
//! evaluated (integer, then float, then boolean literal, else text).  Loops
//! bind entity references and list variables hold an ordered index map.

use std::collections::BTreeMap;
use std::fmt;

use crate::host::Entity;

/// A hexicript runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// A connected entity (bound by `loop all players`, or the acting entity).
    Entity(Entity),
    /// A list variable: 1-based index → value, kept in index order.
    List(BTreeMap<usize, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Text(String::new())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => {
                // Whole floats keep one decimal so they never read as integers.
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{:.1}", x)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Text(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Entity(e) => write!(f, "{}", e.name),
            Value::List(items) => {
                let mut first = true;
                for v in items.values() {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}

impl Value {
    /// Interpret evaluated script text: integer, then float, then boolean
    /// literal (case-insensitive), otherwise the text itself.
    pub fn from_script_text(text: &str) -> Value {
        let t = text.trim();
        if let Ok(n) = t.parse::<i64>() {
            return Value::Int(n);
        }
        if t.contains('.') {
            if let Ok(x) = t.parse::<f64>() {
                if x.is_finite() {
                    return Value::Float(x);
                }
            }
        }
        if t.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if t.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        Value::Text(text.to_owned())
    }

    /// Coerce to boolean: `0`, `""`, `"false"`, `false` and empty lists are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
            Value::Bool(b) => *b,
            Value::Entity(_) => true,
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    /// `add` arithmetic: numbers sum (integers stay integral), anything
    /// textual concatenates, and any other pair is replaced by `rhs`.
    pub fn combine(&self, rhs: &Value) -> Value {
        match (self, rhs) {
            (Value::Int(a), Value::Int(b)) => match a.checked_add(*b) {
                Some(n) => Value::Int(n),
                None => Value::Float(*a as f64 + *b as f64),
            },
            (a, b) if a.is_text() || b.is_text() => Value::Text(format!("{a}{b}")),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Value::Float(x + y),
                _ => rhs.clone(),
            },
        }
    }

    /// Append `item` at the next free index, turning `self` into a list.
    pub fn push_item(self, item: Value) -> Value {
        let mut items = match self {
            Value::List(items) => items,
            _ => BTreeMap::new(),
        };
        let next = items.keys().next_back().map_or(1, |k| k + 1);
        items.insert(next, item);
        Value::List(items)
    }

    /// Whether `needle` is an element of this list, or a substring of its text form.
    pub fn contains(&self, needle: &str) -> bool {
        match self {
            Value::List(items) => items.values().any(|v| v.to_string() == needle),
            other => other.to_string().contains(needle),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Entity> for Value {
    fn from(e: Entity) -> Self {
        Value::Entity(e)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
