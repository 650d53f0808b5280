//! Variable resolution and storage.
//!
//! A raw reference picks its namespace purely from its surface syntax:
//!
//! | Shape                  | Namespace   | Storage                               |
//! |------------------------|-------------|---------------------------------------|
//! | `{_name}`              | ephemeral   | reaped after the retention window     |
//! | `{name::%player%}`     | owner       | per acting entity                     |
//! | `{name::*}`            | list        | global, as an index → value list      |
//! | `{name}`               | global      | shared by every script                |
//! | `name`                 | local       | the [`ExecutionContext`]              |
//!
//! The shared maps are `DashMap`s, so concurrent invocations read and write
//! without any outer lock.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::context::ExecutionContext;
use super::expand::{substitute_placeholders, VarLookup};
use super::value::Value;

/// Owner key used when no acting entity is present.
pub const UNKNOWN_OWNER: &str = "unknown";

// ── Namespace ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    Ephemeral,
    Owner,
    List,
    Global,
    Local,
}

impl Namespace {
    pub const ALL: &'static [Namespace] = &[
        Namespace::Ephemeral,
        Namespace::Owner,
        Namespace::List,
        Namespace::Global,
        Namespace::Local,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Namespace::Ephemeral => "ephemeral",
            Namespace::Owner => "owner",
            Namespace::List => "list",
            Namespace::Global => "global",
            Namespace::Local => "local",
        }
    }

    /// Classify a raw reference.  Depends only on the text, so the same
    /// reference always lands in the same namespace.
    pub fn classify(raw: &str) -> Namespace {
        let raw = raw.trim();
        if raw.starts_with("{_") {
            return Namespace::Ephemeral;
        }
        if raw.contains("::%") || raw.contains("%::") {
            return Namespace::Owner;
        }
        match braced(raw) {
            Some(inner) if inner.ends_with("::*") => Namespace::List,
            Some(_) => Namespace::Global,
            None => Namespace::Local,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contents of a `{…}` reference, or `None` if `raw` is not brace-delimited.
fn braced(raw: &str) -> Option<&str> {
    raw.strip_prefix('{')?.strip_suffix('}')
}

// ── Resolution ────────────────────────────────────────────────────────────────

/// A reference resolved against a context: namespace plus storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub namespace: Namespace,
    pub key: String,
    /// Owner key; set only for [`Namespace::Owner`].
    pub owner: Option<String>,
}

/// Resolve `raw` against `ctx`: classify, strip braces, substitute placeholders.
pub fn resolve(raw: &str, ctx: &ExecutionContext) -> Resolved {
    let raw = raw.trim();
    let namespace = Namespace::classify(raw);
    let inner = braced(raw).unwrap_or(raw);
    match namespace {
        Namespace::Owner => {
            let (owner, name) = split_owner(inner, ctx);
            Resolved {
                namespace,
                key: substitute_placeholders(&name, ctx),
                owner: Some(owner),
            }
        }
        Namespace::List => {
            let base = inner.strip_suffix("::*").unwrap_or(inner);
            Resolved { namespace, key: substitute_placeholders(base, ctx), owner: None }
        }
        Namespace::Local => Resolved { namespace, key: inner.to_owned(), owner: None },
        Namespace::Ephemeral | Namespace::Global => Resolved {
            namespace,
            key: substitute_placeholders(inner, ctx),
            owner: None,
        },
    }
}

/// Split an owner-scoped name into `(owner, name-without-owner-segment)`.
///
/// `a::%x%::b` takes the owner from the `%x%` token between the markers.
/// Otherwise the owner is the acting entity, or [`UNKNOWN_OWNER`], and only
/// a `%player%` segment is dropped from the name.
fn split_owner(inner: &str, ctx: &ExecutionContext) -> (String, String) {
    let actor_owner = || {
        ctx.actor()
            .map(|e| e.name.clone())
            .unwrap_or_else(|| UNKNOWN_OWNER.to_owned())
    };

    if let (Some(start), Some(end)) = (inner.find("::%"), inner.rfind("%::")) {
        if end > start + 2 {
            let token = &inner[start + 2..end + 1];
            let owner = match token {
                "%player%" => actor_owner(),
                other => {
                    let substituted = substitute_placeholders(other, ctx);
                    if substituted == other {
                        other.trim_matches('%').to_owned()
                    } else {
                        substituted
                    }
                }
            };
            let name = format!("{}{}", &inner[..start], &inner[end + 1..]);
            return (owner, name);
        }
    }

    // Only `%player%` names the owner; other tokens stay in the key.
    let name = if let Some(start) = inner.find("::%player%") {
        format!("{}{}", &inner[..start], &inner[start + "::%player%".len()..])
    } else if let Some(rest) = inner.strip_prefix("%player%::") {
        rest.to_owned()
    } else {
        inner.to_owned()
    };
    (actor_owner(), name)
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Per-namespace entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariableStats {
    pub global: usize,
    pub lists: usize,
    pub owned: usize,
    pub owners: usize,
    pub ephemeral: usize,
}

impl VariableStats {
    pub fn total(&self) -> usize {
        self.global + self.lists + self.owned + self.ephemeral
    }
}

/// Shared variable namespaces.
#[derive(Debug)]
pub struct VariableStore {
    global: DashMap<String, Value>,
    owned: DashMap<(String, String), Value>,
    ephemeral: DashMap<String, Value>,
    /// Last access per `(namespace, owner::key)`.
    access: DashMap<(Namespace, String), Instant>,
    retention: Duration,
}

impl Default for VariableStore {
    fn default() -> Self {
        VariableStore::new(Duration::from_secs(30 * 60))
    }
}

impl VariableStore {
    pub fn new(retention: Duration) -> Self {
        VariableStore {
            global: DashMap::new(),
            owned: DashMap::new(),
            ephemeral: DashMap::new(),
            access: DashMap::new(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn touch(&self, r: &Resolved) {
        let key = match &r.owner {
            Some(owner) => format!("{owner}::{}", r.key),
            None => r.key.clone(),
        };
        self.access.insert((r.namespace, key), Instant::now());
    }

    /// Read a reference.  A list reference yields the whole list.
    pub fn get(&self, raw: &str, ctx: &ExecutionContext) -> Option<Value> {
        let r = resolve(raw, ctx);
        let value = match r.namespace {
            Namespace::Local => return ctx.local(&r.key).cloned(),
            Namespace::Global | Namespace::List => self.global.get(&r.key).map(|v| v.clone()),
            Namespace::Ephemeral => self.ephemeral.get(&r.key).map(|v| v.clone()),
            Namespace::Owner => self.owned.get(&owner_key(&r)).map(|v| v.clone()),
        };
        self.touch(&r);
        log::trace!("get {raw} ({}:{}) -> {:?}", r.namespace, r.key, value);
        value
    }

    /// Write a reference.  Setting a list appends unless `value` is itself
    /// a list, which replaces it.
    pub fn set(&self, raw: &str, value: Value, ctx: &mut ExecutionContext) {
        let r = resolve(raw, ctx);
        log::trace!("set {raw} ({}:{}) = {value}", r.namespace, r.key);
        match r.namespace {
            Namespace::Local => {
                ctx.set_local(r.key, value);
                return;
            }
            Namespace::Global => {
                self.global.insert(r.key.clone(), value);
            }
            Namespace::Ephemeral => {
                self.ephemeral.insert(r.key.clone(), value);
            }
            Namespace::Owner => {
                self.owned.insert(owner_key(&r), value);
            }
            Namespace::List => {
                if matches!(value, Value::List(_)) {
                    self.global.insert(r.key.clone(), value);
                } else {
                    let mut slot = self.global.entry(r.key.clone()).or_insert_with(|| Value::List(Default::default()));
                    let current = std::mem::take(&mut *slot);
                    *slot = current.push_item(value);
                }
            }
        }
        self.touch(&r);
    }

    /// `add value to raw`: numbers sum, text concatenates, lists append,
    /// an absent variable is simply set, and any other pair is replaced.
    pub fn add(&self, raw: &str, value: Value, ctx: &mut ExecutionContext) {
        let r = resolve(raw, ctx);
        log::trace!("add {value} to {raw} ({}:{})", r.namespace, r.key);
        match r.namespace {
            Namespace::Local => {
                let combined = match ctx.local(&r.key) {
                    Some(old) => combine(old, value),
                    None => value,
                };
                ctx.set_local(r.key, combined);
                return;
            }
            Namespace::List => {
                let mut slot = self.global.entry(r.key.clone()).or_insert_with(|| Value::List(Default::default()));
                let current = std::mem::take(&mut *slot);
                *slot = current.push_item(value);
            }
            Namespace::Global => add_in(&self.global, r.key.clone(), value),
            Namespace::Ephemeral => add_in(&self.ephemeral, r.key.clone(), value),
            Namespace::Owner => add_in(&self.owned, owner_key(&r), value),
        }
        self.touch(&r);
    }

    /// Delete a reference, returning its previous value.
    pub fn remove(&self, raw: &str, ctx: &mut ExecutionContext) -> Option<Value> {
        let r = resolve(raw, ctx);
        log::trace!("remove {raw} ({}:{})", r.namespace, r.key);
        let removed = match r.namespace {
            Namespace::Local => return ctx.remove_local(&r.key),
            Namespace::Global | Namespace::List => self.global.remove(&r.key).map(|(_, v)| v),
            Namespace::Ephemeral => self.ephemeral.remove(&r.key).map(|(_, v)| v),
            Namespace::Owner => self.owned.remove(&owner_key(&r)).map(|(_, v)| v),
        };
        let access_key = match &r.owner {
            Some(owner) => format!("{owner}::{}", r.key),
            None => r.key,
        };
        self.access.remove(&(r.namespace, access_key));
        removed
    }

    /// Drop ephemeral entries not touched within the retention window.
    pub fn reap(&self) -> usize {
        self.reap_at(Instant::now())
    }

    /// [`reap`](Self::reap) as if the current time were `now`.
    pub fn reap_at(&self, now: Instant) -> usize {
        let stale = |t: &Instant| now.saturating_duration_since(*t) > self.retention;
        let before = self.ephemeral.len();
        self.ephemeral.retain(|key, _| {
            self.access
                .get(&(Namespace::Ephemeral, key.clone()))
                .is_some_and(|t| !stale(t.value()))
        });
        self.access.retain(|_, t| !stale(t));
        let reaped = before - self.ephemeral.len();
        log::debug!("variable reaper removed {reaped} ephemeral entries");
        reaped
    }

    pub fn stats(&self) -> VariableStats {
        let mut stats = VariableStats::default();
        for entry in self.global.iter() {
            if matches!(entry.value(), Value::List(_)) {
                stats.lists += 1;
            } else {
                stats.global += 1;
            }
        }
        let mut owners: Vec<String> = self.owned.iter().map(|e| e.key().0.clone()).collect();
        owners.sort();
        owners.dedup();
        stats.owned = self.owned.len();
        stats.owners = owners.len();
        stats.ephemeral = self.ephemeral.len();
        stats
    }

    /// Clear one namespace.  For [`Namespace::Owner`], `owner` limits the
    /// clear to one entity.  Locals live on contexts and are not touched.
    pub fn clear(&self, namespace: Namespace, owner: Option<&str>) {
        match namespace {
            Namespace::Global => self.global.retain(|_, v| matches!(v, Value::List(_))),
            Namespace::List => self.global.retain(|_, v| !matches!(v, Value::List(_))),
            Namespace::Ephemeral => self.ephemeral.clear(),
            Namespace::Owner => match owner {
                Some(o) => self.owned.retain(|(k, _), _| k != o),
                None => self.owned.clear(),
            },
            Namespace::Local => return,
        }
        self.access.retain(|(ns, _), _| *ns != namespace);
        log::debug!("cleared {namespace} variables");
    }
}

impl VarLookup for VariableStore {
    fn lookup(&self, reference: &str, ctx: &ExecutionContext) -> Option<Value> {
        self.get(reference, ctx)
    }
}

fn owner_key(r: &Resolved) -> (String, String) {
    (r.owner.clone().unwrap_or_else(|| UNKNOWN_OWNER.to_owned()), r.key.clone())
}

fn combine(old: &Value, value: Value) -> Value {
    match old {
        Value::List(_) => old.clone().push_item(value),
        _ => old.combine(&value),
    }
}

fn add_in<K>(map: &DashMap<K, Value>, key: K, value: Value)
where
    K: Eq + std::hash::Hash,
{
    let mut slot = map.entry(key).or_insert_with(|| Value::Text(String::new()));
    let combined = match &*slot {
        Value::Text(s) if s.is_empty() => value,
        old => combine(old, value),
    };
    *slot = combined;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Entity;

    fn steve() -> ExecutionContext {
        ExecutionContext::new(Some(Entity::named("Steve", "world")))
    }

    #[test]
    fn classification_precedence() {
        assert_eq!(Namespace::classify("{_tmp}"), Namespace::Ephemeral);
        assert_eq!(Namespace::classify("{_tmp::%player%}"), Namespace::Ephemeral);
        assert_eq!(Namespace::classify("{coins::%player%}"), Namespace::Owner);
        assert_eq!(Namespace::classify("{%player%::home}"), Namespace::Owner);
        assert_eq!(Namespace::classify("{warps::*}"), Namespace::List);
        assert_eq!(Namespace::classify("{motd}"), Namespace::Global);
        assert_eq!(Namespace::classify("loop-number"), Namespace::Local);
        assert_eq!(Namespace::classify("{unterminated"), Namespace::Local);
    }

    #[test]
    fn owner_resolved_per_context() {
        let r = resolve("{coins::%player%}", &steve());
        assert_eq!(r.owner.as_deref(), Some("Steve"));
        assert_eq!(r.key, "coins");

        let r = resolve("{coins::%player%}", &ExecutionContext::console());
        assert_eq!(r.owner.as_deref(), Some(UNKNOWN_OWNER));
    }

    #[test]
    fn owner_between_markers() {
        let mut ctx = steve();
        ctx.set_local("target", Value::Text("Alex".into()));
        let r = resolve("{bank::%target%::balance}", &ctx);
        assert_eq!(r.owner.as_deref(), Some("Alex"));
        assert_eq!(r.key, "bank::balance");
    }

    #[test]
    fn owner_token_other_than_player_stays_in_key() {
        let store = VariableStore::default();
        let mut ctx = steve();
        ctx.set_local("w", Value::Text("home".into()));
        store.set("{warp::%w%}", Value::Int(1), &mut ctx);
        ctx.set_local("w", Value::Text("spawn".into()));
        store.set("{warp::%w%}", Value::Int(2), &mut ctx);
        ctx.set_local("w", Value::Text("home".into()));
        assert_eq!(store.get("{warp::%w%}", &ctx), Some(Value::Int(1)));

        let r = resolve("{warp::%w%}", &ctx);
        assert_eq!(r.owner.as_deref(), Some("Steve"));
        assert_eq!(r.key, "warp::home");
        assert_eq!(resolve("{%w%::warp}", &ctx).key, "home::warp");
        assert_eq!(resolve("{%player%::home}", &ctx).key, "home");
    }

    #[test]
    fn owner_scoped_values_are_separate() {
        let store = VariableStore::default();
        let mut steve = steve();
        let mut alex = ExecutionContext::new(Some(Entity::named("Alex", "world")));
        store.set("{coins::%player%}", Value::Int(5), &mut steve);
        store.set("{coins::%player%}", Value::Int(9), &mut alex);
        assert_eq!(store.get("{coins::%player%}", &steve), Some(Value::Int(5)));
        assert_eq!(store.get("{coins::%player%}", &alex), Some(Value::Int(9)));
        assert_eq!(store.stats().owners, 2);
    }

    #[test]
    fn add_sums_and_concatenates() {
        let store = VariableStore::default();
        let mut ctx = steve();
        store.set("{_x}", Value::Int(5), &mut ctx);
        store.add("{_x}", Value::Int(3), &mut ctx);
        assert_eq!(store.get("{_x}", &ctx), Some(Value::Int(8)));

        store.set("{greeting}", Value::Text("hi".into()), &mut ctx);
        store.add("{greeting}", Value::Int(1), &mut ctx);
        assert_eq!(store.get("{greeting}", &ctx), Some(Value::Text("hi1".into())));
    }

    #[test]
    fn add_to_absent_is_set() {
        let store = VariableStore::default();
        let mut ctx = steve();
        store.add("{count}", Value::Int(2), &mut ctx);
        assert_eq!(store.get("{count}", &ctx), Some(Value::Int(2)));
        store.add("counter", Value::Int(4), &mut ctx);
        assert_eq!(ctx.local("counter"), Some(&Value::Int(4)));
    }

    #[test]
    fn add_without_rule_replaces() {
        let store = VariableStore::default();
        let mut ctx = steve();
        store.set("{flag}", Value::Bool(true), &mut ctx);
        store.add("{flag}", Value::Bool(false), &mut ctx);
        assert_eq!(store.get("{flag}", &ctx), Some(Value::Bool(false)));
    }

    #[test]
    fn list_set_appends_and_list_value_replaces() {
        let store = VariableStore::default();
        let mut ctx = steve();
        store.set("{warps::*}", "spawn".into(), &mut ctx);
        store.add("{warps::*}", "mine".into(), &mut ctx);
        assert_eq!(store.get("{warps::*}", &ctx).unwrap().to_string(), "spawn, mine");

        let replacement = Value::default().push_item("end".into());
        store.set("{warps::*}", replacement, &mut ctx);
        assert_eq!(store.get("{warps::*}", &ctx).unwrap().to_string(), "end");
        assert_eq!(store.stats().lists, 1);
    }

    #[test]
    fn local_lives_on_context() {
        let store = VariableStore::default();
        let mut ctx = steve();
        store.set("x", Value::Int(1), &mut ctx);
        assert_eq!(ctx.local("x"), Some(&Value::Int(1)));
        assert_eq!(store.stats().total(), 0);
        assert_eq!(store.remove("x", &mut ctx), Some(Value::Int(1)));
    }

    #[test]
    fn placeholder_in_key_uses_locals() {
        let store = VariableStore::default();
        let mut ctx = steve();
        ctx.set_local("slot", Value::Int(2));
        store.set("{kit_%slot%}", "axe".into(), &mut ctx);
        assert_eq!(store.get("{kit_2}", &ctx), Some(Value::Text("axe".into())));
    }

    #[test]
    fn reaper_only_drops_stale_ephemeral() {
        let store = VariableStore::new(Duration::from_secs(60));
        let mut ctx = steve();
        store.set("{_tmp}", Value::Int(1), &mut ctx);
        store.set("{keep}", Value::Int(1), &mut ctx);
        assert_eq!(store.reap(), 0);
        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(store.reap_at(later), 1);
        assert_eq!(store.get("{_tmp}", &ctx), None);
        assert_eq!(store.get("{keep}", &ctx), Some(Value::Int(1)));
    }

    #[test]
    fn clear_owner_namespace_for_one_entity() {
        let store = VariableStore::default();
        let mut steve = steve();
        let mut alex = ExecutionContext::new(Some(Entity::named("Alex", "world")));
        store.set("{home::%player%}", "a".into(), &mut steve);
        store.set("{home::%player%}", "b".into(), &mut alex);
        store.clear(Namespace::Owner, Some("Steve"));
        assert_eq!(store.get("{home::%player%}", &steve), None);
        assert!(store.get("{home::%player%}", &alex).is_some());
    }

    #[test]
    fn remove_global() {
        let store = VariableStore::default();
        let mut ctx = steve();
        store.set("{motd}", "hello".into(), &mut ctx);
        assert!(store.remove("{motd}", &mut ctx).is_some());
        assert_eq!(store.get("{motd}", &ctx), None);
    }
}
