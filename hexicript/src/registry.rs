//! Loaded scripts by name.
//!
//! Scripts are shared as `Arc<Script>`: an invocation holds its own clone,
//! so replacing or removing a script never disturbs one already running.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::script::{Script, ScriptError};

#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: RwLock<BTreeMap<String, Arc<Script>>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `script`, replacing any script of the same name.  A
    /// replacement keeps the creation time and enabled flag of the script it
    /// replaces.  Returns the replaced script.
    pub fn insert(&self, mut script: Script) -> Option<Arc<Script>> {
        let mut scripts = self.scripts.write();
        if let Some(previous) = scripts.get(script.name()) {
            script.inherit(previous);
        }
        scripts.insert(script.name().to_owned(), Arc::new(script))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Script>> {
        self.scripts.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Script>> {
        self.scripts.read().get(name).cloned()
    }

    /// Like [`get`](Self::get), with a typed error for unknown names.
    pub fn require(&self, name: &str) -> Result<Arc<Script>, ScriptError> {
        self.get(name).ok_or_else(|| ScriptError::UnknownScript(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.read().contains_key(name)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), ScriptError> {
        self.require(name)?.set_enabled(enabled);
        Ok(())
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.scripts.read().keys().cloned().collect()
    }

    /// Every script, sorted by name.
    pub fn snapshot(&self) -> Vec<Arc<Script>> {
        self.scripts.read().values().cloned().collect()
    }

    /// Enabled scripts, sorted by name.
    pub fn enabled(&self) -> Vec<Arc<Script>> {
        self.scripts.read().values().filter(|s| s.is_enabled()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.scripts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.read().is_empty()
    }

    pub fn clear(&self) {
        self.scripts.write().clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Parser;

    fn script(name: &str, src: &str) -> Script {
        Script::parse(name, src, &Parser::new().unwrap())
    }

    #[test]
    fn insert_get_remove() {
        let reg = ScriptRegistry::new();
        assert!(reg.insert(script("b", "broadcast \"b\"")).is_none());
        reg.insert(script("a", "broadcast \"a\""));
        assert_eq!(reg.names(), ["a", "b"]);
        assert!(reg.get("a").is_some());
        assert!(reg.remove("a").is_some());
        assert!(!reg.contains("a"));
        assert!(matches!(reg.require("a"), Err(ScriptError::UnknownScript(n)) if n == "a"));
    }

    #[test]
    fn replacement_keeps_identity() {
        let reg = ScriptRegistry::new();
        reg.insert(script("a", "broadcast \"one\""));
        reg.set_enabled("a", false).unwrap();
        let created = reg.get("a").unwrap().created();
        let old = reg.insert(script("a", "broadcast \"two\"")).unwrap();
        let new = reg.get("a").unwrap();
        assert_eq!(old.source(), "broadcast \"one\"");
        assert_eq!(new.source(), "broadcast \"two\"");
        assert!(!new.is_enabled());
        assert_eq!(new.created(), created);
    }

    #[test]
    fn enabled_filter() {
        let reg = ScriptRegistry::new();
        reg.insert(script("a", "stop"));
        reg.insert(script("b", "stop"));
        reg.set_enabled("b", false).unwrap();
        let names: Vec<_> = reg.enabled().iter().map(|s| s.name().to_owned()).collect();
        assert_eq!(names, ["a"]);
        assert!(reg.set_enabled("zzz", true).is_err());
    }

    #[test]
    fn running_clone_survives_removal() {
        let reg = ScriptRegistry::new();
        reg.insert(script("a", "broadcast \"x\""));
        let held = reg.get("a").unwrap();
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(held.statement_count(), 1);
    }
}
