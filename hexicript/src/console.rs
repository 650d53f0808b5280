//! Console-backed [`Host`] for the `hexicript` binary.
//!
//! There is no world: messages and effects are printed as lines, entities
//! are the ones registered with [`ConsoleHost::join`], and every registered
//! entity holds every permission unless [`ConsoleHost::deny`] says otherwise.

use std::collections::HashSet;
use std::io::{self, Write};

use parking_lot::{Mutex, RwLock};

use crate::host::{Animation, Entity, Host, ItemStack, Location};

/// World name given to entities created from the command line.
pub const CONSOLE_WORLD: &str = "console";

pub struct ConsoleHost {
    out: Mutex<Box<dyn Write + Send>>,
    entities: RwLock<Vec<Entity>>,
    denied: RwLock<HashSet<(String, String)>>,
}

impl ConsoleHost {
    /// Host printing to stdout.
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    /// Host printing to `out`.
    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        ConsoleHost {
            out: Mutex::new(out),
            entities: RwLock::new(Vec::new()),
            denied: RwLock::new(HashSet::new()),
        }
    }

    /// Register an entity named `name` and return it.
    pub fn join(&self, name: &str) -> Entity {
        let entity = Entity::named(name, CONSOLE_WORLD);
        let mut entities = self.entities.write();
        entities.retain(|e| e.name != name);
        entities.push(entity.clone());
        entity
    }

    /// Withhold `permission` from the entity named `name`.
    pub fn deny(&self, name: &str, permission: &str) {
        self.denied.write().insert((name.to_owned(), permission.to_owned()));
    }

    fn emit(&self, line: std::fmt::Arguments<'_>) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            log::warn!("console write failed: {e}");
        }
    }
}

impl Default for ConsoleHost {
    fn default() -> Self {
        ConsoleHost::new()
    }
}

impl Host for ConsoleHost {
    fn find_entity(&self, name: &str) -> Option<Entity> {
        self.entities.read().iter().find(|e| e.name.eq_ignore_ascii_case(name)).cloned()
    }

    fn online_entities(&self) -> Vec<Entity> {
        self.entities.read().clone()
    }

    fn send_message(&self, target: &Entity, text: &str) {
        self.emit(format_args!("[to {}] {text}", target.name));
    }

    fn broadcast(&self, text: &str) {
        self.emit(format_args!("[broadcast] {text}"));
    }

    fn resolve_item(&self, descriptor: &str, amount: u32) -> Option<ItemStack> {
        let material = descriptor.trim().to_ascii_lowercase().replace(' ', "_");
        (!material.is_empty()).then_some(ItemStack { material, amount })
    }

    fn resolve_location(&self, descriptor: &str, actor: Option<&Entity>) -> Option<Location> {
        let world = actor.map_or(CONSOLE_WORLD, |a| a.world.as_str());
        Location::parse_coordinates(descriptor, world)
    }

    fn teleport(&self, target: &Entity, to: &Location) {
        self.emit(format_args!("[teleport {}] {} {} {} in {}", target.name, to.x, to.y, to.z, to.world));
    }

    fn give_item(&self, target: &Entity, item: &ItemStack) {
        self.emit(format_args!("[give {}] {} x{}", target.name, item.material, item.amount));
    }

    fn play_animation(&self, animation: Animation, params: &[String], actor: Option<&Entity>) {
        let who = actor.map_or("console", |a| a.name.as_str());
        self.emit(format_args!("[animate {who}] {animation}({})", params.join(", ")));
    }

    fn has_permission(&self, entity: &Entity, permission: &str) -> bool {
        self.find_entity(&entity.name).is_some()
            && !self.denied.read().contains(&(entity.name.clone(), permission.to_owned()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn host() -> (ConsoleHost, Sink) {
        let sink = Sink::default();
        (ConsoleHost::with_writer(Box::new(sink.clone())), sink)
    }

    fn text(sink: &Sink) -> String {
        String::from_utf8(sink.0.lock().clone()).unwrap()
    }

    #[test]
    fn join_and_find() {
        let (h, _) = host();
        h.join("Steve");
        h.join("Steve");
        assert_eq!(h.online_entities().len(), 1);
        assert_eq!(h.find_entity("steve").unwrap().world, CONSOLE_WORLD);
        assert!(h.find_entity("Alex").is_none());
    }

    #[test]
    fn output_lines() {
        let (h, sink) = host();
        let steve = h.join("Steve");
        h.send_message(&steve, "hi");
        h.broadcast("all");
        h.give_item(&steve, &h.resolve_item("Diamond Sword", 2).unwrap());
        assert_eq!(text(&sink), "[to Steve] hi\n[broadcast] all\n[give Steve] diamond_sword x2\n");
    }

    #[test]
    fn permissions_default_granted() {
        let (h, _) = host();
        let steve = h.join("Steve");
        assert!(h.has_permission(&steve, "kit.vip"));
        h.deny("Steve", "kit.vip");
        assert!(!h.has_permission(&steve, "kit.vip"));
        assert!(!h.has_permission(&Entity::named("Ghost", "w"), "kit.vip"));
    }

    #[test]
    fn locations_use_actor_world() {
        let (h, _) = host();
        let mut steve = h.join("Steve");
        steve.world = "nether".into();
        assert_eq!(h.resolve_location("1, 2, 3", Some(&steve)).unwrap().world, "nether");
        assert!(h.resolve_location("spawn", None).is_none());
    }
}
