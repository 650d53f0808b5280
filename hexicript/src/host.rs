//! Host services consumed by the engine.
//!
//! The engine never touches a world directly.  Every effect a statement can
//! have (messages, items, teleports, animations) and every world query it
//! needs (entity lookup, permissions) goes through the [`Host`] port.  Calls
//! are marshaled onto the host's authoritative thread by
//! [`crate::dispatch::HostBridge`].

use std::fmt;
use std::str::FromStr;

// ── Entity ────────────────────────────────────────────────────────────────────

/// A connected entity (a player, or anything else the host can address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    /// Stable unique identifier (`%player_uuid%`).
    pub id: String,
    /// Lookup name (`%player%`); also the owner key for owner-scoped variables.
    pub name: String,
    /// Display name (`%player_name%`).
    pub display_name: String,
    /// Name of the world the entity is in (`%player_world%`).
    pub world: String,
}

impl Entity {
    /// Entity whose id and display name default to its name.
    pub fn named(name: impl Into<String>, world: impl Into<String>) -> Self {
        let name = name.into();
        Entity {
            id: name.clone(),
            display_name: name.clone(),
            name,
            world: world.into(),
        }
    }
}

// ── Item / location descriptors ───────────────────────────────────────────────

/// A resolved item descriptor plus the amount to hand over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    pub material: String,
    pub amount: u32,
}

/// A resolved location descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    /// Parse `"x, y, z"` or `"x y z"` (optionally followed by a world name)
    /// relative to `default_world`.  Hosts may use this as their descriptor
    /// resolver or layer named locations on top of it.
    pub fn parse_coordinates(text: &str, default_world: &str) -> Option<Location> {
        let parts: Vec<&str> = text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();
        if parts.len() < 3 || parts.len() > 4 {
            return None;
        }
        let x = parts[0].parse().ok()?;
        let y = parts[1].parse().ok()?;
        let z = parts[2].parse().ok()?;
        let world = parts.get(3).map_or(default_world, |w| w).to_owned();
        Some(Location { world, x, y, z })
    }
}

// ── Animation ─────────────────────────────────────────────────────────────────

/// The animation effects `animate_<kind>(…)` can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Animation {
    ParticleCircle,
    ParticleExplosion,
    Move,
}

impl Animation {
    pub const ALL: &'static [Animation] = &[
        Animation::ParticleCircle,
        Animation::ParticleExplosion,
        Animation::Move,
    ];

    /// The name used after `animate_` in scripts.
    pub fn name(self) -> &'static str {
        match self {
            Animation::ParticleCircle => "particle_circle",
            Animation::ParticleExplosion => "particle_explosion",
            Animation::Move => "move",
        }
    }
}

impl fmt::Display for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Animation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        let lower = s.trim().to_ascii_lowercase();
        Animation::ALL
            .iter()
            .copied()
            .find(|a| a.name() == lower)
            .ok_or_else(|| format!("unknown animation type: {s}"))
    }
}

// ── Host port ─────────────────────────────────────────────────────────────────

/// Abstract host services.
///
/// Implementations are called only from the authoritative thread (see
/// [`crate::dispatch::MainThread`]), but must still be `Send + Sync` so the
/// engine can hand them to whichever thread that is.
pub trait Host: Send + Sync {
    /// Look up a connected entity by name.
    fn find_entity(&self, name: &str) -> Option<Entity>;

    /// Every currently connected entity, in host order.
    fn online_entities(&self) -> Vec<Entity>;

    fn send_message(&self, target: &Entity, text: &str);

    fn broadcast(&self, text: &str);

    /// Resolve an item descriptor (e.g. `diamond_sword`).  `amount` is
    /// already parsed; `None` means the descriptor is not a known item.
    fn resolve_item(&self, descriptor: &str, amount: u32) -> Option<ItemStack>;

    /// Resolve a location descriptor relative to the acting entity.
    fn resolve_location(&self, descriptor: &str, actor: Option<&Entity>) -> Option<Location>;

    fn teleport(&self, target: &Entity, to: &Location);

    fn give_item(&self, target: &Entity, item: &ItemStack);

    fn play_animation(&self, animation: Animation, params: &[String], actor: Option<&Entity>);

    fn has_permission(&self, entity: &Entity, permission: &str) -> bool;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_coordinates_comma_and_space() {
        let loc = Location::parse_coordinates("1, 64.5, -3", "world").unwrap();
        assert_eq!(loc, Location { world: "world".into(), x: 1.0, y: 64.5, z: -3.0 });
        let loc = Location::parse_coordinates("0 70 0 nether", "world").unwrap();
        assert_eq!(loc.world, "nether");
    }

    #[test]
    fn parse_coordinates_rejects_garbage() {
        assert!(Location::parse_coordinates("spawn", "world").is_none());
        assert!(Location::parse_coordinates("1, two, 3", "world").is_none());
    }

    #[test]
    fn animation_round_trip() {
        for &a in Animation::ALL {
            assert_eq!(a.name().parse::<Animation>().unwrap(), a);
        }
        assert!("spin".parse::<Animation>().is_err());
    }

    #[test]
    fn named_entity_defaults() {
        let e = Entity::named("Steve", "world");
        assert_eq!(e.id, "Steve");
        assert_eq!(e.display_name, "Steve");
    }
}
