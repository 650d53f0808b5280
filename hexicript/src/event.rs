//! Trigger event kinds.
//!
//! An `on <declaration>:` handler names the event it listens for in loose
//! natural language (`on player join:`, `on chat:`).  The parser maps each
//! declaration onto a canonical [`EventKind`]; declarations that name none of
//! the built-in events become [`EventKind::Custom`] so that hosts can fire
//! their own events by name.

use std::fmt;
use std::str::FromStr;

// ── EventKind ─────────────────────────────────────────────────────────────────

/// An event a script handler can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    PlayerJoin,
    PlayerLeave,
    PlayerDeath,
    BlockBreak,
    BlockPlace,
    EntityDamage,
    PlayerChat,
    /// Any other declaration, lower-cased and trimmed.
    Custom(String),
}

impl EventKind {
    /// Every built-in event, in declaration-matching order.
    pub const BUILTIN: &'static [EventKind] = &[
        EventKind::PlayerJoin,
        EventKind::PlayerLeave,
        EventKind::PlayerDeath,
        EventKind::BlockBreak,
        EventKind::BlockPlace,
        EventKind::EntityDamage,
        EventKind::PlayerChat,
    ];

    /// The canonical snake_case name (e.g. `"player_join"`).
    pub fn name(&self) -> &str {
        match self {
            EventKind::PlayerJoin => "player_join",
            EventKind::PlayerLeave => "player_leave",
            EventKind::PlayerDeath => "player_death",
            EventKind::BlockBreak => "block_break",
            EventKind::BlockPlace => "block_place",
            EventKind::EntityDamage => "entity_damage",
            EventKind::PlayerChat => "player_chat",
            EventKind::Custom(name) => name,
        }
    }

    /// Declaration prefixes that select this event.
    fn prefixes(&self) -> &'static [&'static str] {
        match self {
            EventKind::PlayerJoin => &["player join"],
            EventKind::PlayerLeave => &["player leave", "player quit"],
            EventKind::PlayerDeath => &["player death"],
            EventKind::BlockBreak => &["block break"],
            EventKind::BlockPlace => &["block place"],
            EventKind::EntityDamage => &["damage"],
            EventKind::PlayerChat => &["chat"],
            EventKind::Custom(_) => &[],
        }
    }

    /// Map the text between `on` and `:` to an event.  Never fails: unknown
    /// declarations become custom events.
    pub fn from_declaration(decl: &str) -> EventKind {
        let lower = decl.trim().to_lowercase();
        EventKind::BUILTIN
            .iter()
            .find(|k| k.prefixes().iter().any(|p| lower.starts_with(p)))
            .cloned()
            .unwrap_or(EventKind::Custom(lower))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Parse a canonical name (`"player_join"`) or a script declaration
    /// (`"player join"`).  Only the empty string is rejected.
    fn from_str(s: &str) -> Result<Self, String> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty event name".to_owned());
        }
        let lower = trimmed.to_ascii_lowercase();
        if let Some(k) = EventKind::BUILTIN.iter().find(|k| k.name() == lower) {
            return Ok(k.clone());
        }
        Ok(EventKind::from_declaration(trimmed))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_map_to_builtins() {
        assert_eq!(EventKind::from_declaration("player join"), EventKind::PlayerJoin);
        assert_eq!(EventKind::from_declaration("Player Quit"), EventKind::PlayerLeave);
        assert_eq!(EventKind::from_declaration("player leave"), EventKind::PlayerLeave);
        assert_eq!(EventKind::from_declaration("damage of zombie"), EventKind::EntityDamage);
        assert_eq!(EventKind::from_declaration("chat"), EventKind::PlayerChat);
    }

    #[test]
    fn unknown_declaration_is_custom() {
        assert_eq!(
            EventKind::from_declaration("  Server Tick "),
            EventKind::Custom("server tick".into())
        );
    }

    #[test]
    fn round_trip_from_str() {
        for k in EventKind::BUILTIN {
            let parsed: EventKind = k.name().parse().unwrap();
            assert_eq!(&parsed, k);
        }
    }

    #[test]
    fn from_str_accepts_declarations() {
        let k: EventKind = "block break".parse().unwrap();
        assert_eq!(k, EventKind::BlockBreak);
        assert!("   ".parse::<EventKind>().is_err());
    }
}
