//! hexicript: an indentation-structured event scripting engine.
//!
//! A host (a game server, a simulation) embeds a [`ScriptEngine`], loads
//! script files into it and feeds it events and commands.  Everything the
//! scripts do to the world goes back out through the [`Host`] port, on the
//! host's authoritative thread.
//!
//! ```text
//! # @author Steve
//! on player join:
//!     set {joins::%player%} to 1
//!     if player has permission "vip.greet":
//!         broadcast "Welcome back, %player%!"
//!     else:
//!         send "Hello!" to player
//! ```

pub mod cli;
pub mod config;
pub mod console;
pub mod dispatch;
pub mod engine;
pub mod event;
pub mod host;
pub mod registry;
pub mod scheduler;
pub mod script;

pub use config::{ConfigError, EngineConfig};
pub use dispatch::{HostBridge, ImmediateMainThread, MainThread, MainThreadQueue};
pub use engine::{EngineError, EngineStats, EventReport, ScriptEngine};
pub use event::EventKind;
pub use host::{Animation, Entity, Host, ItemStack, Location};
pub use script::{ExecutionContext, ExecutionResult, RuntimeFault, Script, ScriptError, Value};
