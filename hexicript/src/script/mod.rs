//! The hexicript language.
//!
//! - [`parse`] turns indented source text into a [`stmt::Statement`] forest
//! - [`interp`] walks that forest and yields an [`ExecutionResult`]
//! - [`vars`] resolves `{…}` references into one of four namespaces
//! - [`program`] wraps a parsed forest as a [`Script`] with metadata and statistics
//!
//! # Quick start
//!
//! ```rust
//! use hexicript::script::{Parser, Script};
//!
//! let parser = Parser::new().unwrap();
//! let script = Script::parse("hello", "on player join:\n    send \"hi\" to player", &parser);
//! assert_eq!(script.statement_count(), 2);
//! assert!(script.events().contains("player_join"));
//! ```

pub mod context;
pub mod expand;
pub mod expr;
pub mod interp;
pub mod parse;
pub mod program;
pub mod result;
pub mod stmt;
pub mod value;
pub mod vars;

// Re-exports for convenience.
pub use context::{ExecutionContext, TriggerEvent};
pub use interp::{Executor, Invocation, Limits};
pub use parse::{ParseIssue, ParseOutput, Parser};
pub use program::{Metadata, Script, ScriptError, ScriptStats};
pub use result::{ExecutionResult, RuntimeFault};
pub use stmt::{LoopSource, Statement, StatementKind};
pub use value::Value;
pub use vars::{Namespace, VariableStats, VariableStore};
