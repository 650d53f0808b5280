//! Outcome of executing a statement or block.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::value::Value;

// ── RuntimeFault ──────────────────────────────────────────────────────────────

/// Typed cause of a runtime error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeFault {
    #[error("target not found: {0}")]
    TargetNotFound(String),
    #[error("invalid item: {0}")]
    InvalidItem(String),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("unknown animation type: {0}")]
    UnknownAnimation(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("script execution timed out after {elapsed:?} (limit {limit:?})")]
    Timeout { elapsed: Duration, limit: Duration },
    #[error("authoritative thread did not answer within {0:?}")]
    MainThreadUnavailable(Duration),
    #[error("script is disabled: {0}")]
    ScriptDisabled(String),
}

// ── ExecutionResult ───────────────────────────────────────────────────────────

/// Tagged outcome of a statement, block, or whole invocation.
///
/// Errors and control-flow signals travel upward through the same value:
/// every block decides per variant whether to stop, swallow, or forward.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success { message: Option<String>, payload: Option<Value> },
    /// `line` is the 1-based source line of the statement that failed.
    Error { message: String, fault: Option<RuntimeFault>, line: Option<usize> },
    Return(Option<Value>),
    Break,
    Continue,
    Cancel,
}

impl ExecutionResult {
    pub fn success() -> Self {
        ExecutionResult::Success { message: None, payload: None }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        ExecutionResult::Success { message: Some(message.into()), payload: None }
    }

    pub fn success_value(payload: Option<Value>) -> Self {
        ExecutionResult::Success { message: None, payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ExecutionResult::Error { message: message.into(), fault: None, line: None }
    }

    /// Error whose message is the fault's own description.
    pub fn fault(fault: RuntimeFault) -> Self {
        ExecutionResult::Error { message: fault.to_string(), fault: Some(fault), line: None }
    }

    /// Attach the failing statement's line to an error that has none yet.
    pub fn at_line(self, at: usize) -> Self {
        match self {
            ExecutionResult::Error { message, fault, line: None } => {
                ExecutionResult::Error { message, fault, line: Some(at) }
            }
            other => other,
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ExecutionResult::Error { line, .. } => *line,
            _ => None,
        }
    }

    /// `line N: message` for errors that know their line.
    pub fn describe_error(&self) -> Option<String> {
        match self {
            ExecutionResult::Error { message, line: Some(n), .. } => Some(format!("line {n}: {message}")),
            ExecutionResult::Error { message, line: None, .. } => Some(message.clone()),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ExecutionResult::Error { .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { message, .. } => message.as_deref(),
            ExecutionResult::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ExecutionResult::Success { payload, .. } => payload.as_ref(),
            ExecutionResult::Return(value) => value.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Success { message: Some(m), .. } => write!(f, "success: {m}"),
            ExecutionResult::Success { .. } => f.write_str("success"),
            ExecutionResult::Error { message, .. } => write!(f, "error: {message}"),
            ExecutionResult::Return(Some(v)) => write!(f, "return {v}"),
            ExecutionResult::Return(None) => f.write_str("return"),
            ExecutionResult::Break => f.write_str("break"),
            ExecutionResult::Continue => f.write_str("continue"),
            ExecutionResult::Cancel => f.write_str("cancel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_message_is_description() {
        let r = ExecutionResult::fault(RuntimeFault::TargetNotFound("Alex".into()));
        assert!(r.is_error());
        assert_eq!(r.message(), Some("target not found: Alex"));
    }

    #[test]
    fn payload_of_return_and_success() {
        assert_eq!(ExecutionResult::Return(Some(Value::Int(3))).payload(), Some(&Value::Int(3)));
        assert_eq!(ExecutionResult::success().payload(), None);
        assert!(ExecutionResult::Break.message().is_none());
    }

    #[test]
    fn innermost_line_is_kept() {
        let r = ExecutionResult::error("boom").at_line(7).at_line(2);
        assert_eq!(r.line(), Some(7));
        assert_eq!(r.describe_error().as_deref(), Some("line 7: boom"));
        assert_eq!(ExecutionResult::success().at_line(3).line(), None);
        assert_eq!(ExecutionResult::Cancel.describe_error(), None);
    }

    #[test]
    fn display() {
        assert_eq!(ExecutionResult::success().to_string(), "success");
        assert_eq!(ExecutionResult::error("boom").to_string(), "error: boom");
        assert_eq!(ExecutionResult::Cancel.to_string(), "cancel");
    }
}
