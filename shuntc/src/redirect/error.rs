///
/// Redirect Error Types
///
/// Every error here is fatal for the routine being transformed: it is a
/// static authoring mistake (bad handler signature, impossible target,
/// broken finality) rather than something a retry could fix. Non-fatal
/// conflicts are reported through the diagnostic sink instead.
///

use std::fmt;

use thiserror::Error;

use crate::nodes::{NodeError, NodeId};
use crate::routine::RoutineError;
use crate::types::Signature;

/// What the handler stands in for, used to phrase signature errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerRole {
    Invoke,
    Getter,
    Setter,
}

impl fmt::Display for HandlerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerRole::Invoke => write!(f, "handler method"),
            HandlerRole::Getter => write!(f, "field getter"),
            HandlerRole::Setter => write!(f, "field setter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RedirectError {
    #[error(
        "redirect conflict: {engine} (priority {priority}) failed because target was already \
         remapped by final redirect {holder} (priority {holder_priority})"
    )]
    FinalityViolation {
        engine: String,
        priority: i32,
        holder: String,
        holder_priority: i32,
    },

    #[error("{role} {engine} has an invalid signature, expected {expected} or {extended} but found {found}")]
    SignatureMismatch {
        engine: String,
        role: HandlerRole,
        expected: Signature,
        extended: Signature,
        found: Signature,
    },

    #[error("{engine} is targeting unsupported instruction '{insn}' in {routine}")]
    UnsupportedTarget {
        engine: String,
        insn: String,
        routine: String,
    },

    #[error("redirect target of {engine} was already replaced ({node})")]
    AlreadyReplaced { engine: String, node: NodeId },

    #[error("instance handler {engine} cannot be called from static routine {routine}")]
    InstanceHandlerInStaticRoutine { engine: String, routine: String },

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Routine(#[from] RoutineError),
}

impl RedirectError {
    /// Name of the redirect that raised the error, when one is known.
    pub fn engine(&self) -> Option<&str> {
        match self {
            RedirectError::FinalityViolation { engine, .. }
            | RedirectError::SignatureMismatch { engine, .. }
            | RedirectError::UnsupportedTarget { engine, .. }
            | RedirectError::AlreadyReplaced { engine, .. }
            | RedirectError::InstanceHandlerInStaticRoutine { engine, .. } => Some(engine),
            RedirectError::Node(_) | RedirectError::Routine(_) => None,
        }
    }
}

pub type RedirectResult<T> = Result<T, RedirectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = RedirectError::FinalityViolation {
            engine: "D".to_string(),
            priority: 100,
            holder: "C".to_string(),
            holder_priority: 1,
        };
        assert!(err.to_string().contains("already remapped by final redirect C"));
        assert_eq!(err.engine(), Some("D"));

        let err = RedirectError::SignatureMismatch {
            engine: "onBar".to_string(),
            role: HandlerRole::Getter,
            expected: Signature::parse("(Lfoo/O;)I").unwrap(),
            extended: Signature::parse("(Lfoo/O;J)I").unwrap(),
            found: Signature::parse("()I").unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("field getter onBar"));
        assert!(msg.contains("expected (Lfoo/O;)I or (Lfoo/O;J)I but found ()I"));

        let err = RedirectError::Routine(RoutineError::MissingInsn(crate::insn::InsnId(3)));
        assert_eq!(err.to_string(), "instruction #3 is not part of the routine");
        assert_eq!(err.engine(), None);
    }
}
