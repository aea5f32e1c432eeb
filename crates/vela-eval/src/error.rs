//! Error taxonomy: compile-time diagnosis vs execution-time failure.
//!
//! Every failure aborts the whole evaluation immediately; nothing is
//! retried inside the engine.

use thiserror::Error;
use vela_core::Span;
use vela_jdi::{ContextError, ObjectId, TypeTag, Value};

/// Compile-time failure. Always detected before any remote interaction.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("`{name}` cannot be resolved to a variable or field ({span})")]
    UnresolvedName { name: String, span: Span },
    #[error("operator `{op}` is not applicable to `{lhs}` and `{rhs}` ({span})")]
    InapplicableOperator {
        op: &'static str,
        lhs: TypeTag,
        rhs: TypeTag,
        span: Span,
    },
    #[error("operator `{op}` is not applicable to `{operand}` ({span})")]
    InapplicableUnary {
        op: &'static str,
        operand: TypeTag,
        span: Span,
    },
    #[error("operator `{op}` requires a boolean operand, found `{found}` ({span})")]
    NonBooleanOperand {
        op: &'static str,
        found: TypeTag,
        span: Span,
    },
    #[error("no applicable method `{name}({arg_types})` on `{receiver_type}` ({span})")]
    NoApplicableMethod {
        name: String,
        receiver_type: String,
        arg_types: String,
        span: Span,
    },
    #[error("reference to `{name}` is ambiguous ({span})")]
    AmbiguousOverload { name: String, span: Span },
    #[error("no applicable constructor `{type_name}({arg_types})` ({span})")]
    NoApplicableConstructor {
        type_name: String,
        arg_types: String,
        span: Span,
    },
    #[error("cannot assign `{from}` to `{to}` ({span})")]
    TypeMismatch {
        from: String,
        to: String,
        span: Span,
    },
    #[error("invalid assignment target ({span})")]
    InvalidAssignmentTarget { span: Span },
    #[error("cannot cast `{from}` to `{to}` ({span})")]
    InvalidCast {
        from: String,
        to: String,
        span: Span,
    },
    #[error("the type of the expression must be an array type ({span})")]
    NotAnArray { span: Span },
    #[error("cannot use a void value ({span})")]
    VoidValue { span: Span },
    #[error("cannot access instance member `{name}` in a static context ({span})")]
    InstanceMemberInStaticContext { name: String, span: Span },
}

/// Execution-time failure. No instruction after a failed one executes.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeFailure {
    /// The evaluated expression itself threw inside the debuggee; the thrown
    /// value is the evaluation's outcome.
    #[error("debuggee threw {exception}")]
    RemoteException { exception: Value },
    /// The debuggee terminated, disconnected, or the bound thread resumed
    /// out from under the evaluation.
    #[error("debuggee context lost: {0}")]
    ContextLost(String),
    #[error("evaluation timed out")]
    Timeout,
    #[error("evaluation cancelled")]
    Cancelled,
    #[error("/ by zero")]
    DivisionByZero,
    #[error("null pointer access")]
    NullPointer,
    /// A malformed instruction sequence; a compiler defect, not a runtime
    /// condition.
    #[error("internal evaluation defect: {0}")]
    Internal(String),
}

impl From<ContextError> for RuntimeFailure {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Thrown { exception } => RuntimeFailure::RemoteException { exception },
            ContextError::Timeout => RuntimeFailure::Timeout,
            ContextError::ContextLost(reason) => RuntimeFailure::ContextLost(reason),
            ContextError::InvalidObjectId(id) => {
                RuntimeFailure::ContextLost(collected_object(id))
            }
            ContextError::Other(reason) => RuntimeFailure::ContextLost(reason),
        }
    }
}

fn collected_object(id: ObjectId) -> String {
    format!("object {id} has been garbage collected")
}

/// Any way an evaluation can fail.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeFailure),
}
