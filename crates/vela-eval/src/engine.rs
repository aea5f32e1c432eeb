//! Evaluation orchestration: compile, run, report exactly once.

use std::time::{Duration, Instant};

use tracing::{debug, debug_span};

use vela_core::CancelToken;
use vela_jdi::{RuntimeContext, Value};

use crate::ast::{BindingEnv, Expr};
use crate::compiler;
use crate::error::EvalError;
use crate::interpreter;

/// Options for evaluations run by an engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalOptions {
    /// Wall-clock bound for a whole evaluation, checked cooperatively at
    /// instruction boundaries. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

/// Completion callback, called exactly once per evaluation on every exit
/// path: success, compile error, runtime failure, or cancellation.
pub trait EvaluationListener {
    fn evaluation_complete(&mut self, result: EvaluationResult);
}

impl<F: FnMut(EvaluationResult)> EvaluationListener for F {
    fn evaluation_complete(&mut self, result: EvaluationResult) {
        self(result)
    }
}

/// Outcome of one evaluation: a value, or a diagnosed failure.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationResult {
    pub value: Option<Value>,
    pub error: Option<EvalError>,
}

impl EvaluationResult {
    fn success(value: Value) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    fn failure(error: EvalError) -> Self {
        Self {
            value: None,
            error: Some(error),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Drives evaluations against one runtime context.
///
/// The engine owns the context and evaluates through `&mut self`, so a
/// second evaluation against the same suspended frame cannot start while
/// one is in flight — the context is not reentrant.
pub struct EvaluationEngine<C> {
    context: C,
    options: EvalOptions,
    cancel: CancelToken,
}

impl<C: RuntimeContext> EvaluationEngine<C> {
    pub fn new(context: C) -> Self {
        Self::with_options(context, EvalOptions::default())
    }

    pub fn with_options(context: C, options: EvalOptions) -> Self {
        Self {
            context,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Mutable access to the underlying context. Primarily useful in tests
    /// with [`vela_jdi::MockRuntimeContext`].
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn into_context(self) -> C {
        self.context
    }

    /// Token cancelling evaluations run by this engine. A fired token stops
    /// the in-flight evaluation at the next instruction boundary and fails
    /// later ones until [`clear_cancellation`](Self::clear_cancellation).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn clear_cancellation(&mut self) {
        self.cancel.clear();
    }

    /// Evaluate and report the outcome to `listener`, exactly once.
    pub fn evaluate(
        &mut self,
        expr: &Expr,
        env: &BindingEnv,
        listener: &mut dyn EvaluationListener,
    ) {
        let result = self.evaluate_sync(expr, env);
        listener.evaluation_complete(result);
    }

    /// Evaluate and return the outcome directly.
    pub fn evaluate_sync(&mut self, expr: &Expr, env: &BindingEnv) -> EvaluationResult {
        let span = debug_span!("evaluate");
        let _guard = span.enter();

        let sequence = match compiler::compile(expr, env) {
            Ok(sequence) => sequence,
            Err(err) => {
                debug!(error = %err, "compilation failed");
                return EvaluationResult::failure(EvalError::Compile(err));
            }
        };

        let deadline = self
            .options
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        match interpreter::run(&sequence, &mut self.context, &self.cancel, deadline) {
            Ok(value) => {
                debug!(%value, "evaluation complete");
                EvaluationResult::success(value)
            }
            Err(err) => {
                debug!(error = %err, "evaluation failed");
                EvaluationResult::failure(EvalError::Runtime(err))
            }
        }
    }
}
