//! # gv-policy
//!
//! The governance policy language: a deliberately small, non-Turing-complete
//! DSL for statements like "warn when cost spikes" or "block when the budget
//! is exhausted".
//!
//! [`compile`] runs lexer → parser → validator and returns an immutable
//! [`PolicyDefinition`] or every problem it found as [`CompileErrors`].
//! [`evaluate`] maps `(PolicyDefinition, FactSnapshot)` to an
//! [`EvaluationOutcome`] with no side effects.
//!
//! ## Quick Example
//!
//! ```rust
//! use gv_policy::{compile, evaluate, Action, FactSnapshot};
//!
//! let policy = compile(
//!     "policy BudgetEnforcement version 1 scope ORG mode ENFORCE; \
//!      when monthly_spend >= budget_limit then block",
//! )
//! .unwrap();
//! let facts = FactSnapshot::new()
//!     .with("monthly_spend", 1000.0)
//!     .with("budget_limit", 1000.0);
//! assert_eq!(evaluate(&policy, &facts).actions, vec![Action::Block]);
//! ```
//!
//! ## Key invariants
//!
//! - **No execution surface**: loops, calls, side effects and function
//!   definitions are rejected at compile time (DSL-E001..E004).
//! - **Mode ceiling**: a MONITOR policy can never block (DSL-E007).
//! - **Pure evaluation**: identical inputs always give identical outcomes.

pub mod ast;
pub mod canonical;
pub mod definition;
pub mod error;
pub mod evaluator;
pub mod facts;
pub mod lexer;
pub mod parser;
pub mod validator;

pub use definition::{
    Action, Clause, Comparator, Condition, Literal, MetricAlias, Mode, Operand, PolicyDefinition,
    Predicate, Scope,
};
pub use error::{CompileErrors, Diagnostic, ErrorCode, Location, SyntaxError};
pub use evaluator::{
    evaluate, evaluate_with_trace, EvaluationOutcome, EvaluationStep, EvaluationTrace, StepOutcome,
};
pub use facts::{FactSnapshot, FactValue};

/// Compile policy source into a validated definition.
///
/// A syntax error stops compilation immediately and is returned alone.
/// Semantic errors are all collected and returned sorted by position.
pub fn compile(source: &str) -> Result<PolicyDefinition, CompileErrors> {
    let ast = parser::parse(source)?;
    match validator::validate(ast) {
        Ok(policy) => {
            tracing::debug!(
                policy = %policy.name(),
                version = policy.version(),
                clauses = policy.clauses().len(),
                "policy compiled"
            );
            Ok(policy)
        }
        Err(errors) => {
            tracing::debug!(errors = %errors, "policy rejected");
            Err(errors)
        }
    }
}
