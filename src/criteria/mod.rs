//! Availability Evaluator
//!
//! Decides whether a registered operation applies to a specific resource by
//! evaluating the spec's target criteria against that resource.
//!
//! # Criteria language
//!
//! A small expression language over a single variable, `resource`, bound to a
//! JSON snapshot of the resource state:
//!
//! ```text
//! resource.hostName.startsWith('test') && resource.cpuCount == 4
//! resource.customProperties.p1 == 'v1'
//! !(resource.tags.includes('frozen')) || resource.powerState != 'ON'
//! ```
//!
//! Literals, dotted and indexed access, `== != === !== < <= > >=`,
//! `&& || !`, and a fixed set of helper methods (see [`parser::METHODS`]).
//! Anything else is rejected at parse time.
//!
//! Assignments parse, and write into the interpreter's own copy of the
//! snapshot. The caller's resource state is only ever borrowed immutably to
//! build that copy.
//!
//! # Policy
//!
//! - no criteria, or blank criteria: available
//! - the exact literals `true` / `false`: that value, resource ignored
//! - anything else: parsed and evaluated; malformed criteria are an
//!   [`EvaluationError`], never silently available or unavailable

mod eval;
mod lexer;
pub mod parser;

pub use eval::truthy;
pub use parser::{BinOp, Expr};

use serde_json::Value;

use crate::error::{Error, EvaluationError, Result};
use crate::resource::ResourceState;
use crate::spec::ResourceOperationSpec;

/// Name of the only variable a criteria may reference
pub const RESOURCE_VAR: &str = "resource";

/// Longest criteria string accepted
pub const MAX_CRITERIA_LEN: usize = 4096;

/// Deepest expression nesting accepted
pub const MAX_DEPTH: usize = 64;

/// Work one evaluation may do, counted in steps plus JSON nodes copied
pub const MAX_EVAL_COST: usize = 1 << 18;

/// A parsed criteria, reusable across resources
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    source: String,
    expr: Expr,
}

impl Criteria {
    pub fn parse(source: &str) -> std::result::Result<Self, EvaluationError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluate against an owned snapshot. Non-boolean results are judged by
    /// truthiness.
    pub fn evaluate(&self, snapshot: Value) -> std::result::Result<bool, EvaluationError> {
        let mut interpreter = eval::Interpreter::new(snapshot);
        let result = interpreter.eval(&self.expr)?;
        Ok(truthy(&result))
    }

    /// Evaluate against a copy of `state`
    pub fn evaluate_state(&self, state: &ResourceState) -> std::result::Result<bool, EvaluationError> {
        self.evaluate(state.snapshot())
    }
}

/// Literal criteria that bypass the parser
fn literal(criteria: &str) -> Option<bool> {
    match criteria.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Whether `spec` applies to `state`
///
/// A missing spec is an [`Error::InvalidArgument`]. A missing state is only
/// an error when the criteria actually has to look at it.
pub fn is_available(
    state: Option<&ResourceState>,
    spec: Option<&ResourceOperationSpec>,
) -> Result<bool> {
    let Some(spec) = spec else {
        return Err(Error::invalid_argument("spec is required"));
    };

    let available = criteria_holds(spec.target_criteria.as_deref(), state)?;
    if spec.has_criteria() {
        tracing::debug!(
            "criteria for {} on {}: {} -> {}",
            spec.operation,
            state.map(|s| s.self_link.as_str()).unwrap_or("<none>"),
            spec.target_criteria.as_deref().unwrap_or_default(),
            available
        );
    }
    Ok(available)
}

/// Apply the availability policy to a bare criteria string
pub fn criteria_holds(criteria: Option<&str>, state: Option<&ResourceState>) -> Result<bool> {
    let criteria = match criteria.map(str::trim) {
        None | Some("") => return Ok(true),
        Some(criteria) => criteria,
    };

    if let Some(value) = literal(criteria) {
        return Ok(value);
    }

    let Some(state) = state else {
        return Err(Error::invalid_argument(format!(
            "resource state is required to evaluate '{}'",
            criteria
        )));
    };

    Ok(Criteria::parse(criteria)?.evaluate_state(state)?)
}
