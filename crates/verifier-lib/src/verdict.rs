//! Tagged checker outcomes
//!
//! The checkers are predicates, but a bare `false` hides whether a policy was
//! violated or the strategy was never understood. [`Verdict`] keeps that
//! distinction while [`Verdict::is_pass`] gives back the boolean view.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    /// Binding satisfies the declared policy
    Pass,
    /// Binding breaks the declared policy
    PolicyViolated { detail: String },
    /// Declared strategy is not one the checker knows
    UnsupportedStrategy { strategy: String },
    /// Inputs cannot be evaluated (zero cores, non-finite ratio, ...)
    InvalidInput { detail: String },
}

impl Verdict {
    pub fn violated(detail: impl Into<String>) -> Self {
        Verdict::PolicyViolated {
            detail: detail.into(),
        }
    }

    pub fn invalid(detail: impl Into<String>) -> Self {
        Verdict::InvalidInput {
            detail: detail.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    /// Short label used for metrics and table output
    pub fn outcome(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::PolicyViolated { .. } => "policy_violated",
            Verdict::UnsupportedStrategy { .. } => "unsupported_strategy",
            Verdict::InvalidInput { .. } => "invalid_input",
        }
    }
}

impl From<&Verdict> for bool {
    fn from(verdict: &Verdict) -> Self {
        verdict.is_pass()
    }
}

impl From<Verdict> for bool {
    fn from(verdict: Verdict) -> Self {
        verdict.is_pass()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::PolicyViolated { detail } => write!(f, "policy violated: {}", detail),
            Verdict::UnsupportedStrategy { strategy } => {
                write!(f, "unsupported strategy '{}'", strategy)
            }
            Verdict::InvalidInput { detail } => write!(f, "invalid input: {}", detail),
        }
    }
}
