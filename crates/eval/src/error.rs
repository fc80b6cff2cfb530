use std::fmt;

/// Coarse classification of evaluation failures.
///
/// Callers that only need to decide between "retry", "fix the authored
/// graph" and "ask for more facts" match on this instead of the full
/// [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Malformed,
    Cycle,
    NoMatch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Cycle => "cycle",
            ErrorKind::NoMatch => "no_match",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while loading or evaluating a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("graph not found: {graph_id}")]
    GraphNotFound { graph_id: String },

    #[error("decision tree not found: {tree_id}")]
    TreeNotFound { tree_id: i64 },

    #[error("expression not found: {expr_id}")]
    ExpressionNotFound { expr_id: i64 },

    #[error("unknown variable: {key}")]
    UnknownVariable { key: String },

    /// An expression read a fact that was never provided.
    #[error("missing fact: {fact_key}")]
    MissingFact { fact_key: String },

    #[error("unknown fact definition: {fact_key}")]
    UnknownFactDefinition { fact_key: String },

    #[error("unsupported fact type '{fact_type}' for fact '{fact_key}'")]
    UnsupportedFactType { fact_key: String, fact_type: String },

    #[error("invalid value for fact '{fact_key}': expected {expected}, got {got}")]
    InvalidFactValue {
        fact_key: String,
        expected: String,
        got: String,
    },

    #[error("invalid value '{value}' for enum fact '{fact_key}', expected one of {options:?}")]
    InvalidEnumValue {
        fact_key: String,
        value: String,
        options: Vec<String>,
    },

    /// A condition tree node has a shape outside the supported forms.
    #[error("unsupported condition: {node}")]
    UnsupportedCondition { node: String },

    #[error("malformed expression: {message}")]
    MalformedExpression { message: String },

    #[error("malformed config for node {node_id}: {message}")]
    MalformedConfig { node_id: i64, message: String },

    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// A cost breakdown's total drifted from the sum of its components.
    #[error("cost invariant violated: {message}")]
    CostInvariant { message: String },

    #[error("numeric overflow: {message}")]
    Overflow { message: String },

    #[error("expression cycle: {}", path.join(" -> "))]
    ExpressionCycle { path: Vec<String> },

    #[error("no branch of decision tree {tree_id} matched")]
    NoMatchingBranch { tree_id: i64 },

    #[error("no pricing calculated for run {run_id}")]
    NoPricingCalculated { run_id: String },
}

impl EvalError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::GraphNotFound { .. }
            | EvalError::TreeNotFound { .. }
            | EvalError::ExpressionNotFound { .. }
            | EvalError::UnknownVariable { .. }
            | EvalError::MissingFact { .. }
            | EvalError::UnknownFactDefinition { .. } => ErrorKind::NotFound,
            EvalError::UnsupportedFactType { .. }
            | EvalError::InvalidFactValue { .. }
            | EvalError::InvalidEnumValue { .. }
            | EvalError::UnsupportedCondition { .. }
            | EvalError::MalformedExpression { .. }
            | EvalError::MalformedConfig { .. }
            | EvalError::TypeMismatch { .. }
            | EvalError::CostInvariant { .. }
            | EvalError::Overflow { .. } => ErrorKind::Malformed,
            EvalError::ExpressionCycle { .. } => ErrorKind::Cycle,
            EvalError::NoMatchingBranch { .. } | EvalError::NoPricingCalculated { .. } => {
                ErrorKind::NoMatch
            }
        }
    }

    pub(crate) fn type_mismatch(message: impl Into<String>) -> Self {
        EvalError::TypeMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        EvalError::MalformedExpression {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_display_joins_path() {
        let err = EvalError::ExpressionCycle {
            path: vec!["main".into(), "sub".into(), "main".into()],
        };
        assert_eq!(err.to_string(), "expression cycle: main -> sub -> main");
        assert_eq!(err.kind(), ErrorKind::Cycle);
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            EvalError::GraphNotFound {
                graph_id: "g".into()
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EvalError::UnsupportedCondition { node: "{}".into() }.kind(),
            ErrorKind::Malformed
        );
        assert_eq!(
            EvalError::NoMatchingBranch { tree_id: 1 }.kind(),
            ErrorKind::NoMatch
        );
        assert_eq!(
            EvalError::NoPricingCalculated { run_id: "r".into() }.kind(),
            ErrorKind::NoMatch
        );
    }
}
