//! Evaluation error taxonomy (spec §7).

use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("wrong number of arguments to '{function}': expected {expected}, got {actual}")]
    ArityMismatch { function: String, expected: String, actual: usize },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("expected a singleton collection but got {0} elements")]
    SingletonExpected(usize),
    #[error("division by zero")]
    DivisionByZero,
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("quantity unit mismatch: '{0}' vs '{1}'")]
    UnitMismatch(String, String),
    #[error("unsafe regular expression: {0}")]
    RegexUnsafe(String),
    #[error("operation timed out")]
    Timeout,
    #[error("evaluation cancelled")]
    Cancelled,
    #[error("maximum AST-walk depth exceeded")]
    DepthExceeded,
    #[error("intermediate collection exceeded the configured size limit")]
    CollectionTooLarge,
    #[error("external call failed: {0}")]
    External(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// An error together with the source offset and operator/function name under
/// evaluation, per spec §7's propagation policy.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}{}", site.as_ref().map(|s| format!(" (in {s})")).unwrap_or_default())]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub offset: Option<usize>,
    pub site: Option<String>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind) -> Self {
        Self { kind, offset: None, site: None }
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn in_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }
}

impl From<EvalErrorKind> for EvalError {
    fn from(kind: EvalErrorKind) -> Self {
        EvalError::new(kind)
    }
}
