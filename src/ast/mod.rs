//! Abstract syntax tree for FHIRPath expressions.
//!
//! The AST is a closed variant (`ExprNode`) built by the parser and never
//! mutated afterwards. Nodes carry a source offset for diagnostics. Sharing
//! an `Expression` (see [`crate::Expression`]) across concurrent evaluations
//! is safe because the tree is immutable (spec invariant I5).

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::model::datetime::{PartialDate, PartialDateTime, PartialTime};

/// A literal value as it appears in source, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(PartialDate),
    DateTime(PartialDateTime),
    Time(PartialTime),
    Quantity(Decimal, String),
    /// The `{}` empty-collection literal.
    Empty,
}

/// Binary operator tokens, grouped by the precedence class that parses them.
/// Keeping the concrete token (rather than folding e.g. `+`/`-` into one
/// "additive" variant) lets the evaluator match exhaustively without a
/// secondary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    IntDiv,
    Mod,
    Add,
    Sub,
    Concat, // &
    Union,  // |
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Equiv,    // ~
    NotEquiv, // !~
    In,
    Contains,
    And,
    Xor,
    Or,
    Implies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// One node of the AST. Offsets are byte offsets into the original source.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// Bare identifier in term position, e.g. the `Patient` in `Patient.name`.
    Identifier(String),
    /// `$this`
    This,
    /// `$index`
    Index,
    /// `$total` (only meaningful inside `aggregate`)
    Total,
    /// `%name` or `%'url'`
    ExternalConstant(String),
    Unary(UnaryOp, Arc<ExprNode>),
    Binary(BinaryOp, Arc<ExprNode>, Arc<ExprNode>),
    /// `base.member`
    Path { base: Arc<ExprNode>, member: String },
    /// `base[index]`
    Index_ { base: Arc<ExprNode>, index: Arc<ExprNode> },
    /// `base.fn(args)` or a bare `fn(args)` when base is implicit `$this`.
    Invocation {
        base: Option<Arc<ExprNode>>,
        name: String,
        args: Vec<Arc<ExprNode>>,
    },
    /// `value is Type` / `value as Type`
    TypeOp { is_as: IsAs, value: Arc<ExprNode>, type_name: String },
    /// `(expr)` — kept distinct so diagnostics can point at the parens;
    /// evaluates identically to `expr` (spec P2).
    Paren(Arc<ExprNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsAs {
    Is,
    As,
}

impl ExprNode {
    pub fn new(kind: ExprKind, offset: usize) -> Arc<Self> {
        Arc::new(Self { kind, offset })
    }
}

/// Functions whose arguments are evaluated lazily (per spec §4.7): the
/// registry dispatch passes the unevaluated AST sub-tree instead of a
/// pre-computed `Collection` so the function can iterate with per-element
/// `$this`/`$index`.
pub fn is_lazy_function(name: &str) -> bool {
    matches!(
        name,
        "where" | "select" | "repeat" | "all" | "exists" | "iif" | "aggregate" | "trace"
    )
}
