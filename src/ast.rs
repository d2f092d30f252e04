//! Compiled template tree and expression AST.

use crate::error::Position;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    NotIn,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Attribute(Box<Expr>, String), // foo.bar
    Index(Box<Expr>, Box<Expr>),  // foo[0], foo['bar']
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

/// An expression as written in a directive, with its compiled form.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub source: String,
    pub expr: Expr,
    pub position: Position,
}

/// Loop header: the names bound per item and the expression producing items.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopHead {
    pub targets: Vec<String>,
    pub iterable: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(String),
    Expression(Expression),
    If(IfNode),
    Ifdef(IfdefNode),
    For(ForNode),
}

/// `if`/`elif` block. An `elif` is an `IfNode` sitting alone in the else
/// branch of the previous condition.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Expression,
    pub children: Vec<Node>,
    pub else_branch: ElseBranch,
}

/// `ifdef`/`ifndef` block, testing key presence in the context.
#[derive(Debug, Clone, PartialEq)]
pub struct IfdefNode {
    pub name: String,
    pub negated: bool,
    pub position: Position,
    pub children: Vec<Node>,
    pub else_branch: ElseBranch,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElseBranch {
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub head: LoopHead,
    pub position: Position,
    pub body: Vec<Node>,
}

/// A compiled template. Immutable once parsed; render it any number of times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Template {
    pub(crate) children: Vec<Node>,
}

impl Template {
    /// Top-level nodes in document order.
    pub fn children(&self) -> &[Node] {
        &self.children
    }
}
