//! Error types for parsing and rendering templates.

use std::fmt;

use thiserror::Error;

/// Location of a directive in the template source.
///
/// `line` is 1-based, `column` is 0-based and counts characters from the
/// start of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while compiling template text into a [`Template`](crate::Template).
///
/// Parsing stops at the first error; no partial tree is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A closing or continuation directive with no compatible open block.
    #[error("{position}: no matching {expected} for '{directive}' directive")]
    Unmatched {
        directive: &'static str,
        expected: &'static str,
        position: Position,
    },

    /// A block still open when the document ended.
    #[error("{position}: '{directive}' directive not closed by an '{closer}'")]
    Unclosed {
        directive: &'static str,
        closer: &'static str,
        position: Position,
    },

    /// An opening delimiter with no closing delimiter after it.
    #[error("{position}: directive is missing its closing '{delimiter}'")]
    UnterminatedDirective { delimiter: String, position: Position },

    /// Expression text that does not belong to the expression grammar.
    #[error("{position}: invalid expression `{expression}`: {message}")]
    InvalidExpression {
        expression: String,
        message: String,
        position: Position,
    },

    /// A `for` header that is not `<names> in <expr>`.
    #[error("{position}: malformed 'for' directive: {message}")]
    InvalidFor { message: String, position: Position },

    /// Blocks nested deeper than the renderer is allowed to recurse.
    #[error("{position}: blocks nested more than {limit} levels deep")]
    TooDeep { limit: usize, position: Position },

    #[error("template delimiters must not be empty")]
    EmptyDelimiter,
}

/// Failures while evaluating an expression against a context.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("variable '{name}' is not defined")]
    UndefinedVariable { name: String },

    #[error("unsupported operand types for '{op}': {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("bad operand type for '{op}': {operand}")]
    BadOperand {
        op: &'static str,
        operand: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow in '{op}'")]
    Overflow { op: &'static str },

    #[error("result of '{op}' would exceed {limit} bytes")]
    TooLarge { op: &'static str, limit: usize },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("key '{key}' not found")]
    KeyNotFound { key: String },

    #[error("{ty} has no attribute '{attr}'")]
    NoAttribute { ty: &'static str, attr: String },

    #[error("{ty} is not iterable")]
    NotIterable { ty: &'static str },

    #[error("cannot unpack {ty} into {expected} loop variables")]
    CannotUnpack { ty: &'static str, expected: usize },

    #[error("expected {expected} values to unpack, got {actual}")]
    UnpackArity { expected: usize, actual: usize },
}

/// Errors raised while rendering a compiled template.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// An expression failed; carries the position recorded at parse time.
    #[error("{position}: failed to evaluate `{expression}`: {source}")]
    Eval {
        expression: String,
        position: Position,
        #[source]
        source: EvalError,
    },

    /// The output sink refused a write.
    #[error("failed to write rendered output")]
    Write(#[from] fmt::Error),
}

impl RenderError {
    /// Position of the failing directive, if the error came from one.
    pub fn position(&self) -> Option<Position> {
        match self {
            RenderError::Eval { position, .. } => Some(*position),
            RenderError::Write(_) => None,
        }
    }
}

impl ParseError {
    /// Position of the offending directive, if the error has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            ParseError::Unmatched { position, .. }
            | ParseError::Unclosed { position, .. }
            | ParseError::UnterminatedDirective { position, .. }
            | ParseError::InvalidExpression { position, .. }
            | ParseError::InvalidFor { position, .. }
            | ParseError::TooDeep { position, .. } => Some(*position),
            ParseError::EmptyDelimiter => None,
        }
    }
}

/// Unified error for the one-shot [`render`](crate::render) helper.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_displays_line_and_column() {
        assert_eq!(Position::new(3, 12).to_string(), "3:12");
    }

    #[test]
    fn render_error_names_expression_and_cause() {
        let err = RenderError::Eval {
            expression: "a / b".to_string(),
            position: Position::new(2, 4),
            source: EvalError::DivisionByZero,
        };
        assert_eq!(
            err.to_string(),
            "2:4: failed to evaluate `a / b`: division by zero"
        );
        assert_eq!(err.position(), Some(Position::new(2, 4)));
    }

    #[test]
    fn unified_error_wraps_parse_errors() {
        let err: Error = ParseError::EmptyDelimiter.into();
        assert!(matches!(err, Error::Parse(ParseError::EmptyDelimiter)));
        assert_eq!(ParseError::EmptyDelimiter.position(), None);
    }
}
