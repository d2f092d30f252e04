//! tinplate: a small bracket-directive template engine.
//!
//! Template text is compiled once into an immutable [`Template`] tree, which
//! can then be rendered any number of times against a fresh [`Context`].
//! Literal text passes through unchanged; directives between `{{` and `}}`
//! (configurable) control what is emitted.
//!
//! Supported directives:
//! - `{{ expr }}` prints the value of an expression.
//! - `{{# comment }}` emits nothing.
//! - `{{if expr}}` / `{{elif expr}}` / `{{else}}` / `{{endif}}`.
//! - `{{ifdef name}}` / `{{ifndef name}}` test whether `name` is bound in the
//!   context, regardless of its value; both accept `{{else}}`.
//! - `{{for name in expr}}` / `{{for (a, b) in expr}}` / `{{endfor}}`.
//!
//! Expressions are a closed grammar: variables, string/number/boolean
//! literals, lists and tuples, `+ - * / %`, comparisons, `and`/`or`/`not`,
//! `in`/`not in`, `.key` and `[index]`. There are no function calls.
//!
//! Newline semantics:
//! - Each literal run loses at most one trailing line terminator (`\n` or
//!   `\r\n`), so a directive on its own line does not leave a blank line.
//! - Nothing else is trimmed and no newlines are injected.
//!
//! ```
//! use tinplate::Context;
//!
//! let template = tinplate::parse("{{for (t, c) in items}} {{t}}:{{c}}{{endfor}}").unwrap();
//! let ctx = Context::new().with("items", vec![("a", 1), ("b", 2)]);
//! assert_eq!(template.render(&ctx).unwrap(), " a:1 b:2");
//! ```

mod ast;
mod error;
mod eval;
mod lexer;
mod parser;
mod render;
mod scanner;
mod value;

pub use ast::{
    BinOp, ElseBranch, Expr, Expression, ForNode, IfNode, IfdefNode, LoopHead, Node, Template,
    UnaryOp,
};
pub use error::{Error, EvalError, ParseError, Position, RenderError, Result};
pub use eval::{evaluate, iterate, Bindings, EvalContext};
pub use parser::{parse_expression, TemplateParser};
pub use scanner::Delimiters;
pub use value::{Context, Value};

/// Compiles `text` with the default `{{`/`}}` delimiters.
pub fn parse(text: &str) -> std::result::Result<Template, ParseError> {
    TemplateParser::new().parse(text)
}

/// Compiles `text` with custom delimiters.
pub fn parse_with_delimiters(
    text: &str,
    open: &str,
    close: &str,
) -> std::result::Result<Template, ParseError> {
    TemplateParser::new().with_delimiters(open, close).parse(text)
}

/// Parses and renders in one step, for templates used only once.
pub fn render(text: &str, context: &Context) -> Result<String> {
    Ok(parse(text)?.render(context)?)
}
