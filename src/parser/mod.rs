//! Directive parser: turns the scanner's flat segment stream into a tree.
//!
//! The parser keeps an explicit stack of open frames. Each frame owns the
//! node currently receiving children; when the frame is closed its node is
//! attached to the frame below it, so ownership stays single-rooted.

mod expr_parser;

pub use expr_parser::parse_expression;

use log::{debug, trace};

use crate::ast::{ElseBranch, Expression, ForNode, IfNode, IfdefNode, LoopHead, Node, Template};
use crate::error::{ParseError, Position};
use crate::lexer::{is_ident_char, is_ident_start};
use crate::scanner::{Delimiters, Scanner, Segment};

/// Deepest block nesting accepted. Rendering recurses once per level, and an
/// `elif` counts as a level inside the else branch of the `if` before it.
const MAX_NESTING: usize = 128;

/// A classified directive span.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Directive<'a> {
    Comment,
    If(&'a str),
    Ifdef(&'a str),
    Ifndef(&'a str),
    Elif(&'a str),
    For(&'a str),
    Else,
    EndIf,
    EndFor,
    Expression(&'a str),
}

impl<'a> Directive<'a> {
    /// Classification order matters: `if ` is tested before `ifdef `.
    fn classify(text: &'a str) -> Self {
        if text.starts_with('#') {
            return Directive::Comment;
        }
        if let Some(rest) = text.strip_prefix("if ") {
            return Directive::If(rest.trim());
        }
        if let Some(rest) = text.strip_prefix("ifdef ") {
            return Directive::Ifdef(rest.trim());
        }
        if let Some(rest) = text.strip_prefix("ifndef ") {
            return Directive::Ifndef(rest.trim());
        }
        if let Some(rest) = text.strip_prefix("elif ") {
            return Directive::Elif(rest.trim());
        }
        if let Some(rest) = text.strip_prefix("for ") {
            return Directive::For(rest.trim());
        }
        match text {
            "else" => Directive::Else,
            "endif" => Directive::EndIf,
            "endfor" => Directive::EndFor,
            _ => Directive::Expression(text),
        }
    }
}

/// Which node an open `else` frame belongs to.
#[derive(Debug)]
enum ElseOwner {
    If(IfNode),
    Ifdef(IfdefNode),
}

#[derive(Debug)]
enum Frame {
    Root(Vec<Node>),
    /// `chain` holds the enclosing `if`/`elif` nodes waiting for this one to
    /// close so it can become the sole child of their else branch.
    If { node: IfNode, chain: Vec<IfNode> },
    Ifdef(IfdefNode),
    Else { owner: ElseOwner, chain: Vec<IfNode> },
    For(ForNode),
}

impl Frame {
    fn children_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Frame::Root(children) => children,
            Frame::If { node, .. } => &mut node.children,
            Frame::Ifdef(node) => &mut node.children,
            Frame::Else { owner: ElseOwner::If(node), .. } => &mut node.else_branch.children,
            Frame::Else { owner: ElseOwner::Ifdef(node), .. } => &mut node.else_branch.children,
            Frame::For(node) => &mut node.body,
        }
    }

    fn unclosed_error(&self) -> ParseError {
        let (directive, closer, position) = match self {
            Frame::Root(_) => unreachable!("root frame is never left open"),
            Frame::If { node, chain } => ("if", "endif", if_position(node, chain)),
            Frame::Else {
                owner: ElseOwner::If(node),
                chain,
            } => ("if", "endif", if_position(node, chain)),
            Frame::Ifdef(node) | Frame::Else { owner: ElseOwner::Ifdef(node), .. } => {
                let directive = if node.negated { "ifndef" } else { "ifdef" };
                (directive, "endif", node.position)
            }
            Frame::For(node) => ("for", "endfor", node.position),
        };
        ParseError::Unclosed {
            directive,
            closer,
            position,
        }
    }
}

/// Position of the `if` that opened a chain of `elif`s.
fn if_position(node: &IfNode, chain: &[IfNode]) -> Position {
    chain.first().unwrap_or(node).condition.position
}

/// Folds a closed `if`/`elif` back into the chain of conditions above it.
fn close_if_chain(node: IfNode, chain: Vec<IfNode>) -> Node {
    chain.into_iter().rev().fold(Node::If(node), |inner, mut outer| {
        outer.else_branch.children.push(inner);
        Node::If(outer)
    })
}

/// Compiles template text. Reusable across documents; holds only configuration.
#[derive(Debug, Clone, Default)]
pub struct TemplateParser {
    delimiters: Delimiters,
}

impl TemplateParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiters(mut self, open: impl Into<String>, close: impl Into<String>) -> Self {
        self.delimiters = Delimiters::new(open, close);
        self
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    pub fn parse(&self, text: &str) -> Result<Template, ParseError> {
        if self.delimiters.open.is_empty() || self.delimiters.close.is_empty() {
            return Err(ParseError::EmptyDelimiter);
        }

        let mut state = ParseState {
            stack: vec![Frame::Root(Vec::new())],
        };
        for segment in Scanner::new(text, &self.delimiters) {
            match segment? {
                Segment::Literal(text) => state.append_literal(text),
                Segment::Directive { text, position } => state.append_directive(text, position)?,
            }
        }
        let template = state.finish()?;
        debug!(
            "parsed template: {} top-level nodes",
            template.children.len()
        );
        Ok(template)
    }
}

struct ParseState {
    stack: Vec<Frame>,
}

impl ParseState {
    fn top(&mut self) -> &mut Vec<Node> {
        // The root frame is only removed by `finish`, and a closer that would
        // pop it is rejected first.
        self.stack
            .last_mut()
            .map(Frame::children_mut)
            .unwrap_or_else(|| unreachable!("parser stack is never empty"))
    }

    /// Nesting depth the renderer will see for the open frames.
    fn depth(&self) -> usize {
        self.stack
            .iter()
            .map(|frame| match frame {
                Frame::Root(_) => 0,
                Frame::If { chain, .. } | Frame::Else { chain, .. } => 1 + chain.len(),
                Frame::Ifdef(_) | Frame::For(_) => 1,
            })
            .sum()
    }

    /// Pushes a block frame, refusing to nest past the limit.
    fn open(&mut self, frame: Frame, position: Position) -> Result<(), ParseError> {
        self.stack.push(frame);
        if self.depth() > MAX_NESTING {
            return Err(ParseError::TooDeep {
                limit: MAX_NESTING,
                position,
            });
        }
        Ok(())
    }

    /// Pops the top frame unless it is the root.
    fn pop_open(&mut self) -> Option<Frame> {
        if self.stack.len() > 1 {
            self.stack.pop()
        } else {
            None
        }
    }

    fn append_literal(&mut self, text: &str) {
        let text = text
            .strip_suffix("\r\n")
            .or_else(|| text.strip_suffix('\n'))
            .unwrap_or(text);
        if !text.is_empty() {
            self.top().push(Node::Literal(text.to_string()));
        }
    }

    fn append_directive(&mut self, text: &str, position: Position) -> Result<(), ParseError> {
        let directive = Directive::classify(text);
        trace!("{}: {:?}", position, directive);

        match directive {
            Directive::Comment => {}
            Directive::Expression(source) => {
                let expression = compile(source, position)?;
                self.top().push(Node::Expression(expression));
            }
            Directive::If(condition) => {
                let node = new_if(condition, position)?;
                self.open(
                    Frame::If {
                        node,
                        chain: Vec::new(),
                    },
                    position,
                )?;
            }
            Directive::Ifdef(name) | Directive::Ifndef(name) => {
                let node = IfdefNode {
                    name: name.to_string(),
                    negated: matches!(directive, Directive::Ifndef(_)),
                    position,
                    children: Vec::new(),
                    else_branch: ElseBranch::default(),
                };
                self.open(Frame::Ifdef(node), position)?;
            }
            Directive::For(header) => {
                let node = ForNode {
                    head: parse_loop_head(header, position)?,
                    position,
                    body: Vec::new(),
                };
                self.open(Frame::For(node), position)?;
            }
            Directive::Elif(condition) => match self.pop_open() {
                Some(Frame::If { node, mut chain }) => {
                    chain.push(node);
                    let node = new_if(condition, position)?;
                    self.open(Frame::If { node, chain }, position)?;
                }
                _ => {
                    return Err(ParseError::Unmatched {
                        directive: "elif",
                        expected: "'if'",
                        position,
                    })
                }
            },
            Directive::Else => match self.pop_open() {
                Some(Frame::If { node, chain }) => self.stack.push(Frame::Else {
                    owner: ElseOwner::If(node),
                    chain,
                }),
                Some(Frame::Ifdef(node)) => self.stack.push(Frame::Else {
                    owner: ElseOwner::Ifdef(node),
                    chain: Vec::new(),
                }),
                _ => {
                    return Err(ParseError::Unmatched {
                        directive: "else",
                        expected: "'if' or 'ifdef'",
                        position,
                    })
                }
            },
            Directive::EndIf => {
                let node = match self.pop_open() {
                    Some(Frame::If { node, chain }) => close_if_chain(node, chain),
                    Some(Frame::Else {
                        owner: ElseOwner::If(node),
                        chain,
                    }) => close_if_chain(node, chain),
                    Some(Frame::Ifdef(node))
                    | Some(Frame::Else {
                        owner: ElseOwner::Ifdef(node),
                        ..
                    }) => Node::Ifdef(node),
                    _ => {
                        return Err(ParseError::Unmatched {
                            directive: "endif",
                            expected: "'if' or 'ifdef'",
                            position,
                        })
                    }
                };
                self.top().push(node);
            }
            Directive::EndFor => match self.pop_open() {
                Some(Frame::For(node)) => self.top().push(Node::For(node)),
                _ => {
                    return Err(ParseError::Unmatched {
                        directive: "endfor",
                        expected: "'for'",
                        position,
                    })
                }
            },
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Template, ParseError> {
        match self.stack.pop() {
            Some(Frame::Root(children)) => Ok(Template { children }),
            Some(open) => Err(open.unclosed_error()),
            None => unreachable!("parser stack is never empty"),
        }
    }
}

fn compile(source: &str, position: Position) -> Result<Expression, ParseError> {
    let expr = parse_expression(source).map_err(|message| ParseError::InvalidExpression {
        expression: source.to_string(),
        message,
        position,
    })?;
    Ok(Expression {
        source: source.to_string(),
        expr,
        position,
    })
}

fn new_if(condition: &str, position: Position) -> Result<IfNode, ParseError> {
    Ok(IfNode {
        condition: compile(condition, position)?,
        children: Vec::new(),
        else_branch: ElseBranch::default(),
    })
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(is_ident_start) && chars.all(is_ident_char)
}

/// Parses `<names> in <expr>`; names may be bare or parenthesized.
fn parse_loop_head(header: &str, position: Position) -> Result<LoopHead, ParseError> {
    let invalid = |message: String| ParseError::InvalidFor { message, position };

    let Some((names, iterable)) = header.split_once(" in ") else {
        return Err(invalid(format!("expected '<names> in <expr>', got '{}'", header)));
    };

    let names = names.trim();
    let names = match names.strip_prefix('(') {
        Some(inner) => inner
            .strip_suffix(')')
            .ok_or_else(|| invalid(format!("unbalanced parentheses in '{}'", names)))?,
        None => names,
    };

    let targets: Vec<String> = names.split(',').map(|n| n.trim().to_string()).collect();
    if let Some(bad) = targets.iter().find(|n| !is_identifier(n)) {
        return Err(invalid(format!("'{}' is not a valid loop variable", bad)));
    }

    Ok(LoopHead {
        targets,
        iterable: compile(iterable.trim(), position)?,
    })
}
