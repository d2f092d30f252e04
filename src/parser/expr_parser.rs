//! Recursive-descent parser for directive expressions.
//!
//! Precedence, lowest first: `or`, `and`, `not`, comparisons and `in`,
//! `+ -`, `* / %`, unary `-`, postfix `.name` / `[index]`.

use std::collections::VecDeque;

use crate::ast::{BinOp, Expr, UnaryOp};
use crate::lexer::{Token, Tokenizer};
use crate::value::Value;

/// Deepest expression tree the parser will build. Evaluation recurses once
/// per level, so this bounds the stack used at render time too.
const MAX_DEPTH: usize = 128;

/// Parses a complete expression; trailing tokens are an error.
pub fn parse_expression(input: &str) -> Result<Expr, String> {
    let mut parser = ExprParser::new(input);
    if parser.peek(0)?.is_none() {
        return Err("empty expression".to_string());
    }
    let expr = parser.parse_expr()?;
    match parser.consume()? {
        None => Ok(expr),
        Some(t) => Err(format!("unexpected {:?} after expression", t)),
    }
}

struct ExprParser<'a> {
    lexer: Tokenizer<'a>,
    buffer: VecDeque<Token>,
    depth: usize,
}

impl<'a> ExprParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Tokenizer::new(input),
            buffer: VecDeque::new(),
            depth: 0,
        }
    }

    /// Enters one more level of nesting. Callers reset `depth` on the way out.
    fn descend(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(format!("expression nested more than {} levels deep", MAX_DEPTH));
        }
        Ok(())
    }

    fn peek(&mut self, n: usize) -> Result<Option<&Token>, String> {
        while self.buffer.len() <= n {
            match self.lexer.next_token()? {
                Some(token) => self.buffer.push_back(token),
                None => return Ok(None),
            }
        }
        Ok(self.buffer.get(n))
    }

    fn consume(&mut self) -> Result<Option<Token>, String> {
        match self.buffer.pop_front() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn next_is(&mut self, token: &Token) -> Result<bool, String> {
        Ok(self.peek(0)? == Some(token))
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        match self.consume()? {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(format!("expected {:?}, got {:?}", token, t)),
            None => Err(format!("expected {:?}, got end of expression", token)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        self.descend()?;
        let expr = self.parse_or()?;
        self.depth = depth;
        Ok(expr)
    }

    // Each operator in a left-associative chain deepens the tree by one.

    fn parse_or(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut lhs = self.parse_and()?;
        while self.next_is(&Token::Or)? {
            self.consume()?;
            self.descend()?;
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut lhs = self.parse_not()?;
        while self.next_is(&Token::And)? {
            self.consume()?;
            self.descend()?;
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.next_is(&Token::Not)? {
            self.consume()?;
            let depth = self.depth;
            self.descend()?;
            let inner = self.parse_not()?;
            self.depth = depth;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn comparison_op(&mut self) -> Result<Option<BinOp>, String> {
        let op = match self.peek(0)? {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::NotEq,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::LtEq) => BinOp::LtEq,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::GtEq) => BinOp::GtEq,
            Some(Token::In) => BinOp::In,
            Some(Token::Not) => {
                if self.peek(1)? != Some(&Token::In) {
                    return Ok(None);
                }
                self.consume()?;
                BinOp::NotIn
            }
            _ => return Ok(None),
        };
        self.consume()?;
        Ok(Some(op))
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut lhs = self.parse_additive()?;
        while let Some(op) = self.comparison_op()? {
            self.descend()?;
            let rhs = self.parse_additive()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek(0)? {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.consume()?;
            self.descend()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek(0)? {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => break,
            };
            self.consume()?;
            self.descend()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if self.next_is(&Token::Minus)? {
            self.consume()?;
            let depth = self.depth;
            self.descend()?;
            let inner = self.parse_unary()?;
            self.depth = depth;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.parse_postfix()
    }

    /// Comma-separated expressions up to `close`; returns the items and
    /// whether a trailing comma was present.
    fn parse_sequence(&mut self, close: Token) -> Result<(Vec<Expr>, bool), String> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while !self.next_is(&close)? {
            items.push(self.parse_expr()?);
            trailing_comma = false;
            if self.next_is(&Token::Comma)? {
                self.consume()?;
                trailing_comma = true;
            } else {
                break;
            }
        }
        self.expect(close)?;
        Ok((items, trailing_comma))
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let expr = match self.consume()? {
            Some(Token::StringLit(s)) => Expr::Literal(Value::Str(s)),
            Some(Token::Int(n)) => Expr::Literal(Value::Int(n)),
            Some(Token::Float(x)) => Expr::Literal(Value::Float(x)),
            Some(Token::True) => Expr::Literal(Value::Bool(true)),
            Some(Token::False) => Expr::Literal(Value::Bool(false)),
            Some(Token::Null) => Expr::Literal(Value::Null),
            Some(Token::Ident(s)) => Expr::Var(s),
            Some(Token::LBracket) => Expr::List(self.parse_sequence(Token::RBracket)?.0),
            Some(Token::LParen) => {
                let (mut items, trailing_comma) = self.parse_sequence(Token::RParen)?;
                if items.len() == 1 && !trailing_comma {
                    items.remove(0)
                } else {
                    Expr::Tuple(items)
                }
            }
            Some(t) => return Err(format!("expected expression, got {:?}", t)),
            None => return Err("expected expression, got end of expression".to_string()),
        };
        Ok(expr)
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let depth = self.depth;
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek(0)? {
                Some(Token::Dot) => {
                    self.consume()?;
                    self.descend()?;
                    match self.consume()? {
                        Some(Token::Ident(attr)) => {
                            expr = Expr::Attribute(Box::new(expr), attr);
                        }
                        t => return Err(format!("expected identifier after dot, got {:?}", t)),
                    }
                }
                Some(Token::LBracket) => {
                    self.consume()?;
                    self.descend()?;
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                _ => break,
            }
        }

        self.depth = depth;
        Ok(expr)
    }
}
