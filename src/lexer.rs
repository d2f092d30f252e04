//! Tokenizer for the expression language used inside directives.

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,
    In,
    True,
    False,
    Null,

    // Symbols
    Plus,     // +
    Minus,    // -
    Star,     // *
    Slash,    // /
    Percent,  // %
    EqEq,     // ==
    NotEq,    // !=
    Lt,       // <
    LtEq,     // <=
    Gt,       // >
    GtEq,     // >=
    Dot,      // .
    Comma,    // ,
    LBracket, // [
    RBracket, // ]
    LParen,   // (
    RParen,   // )

    // Data
    Ident(String),
    StringLit(String),
    Int(i64),
    Float(f64),
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    /// Returns the next token, `Ok(None)` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, String> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        const TWO_CHAR: [(&str, Token); 4] = [
            ("==", Token::EqEq),
            ("!=", Token::NotEq),
            ("<=", Token::LtEq),
            (">=", Token::GtEq),
        ];
        for (symbol, token) in TWO_CHAR {
            if rest.starts_with(symbol) {
                self.advance(2);
                return Ok(Some(token));
            }
        }

        let single = match first {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '.' if !rest[1..].starts_with(|c: char| c.is_ascii_digit()) => Some(Token::Dot),
            ',' => Some(Token::Comma),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(token) = single {
            self.advance(1);
            return Ok(Some(token));
        }

        if first == '\'' || first == '"' {
            return self.string_literal(first).map(Some);
        }

        if first.is_ascii_digit() || first == '.' {
            return self.number().map(Some);
        }

        if is_ident_start(first) {
            let len: usize = rest
                .chars()
                .take_while(|c| is_ident_char(*c))
                .map(char::len_utf8)
                .sum();
            let ident = &rest[..len];
            self.advance(len);

            return Ok(Some(match ident {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "true" => Token::True,
                "false" => Token::False,
                "none" => Token::Null,
                _ => Token::Ident(ident.to_string()),
            }));
        }

        Err(format!("unexpected character '{}'", first))
    }

    fn string_literal(&mut self, quote: char) -> Result<Token, String> {
        let rest = self.remaining();
        let mut s = String::new();
        let mut chars = rest.char_indices().skip(1);
        while let Some((idx, c)) = chars.next() {
            if c == quote {
                self.advance(idx + c.len_utf8());
                return Ok(Token::StringLit(s));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, 'r')) => s.push('\r'),
                    Some((_, esc)) => s.push(esc),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }
        Err("unterminated string literal".to_string())
    }

    fn number(&mut self) -> Result<Token, String> {
        let rest = self.remaining();
        let mut len = 0;
        let mut seen_dot = false;
        for c in rest.chars() {
            if c.is_ascii_digit() || c == '_' {
                len += 1;
            } else if c == '.' && !seen_dot && !rest[len + 1..].starts_with(is_ident_start) {
                seen_dot = true;
                len += 1;
            } else {
                break;
            }
        }
        let text = rest[..len].replace('_', "");
        self.advance(len);

        if seen_dot {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| format!("invalid number '{}'", text))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| format!("integer literal '{}' out of range", text))
        }
    }
}
