//! Splits raw template text into literal spans and directive spans.

use crate::error::{ParseError, Position};

/// Opening and closing markers around directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Delimiters {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

impl Default for Delimiters {
    fn default() -> Self {
        Self::new("{{", "}}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment<'a> {
    /// Text outside any delimiter pair, untouched.
    Literal(&'a str),
    /// Trimmed text between a delimiter pair and the position of its opener.
    Directive { text: &'a str, position: Position },
}

/// Iterator over the [`Segment`]s of a template.
///
/// Line tracking is incremental: each step only looks at the text between
/// the previous opening delimiter and the next one.
pub struct Scanner<'a> {
    input: &'a str,
    delimiters: &'a Delimiters,
    cursor: usize,
    // Offset up to which line terminators have been counted.
    scanned: usize,
    line: usize,
    line_start: usize,
    pending: Option<Segment<'a>>,
    done: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str, delimiters: &'a Delimiters) -> Self {
        Self {
            input,
            delimiters,
            cursor: 0,
            scanned: 0,
            line: 1,
            line_start: 0,
            pending: None,
            done: false,
        }
    }

    fn position_of(&mut self, offset: usize) -> Position {
        for (i, b) in self.input[self.scanned..offset].bytes().enumerate() {
            if b == b'\n' {
                self.line += 1;
                self.line_start = self.scanned + i + 1;
            }
        }
        self.scanned = offset;
        let column = self.input[self.line_start..offset].chars().count();
        Position::new(self.line, column)
    }

    fn advance(&mut self) -> Result<Segment<'a>, ParseError> {
        let rest = &self.input[self.cursor..];
        let Some(rel_open) = rest.find(self.delimiters.open.as_str()) else {
            self.done = true;
            self.cursor = self.input.len();
            return Ok(Segment::Literal(rest));
        };

        let open = self.cursor + rel_open;
        let position = self.position_of(open);
        let body_start = open + self.delimiters.open.len();
        let Some(rel_close) = self.input[body_start..].find(self.delimiters.close.as_str()) else {
            return Err(ParseError::UnterminatedDirective {
                delimiter: self.delimiters.close.clone(),
                position,
            });
        };

        let body_end = body_start + rel_close;
        let literal = &self.input[self.cursor..open];
        self.cursor = body_end + self.delimiters.close.len();
        self.pending = Some(Segment::Directive {
            text: self.input[body_start..body_end].trim(),
            position,
        });
        Ok(Segment::Literal(literal))
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Segment<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(segment) = self.pending.take() {
            return Some(Ok(segment));
        }
        if self.done {
            return None;
        }
        let result = self.advance();
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(input: &str) -> Vec<Segment<'_>> {
        // Leaked so the borrowed segments can outlive this helper.
        let delimiters: &'static Delimiters = Box::leak(Box::new(Delimiters::default()));
        Scanner::new(input, delimiters)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(scan("hello"), vec![Segment::Literal("hello")]);
    }

    #[test]
    fn directive_text_is_trimmed() {
        assert_eq!(
            scan("a{{  name }}b"),
            vec![
                Segment::Literal("a"),
                Segment::Directive {
                    text: "name",
                    position: Position::new(1, 1)
                },
                Segment::Literal("b"),
            ]
        );
    }

    #[test]
    fn tracks_lines_and_columns() {
        let segments = scan("x\n  {{a}}\n\nyz {{b}} {{c}}");
        let positions: Vec<Position> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Directive { position, .. } => Some(*position),
                Segment::Literal(_) => None,
            })
            .collect();
        assert_eq!(
            positions,
            vec![Position::new(2, 2), Position::new(4, 3), Position::new(4, 9)]
        );
    }

    #[test]
    fn columns_count_characters() {
        let segments = scan("héé{{x}}");
        assert_eq!(
            segments[1],
            Segment::Directive {
                text: "x",
                position: Position::new(1, 3)
            }
        );
    }

    #[test]
    fn custom_delimiters() {
        let delimiters = Delimiters::new("<%", "%>");
        let segments: Vec<_> = Scanner::new("a<% b %>{{c}}", &delimiters)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Literal("a"),
                Segment::Directive {
                    text: "b",
                    position: Position::new(1, 1)
                },
                Segment::Literal("{{c}}"),
            ]
        );
    }

    #[test]
    fn identical_delimiters_do_not_close_on_the_opener() {
        let delimiters = Delimiters::new("$$", "$$");
        let segments: Vec<_> = Scanner::new("$$x$$", &delimiters)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            segments[1],
            Segment::Directive {
                text: "x",
                position: Position::new(1, 0)
            }
        );
    }

    #[test]
    fn missing_closer_is_an_error() {
        let delimiters = Delimiters::default();
        let mut scanner = Scanner::new("ok\n {{ name", &delimiters);
        let err = scanner.next().unwrap().unwrap_err();
        assert_eq!(
            err,
            ParseError::UnterminatedDirective {
                delimiter: "}}".to_string(),
                position: Position::new(2, 1)
            }
        );
        assert!(scanner.next().is_none());
    }
}
