use indexmap::IndexMap;

use super::lexer::{Spanned, Token, tokenize};
use super::{Expr, Statement, StatementBody};
use crate::core::ConversionError;

/// Prefix of lines holding a deactivated statement.
pub(crate) const INACTIVE_PREFIX: &str = "#~";

/// Source of one statement, gathered across lines.
struct Chunk {
    source: String,
    line: usize,
    active: bool,
    comment: Vec<String>,
}

pub(crate) fn parse(text: &str) -> Result<Vec<Statement>, ConversionError> {
    split(text)?.into_iter().map(parse_chunk).collect()
}

fn split(text: &str) -> Result<Vec<Chunk>, ConversionError> {
    let mut chunks = Vec::new();
    let mut comment: Vec<String> = Vec::new();
    let mut current: Option<Chunk> = None;
    let mut depth: i64 = 0;

    for (index, raw) in text.lines().enumerate() {
        let lineno = index + 1;
        let trimmed = raw.trim_start();
        let (code, active) = match trimmed.strip_prefix(INACTIVE_PREFIX) {
            Some(rest) => (rest.strip_prefix(' ').unwrap_or(rest), false),
            None => (raw, true),
        };

        if let Some(chunk) = current.as_mut() {
            if chunk.active != active {
                if trimmed.is_empty() {
                    continue;
                }
                return Err(ConversionError::at_line(
                    lineno,
                    "statement mixes active and inactive lines",
                ));
            }
            chunk.source.push('\n');
            chunk.source.push_str(code);
            depth += paren_delta(code);
        } else {
            if trimmed.is_empty() {
                continue;
            }
            if active && trimmed.starts_with('#') {
                let line = trimmed[1..].strip_prefix(' ').unwrap_or(&trimmed[1..]);
                comment.push(line.to_string());
                continue;
            }
            depth = paren_delta(code);
            current = Some(Chunk {
                source: code.to_string(),
                line: lineno,
                active,
                comment: std::mem::take(&mut comment),
            });
        }

        if depth < 0 {
            return Err(ConversionError::at_line(lineno, "unbalanced `)`"));
        }
        if depth == 0
            && let Some(chunk) = current.take()
        {
            chunks.push(chunk);
        }
    }

    if let Some(chunk) = current {
        return Err(ConversionError::at_line(chunk.line, "unclosed `(`"));
    }
    Ok(chunks)
}

/// Net parenthesis depth change of a line, ignoring strings and comments.
fn paren_delta(code: &str) -> i64 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in code.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '#' => break,
            '(' | '[' => delta += 1,
            ')' | ']' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn parse_chunk(chunk: Chunk) -> Result<Statement, ConversionError> {
    let tokens = tokenize(&chunk.source)
        .map_err(|offset| ConversionError::at_line(line_of(&chunk, offset), "invalid character"))?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        chunk: &chunk,
    };
    let (name, body) = parser.statement()?;
    if parser.peek() == Some(&Token::Semicolon) {
        parser.pos += 1;
    }
    if let Some(extra) = parser.peek() {
        return Err(parser.error(format!("unexpected {} after statement", extra.describe())));
    }
    Ok(Statement {
        name,
        body,
        active: chunk.active,
        comment: if chunk.comment.is_empty() {
            None
        } else {
            Some(chunk.comment.join("\n"))
        },
        line: chunk.line,
    })
}

fn line_of(chunk: &Chunk, offset: usize) -> usize {
    let end = offset.min(chunk.source.len());
    chunk.line + chunk.source[..end].matches('\n').count()
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    chunk: &'a Chunk,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(token, _)| token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, reason: impl Into<String>) -> ConversionError {
        let offset = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, offset)| *offset)
            .unwrap_or(0);
        ConversionError::at_line(line_of(self.chunk, offset), reason)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConversionError> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => {
                let reason = format!("expected {}, found {}", expected.describe(), other.describe());
                Err(self.error(reason))
            }
            None => Err(self.error(format!("expected {}, found end of statement", expected.describe()))),
        }
    }

    fn ident(&mut self) -> Result<String, ConversionError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("expected a name, found {}", other.describe())))
            }
            None => Err(self.error("expected a name, found end of statement")),
        }
    }

    fn statement(&mut self) -> Result<(Option<String>, StatementBody), ConversionError> {
        let assigned = matches!(
            (self.peek(), self.peek_nth(1)),
            (Some(Token::Ident(_)), Some(Token::Eq))
        );
        let name = if assigned {
            let name = self.ident()?;
            self.expect(Token::Eq)?;
            Some(name)
        } else {
            None
        };
        let is_call = matches!(
            (self.peek(), self.peek_nth(1)),
            (Some(Token::Ident(title)), Some(Token::LParen)) if title != "_F"
        );
        if is_call {
            let title = self.ident()?;
            let keywords = self.keyword_args()?;
            return Ok((name, StatementBody::Call { title, keywords }));
        }
        if name.is_none() {
            return Err(self.error("expected a command call or an assignment"));
        }
        let value = self.expr()?;
        Ok((name, StatementBody::Assign(value)))
    }

    fn keyword_args(&mut self) -> Result<IndexMap<String, Expr>, ConversionError> {
        self.expect(Token::LParen)?;
        let mut keywords = IndexMap::new();
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                return Ok(keywords);
            }
            let keyword = self.ident()?;
            self.expect(Token::Eq)?;
            let value = self.expr()?;
            if keywords.insert(keyword.clone(), value).is_some() {
                return Err(self.error(format!("keyword {keyword} given twice")));
            }
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {}
                _ => return Err(self.error("expected `,` or `)` after keyword value")),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr, ConversionError> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Float(v)) => Ok(Expr::Float(v)),
            Some(Token::Str(s)) => Ok(Expr::Text(s)),
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(v)) => Ok(Expr::Int(-v)),
                Some(Token::Float(v)) => Ok(Expr::Float(-v)),
                _ => {
                    self.pos -= 1;
                    Err(self.error("expected a number after `-`"))
                }
            },
            Some(Token::Plus) => match self.next() {
                Some(Token::Int(v)) => Ok(Expr::Int(v)),
                Some(Token::Float(v)) => Ok(Expr::Float(v)),
                _ => {
                    self.pos -= 1;
                    Err(self.error("expected a number after `+`"))
                }
            },
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "_F" => Ok(Expr::Block(self.keyword_args()?)),
                _ => Ok(Expr::Name(name)),
            },
            Some(Token::LParen) => self.sequence(Token::RParen, true),
            Some(Token::LBracket) => self.sequence(Token::RBracket, false),
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {}", other.describe())))
            }
            None => Err(self.error("expected a value, found end of statement")),
        }
    }

    /// Items up to `close`. A parenthesised single item without a trailing
    /// comma is a grouping, not a tuple.
    fn sequence(&mut self, close: Token, grouping: bool) -> Result<Expr, ConversionError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.peek() == Some(&close) {
                self.pos += 1;
                break;
            }
            items.push(self.expr()?);
            trailing_comma = false;
            match self.peek() {
                Some(Token::Comma) => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(token) if *token == close => {}
                _ => return Err(self.error(format!("expected `,` or {}", close.describe()))),
            }
        }
        if grouping && items.len() == 1 && !trailing_comma {
            return Ok(items.remove(0));
        }
        Ok(Expr::List(items))
    }
}
