// lexer.rs — Turns policy source text into a token stream.
//
// The lexer is a single forward scan: every byte is looked at once and the
// token vector grows linearly with the input, which is itself capped at
// MAX_SOURCE_BYTES. Punctuation the grammar never uses is still tokenized
// (as `Other`) so the parser can skip over forbidden constructs and let the
// validator report them with a proper error code.

use crate::error::{Location, SyntaxError};

/// Largest policy source accepted, in bytes.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;
/// Longest identifier accepted, in bytes.
pub const MAX_IDENT_BYTES: usize = 128;
/// Longest string literal accepted, in bytes (after unescaping).
pub const MAX_STRING_BYTES: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    /// Duration literal, normalized to milliseconds.
    Duration(u64),
    Str(String),
    Gt,
    Ge,
    Lt,
    Le,
    EqEq,
    NotEq,
    Assign,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    /// Any other single non-whitespace character.
    Other(char),
    Eof,
}

impl TokenKind {
    /// Short description used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{}'", name),
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Duration(ms) => format!("duration {}ms", ms),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::NotEq => "'!='".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Other(c) => format!("'{}'", c),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

/// Tokenize a policy source. The returned vector always ends with `Eof`.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    if source.len() > MAX_SOURCE_BYTES {
        return Err(SyntaxError::new(
            Location::START,
            format!(
                "policy source is {} bytes; the limit is {} bytes",
                source.len(),
                MAX_SOURCE_BYTES
            ),
        ));
    }
    Lexer::new(source).run()
}

struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> Location {
        Location {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.offset..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.offset..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let location = self.location();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    location,
                });
                return Ok(tokens);
            };

            let kind = if c.is_ascii_alphabetic() || c == '_' {
                self.ident(location)?
            } else if c.is_ascii_digit()
                || (c == '-' && self.peek_second().is_some_and(|d| d.is_ascii_digit()))
            {
                self.number(location)?
            } else if c == '"' {
                self.string(location)?
            } else {
                self.punct()
            };
            tokens.push(Token { kind, location });
        }
    }

    /// Skip whitespace and `#` line comments.
    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn ident(&mut self, start: Location) -> Result<TokenKind, SyntaxError> {
        let begin = self.offset;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[begin..self.offset];
        if text.len() > MAX_IDENT_BYTES {
            return Err(SyntaxError::new(
                start,
                format!("identifier longer than {} bytes", MAX_IDENT_BYTES),
            ));
        }
        Ok(TokenKind::Ident(text.to_string()))
    }

    fn number(&mut self, start: Location) -> Result<TokenKind, SyntaxError> {
        let begin = self.offset;
        if self.peek() == Some('-') {
            self.bump();
        }
        self.digits();
        let mut fractional = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|d| d.is_ascii_digit()) {
            fractional = true;
            self.bump();
            self.digits();
        }
        let text = &self.src[begin..self.offset];

        // A unit suffix glued to the number makes it a duration literal.
        let unit_begin = self.offset;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphabetic() {
                self.bump();
            } else {
                break;
            }
        }
        let unit = &self.src[unit_begin..self.offset];

        if unit.is_empty() {
            let value: f64 = text
                .parse()
                .map_err(|_| SyntaxError::new(start, format!("invalid number '{}'", text)))?;
            return Ok(TokenKind::Number(value));
        }

        let Some(factor) = unit_millis(unit) else {
            return Err(SyntaxError::new(
                start,
                format!(
                    "invalid numeric literal '{}{}' (duration units are ms, s, m, h, d)",
                    text, unit
                ),
            ));
        };
        if fractional || text.starts_with('-') {
            return Err(SyntaxError::new(
                start,
                format!(
                    "duration '{}{}' must be a non-negative whole number",
                    text, unit
                ),
            ));
        }
        let millis = text
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(factor))
            .ok_or_else(|| SyntaxError::new(start, format!("duration '{}{}' is too large", text, unit)))?;
        Ok(TokenKind::Duration(millis))
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    fn string(&mut self, start: Location) -> Result<TokenKind, SyntaxError> {
        self.bump(); // opening quote
        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(SyntaxError::new(start, "unterminated string literal"));
            };
            match c {
                '"' => break,
                '\n' => return Err(SyntaxError::new(start, "unterminated string literal")),
                '\\' => {
                    let escaped = match self.bump() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some(other) => {
                            return Err(SyntaxError::new(
                                self.location(),
                                format!("unknown escape sequence '\\{}'", other),
                            ))
                        }
                        None => return Err(SyntaxError::new(start, "unterminated string literal")),
                    };
                    value.push(escaped);
                }
                other => value.push(other),
            }
            if value.len() > MAX_STRING_BYTES {
                return Err(SyntaxError::new(
                    start,
                    format!("string literal longer than {} bytes", MAX_STRING_BYTES),
                ));
            }
        }
        Ok(TokenKind::Str(value))
    }

    fn punct(&mut self) -> TokenKind {
        let c = self.bump().unwrap_or('\0');
        let followed_by_eq = self.peek() == Some('=');
        match c {
            '>' if followed_by_eq => {
                self.bump();
                TokenKind::Ge
            }
            '<' if followed_by_eq => {
                self.bump();
                TokenKind::Le
            }
            '=' if followed_by_eq => {
                self.bump();
                TokenKind::EqEq
            }
            '!' if followed_by_eq => {
                self.bump();
                TokenKind::NotEq
            }
            '>' => TokenKind::Gt,
            '<' => TokenKind::Lt,
            '=' => TokenKind::Assign,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            other => TokenKind::Other(other),
        }
    }
}

/// Milliseconds per duration unit.
fn unit_millis(unit: &str) -> Option<u64> {
    match unit {
        "ms" => Some(1),
        "s" => Some(1_000),
        "m" => Some(60_000),
        "h" => Some(3_600_000),
        "d" => Some(86_400_000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_a_predicate() {
        assert_eq!(
            kinds("cost_per_hour >= 200.5"),
            vec![
                TokenKind::Ident("cost_per_hour".into()),
                TokenKind::Ge,
                TokenKind::Number(200.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn durations_are_normalized_to_millis() {
        assert_eq!(
            kinds("30s 5m 250ms 2h 1d"),
            vec![
                TokenKind::Duration(30_000),
                TokenKind::Duration(300_000),
                TokenKind::Duration(250),
                TokenKind::Duration(7_200_000),
                TokenKind::Duration(86_400_000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn negative_numbers_and_dotted_identifiers() {
        assert_eq!(
            kinds("latency.p99 != -1.5"),
            vec![
                TokenKind::Ident("latency.p99".into()),
                TokenKind::NotEq,
                TokenKind::Number(-1.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn strings_support_escapes() {
        assert_eq!(
            kinds(r#""say \"hi\"\n""#),
            vec![TokenKind::Str("say \"hi\"\n".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn comments_are_skipped_and_locations_tracked() {
        let tokens = tokenize("# header\n  when").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("when".into()));
        assert_eq!(tokens[0].location.line, 2);
        assert_eq!(tokens[0].location.column, 3);
        assert_eq!(tokens[0].location.offset, 11);
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("warn \"oops").unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.location.column, 6);
    }

    #[test]
    fn bad_unit_is_rejected() {
        let err = tokenize("x > 5years").unwrap_err();
        assert!(err.message.contains("duration units"));
        assert!(err.message.contains("5years"));
    }

    #[test]
    fn oversized_source_is_rejected_before_scanning() {
        let source = "a".repeat(MAX_SOURCE_BYTES + 1);
        let err = tokenize(&source).unwrap_err();
        assert!(err.message.contains("limit"));
    }

    #[test]
    fn unknown_punctuation_is_tokenized_not_rejected() {
        assert_eq!(
            kinds("a + b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Other('+'),
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }
}
