use crate::ast::{Token, TokenKind};

/// Converts expression text into a flat token sequence.
///
/// The lexer never fails: characters it does not understand, and string
/// literals without a closing quote, come out as [`TokenKind::Unknown`] and
/// are reported by the parser at their offset.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    position: usize,
}

/// Tokenizes the whole input. The last token is always [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize()
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            position: 0,
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.is(TokenKind::Eof);
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }

    fn current_char(&self) -> Option<char> {
        self.chars.get(self.position).map(|(_, c)| *c)
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).map(|(_, c)| *c)
    }

    /// Byte offset of the current character, or the input length at the end.
    fn byte_offset(&self) -> usize {
        self.chars
            .get(self.position)
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn slice_from(&self, start: usize) -> &'a str {
        &self.source[start..self.byte_offset()]
    }

    /// Consumes `width` characters and produces a token covering them.
    fn symbol(&mut self, kind: TokenKind, width: usize) -> Token {
        let start = self.byte_offset();
        for _ in 0..width {
            self.advance();
        }
        Token::new(kind, self.slice_from(start), start)
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.byte_offset();
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.slice_from(start);
        let kind = match text {
            "as" => TokenKind::As,
            "asc" => TokenKind::Asc,
            "desc" => TokenKind::Desc,
            "true" | "false" => TokenKind::Boolean,
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, start)
    }

    fn read_string(&mut self) -> Token {
        let start = self.byte_offset();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            if ch == '\'' {
                if self.peek_char(1) == Some('\'') {
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                return Token::new(TokenKind::String, self.slice_from(start), start);
            }
            self.advance();
        }

        // Unterminated: hand the rest of the input to the parser as one
        // unknown token so the error points at the opening quote.
        Token::new(TokenKind::Unknown, self.slice_from(start), start)
    }

    fn read_number(&mut self) -> Token {
        let start = self.byte_offset();
        let mut is_float = false;

        if self.current_char() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.current_char() {
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.'
                && !is_float
                && self.peek_char(1).is_some_and(|c| c.is_ascii_digit())
            {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        let kind = if is_float {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        Token::new(kind, self.slice_from(start), start)
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.current_char() {
            None => Token::new(TokenKind::Eof, "", self.source.len()),
            Some('.') => self.symbol(TokenKind::Dot, 1),
            Some(',') => self.symbol(TokenKind::Comma, 1),
            Some(':') => self.symbol(TokenKind::Colon, 1),
            Some('(') => self.symbol(TokenKind::LParen, 1),
            Some(')') => self.symbol(TokenKind::RParen, 1),
            Some('[') => self.symbol(TokenKind::LBracket, 1),
            Some(']') => self.symbol(TokenKind::RBracket, 1),
            Some('{') => self.symbol(TokenKind::LBrace, 1),
            Some('}') => self.symbol(TokenKind::RBrace, 1),
            Some('?') => {
                if self.peek_char(1) == Some('.') {
                    self.symbol(TokenKind::NullSafeDot, 2)
                } else {
                    self.symbol(TokenKind::Question, 1)
                }
            }
            Some('$') => {
                if self.peek_char(1) == Some('{') {
                    self.symbol(TokenKind::ParamOpen, 2)
                } else {
                    self.symbol(TokenKind::Unknown, 1)
                }
            }
            Some('|') => {
                if self.peek_char(1) == Some('|') {
                    self.symbol(TokenKind::Or, 2)
                } else {
                    self.symbol(TokenKind::Pipe, 1)
                }
            }
            Some('&') => {
                if self.peek_char(1) == Some('&') {
                    self.symbol(TokenKind::And, 2)
                } else {
                    self.symbol(TokenKind::Unknown, 1)
                }
            }
            Some('=') => {
                if self.peek_char(1) == Some('=') {
                    self.symbol(TokenKind::Eq, 2)
                } else {
                    self.symbol(TokenKind::Eq, 1)
                }
            }
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    self.symbol(TokenKind::NotEq, 2)
                } else {
                    self.symbol(TokenKind::Unknown, 1)
                }
            }
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.symbol(TokenKind::GtEq, 2)
                } else {
                    self.symbol(TokenKind::Gt, 1)
                }
            }
            Some('<') => {
                if self.peek_char(1) == Some('=') {
                    self.symbol(TokenKind::LtEq, 2)
                } else {
                    self.symbol(TokenKind::Lt, 1)
                }
            }
            Some('\'') => self.read_string(),
            Some('-') if self.peek_char(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number()
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number(),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_identifier(),
            Some(_) => self.symbol(TokenKind::Unknown, 1),
        }
    }
}

/// Removes the surrounding quotes of a string token and collapses doubled
/// quotes.
pub fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(raw);
    inner.replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            kinds("as asc desc true false null"),
            vec![
                TokenKind::As,
                TokenKind::Asc,
                TokenKind::Desc,
                TokenKind::Boolean,
                TokenKind::Boolean,
                TokenKind::Null,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indexer() {
        assert_eq!(
            kinds("Orders[-1 asc CreatedAt]"),
            vec![
                TokenKind::Identifier,
                TokenKind::LBracket,
                TokenKind::Integer,
                TokenKind::Asc,
                TokenKind::Identifier,
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'O''Brien'"), "O'Brien");
        assert_eq!(unquote("''"), "");
    }
}
