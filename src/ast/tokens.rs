use std::fmt;

/// Kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Literals
    /// Integer literal, optionally negative
    ///
    /// # Examples
    /// ```text
    /// 0
    /// -1
    /// 42
    /// ```
    Integer,

    /// Floating point literal
    Float,

    /// Single-quoted string literal. A doubled quote is the only escape.
    ///
    /// # Examples
    /// ```text
    /// 'Open'
    /// 'O''Brien'
    /// ```
    String,

    /// `true` or `false`
    Boolean,

    /// `null`
    Null,

    /// Field name, function name or keyword-like word
    ///
    /// Letters, digits and underscores, not starting with a digit.
    Identifier,

    // Keywords
    /// `as` in projections
    As,
    /// `asc` in indexers
    Asc,
    /// `desc` in indexers
    Desc,

    // Navigation
    /// `.`
    Dot,
    /// `?.` null-safe navigation
    NullSafeDot,
    /// `:` function separator or ternary separator
    Colon,
    /// `,`
    Comma,

    // Delimiters
    /// `(` filter, argument or grouping
    LParen,
    /// `)`
    RParen,
    /// `[` indexer
    LBracket,
    /// `]`
    RBracket,
    /// `{` projection
    LBrace,
    /// `}` projection or runtime parameter close
    RBrace,

    // Runtime parameters
    /// `${` opens a runtime parameter
    ///
    /// # Examples
    /// ```text
    /// ${Take|10}
    /// ```
    ParamOpen,
    /// `|` separates a parameter name from its default
    Pipe,

    // Comparison
    /// `=` or `==`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,

    // Logical
    /// `&&`
    And,
    /// `||`
    Or,

    /// `?` ternary condition
    Question,

    /// Anything the tokenizer could not classify, including unterminated
    /// strings. Reported by the parser.
    Unknown,

    /// End of input
    Eof,
}

impl TokenKind {
    /// Short human readable description used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Integer => "integer",
            TokenKind::Float => "number",
            TokenKind::String => "string",
            TokenKind::Boolean => "boolean",
            TokenKind::Null => "null",
            TokenKind::Identifier => "identifier",
            TokenKind::As => "'as'",
            TokenKind::Asc => "'asc'",
            TokenKind::Desc => "'desc'",
            TokenKind::Dot => "'.'",
            TokenKind::NullSafeDot => "'?.'",
            TokenKind::Colon => "':'",
            TokenKind::Comma => "','",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::ParamOpen => "'${'",
            TokenKind::Pipe => "'|'",
            TokenKind::Eq => "'='",
            TokenKind::NotEq => "'!='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Question => "'?'",
            TokenKind::Unknown => "unknown input",
            TokenKind::Eof => "end of expression",
        }
    }
}

/// A token with its raw source text and the byte offset where it starts.
///
/// String literals keep their quotes and doubled-quote escapes in `text`;
/// the parser unescapes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            offset,
        }
    }

    /// Byte offset one past the end of the token's source text.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eof => write!(f, "end of expression"),
            TokenKind::String => write!(f, "{}", self.text),
            _ => write!(f, "'{}'", self.text),
        }
    }
}
