use crate::{
    ast::{
        BoolExpr, CompareOp, ExpressionNode, Function, FunctionArg, IndexMode, Literal,
        OrderDirection, Ordering, ProjectedField, PropertyRef, SingleIndex, TextOp, Token,
        TokenKind,
    },
    lexer::{tokenize, unquote},
};

/// Syntax error with the byte offset of the offending construct.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position,
        }
    }
}

type ParseResult<T> = Result<T, ParseError>;

/// Parses a field expression into its syntax tree.
///
/// # Examples
///
/// ```
/// use fieldlink::parser::parse;
///
/// let ast = parse("Orders(Status = 'Open')[0 desc CreatedAt].Total").unwrap();
/// assert_eq!(ast, parse("Orders(Status = 'Open')[0 desc CreatedAt].Total").unwrap());
/// assert!(parse("Orders[0 asc CreatedAt").is_err());
/// ```
pub fn parse(source: &str) -> Result<ExpressionNode, ParseError> {
    Parser::new(source).parse()
}

/// Recursive-descent parser over the token stream of one expression.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(source: &str) -> Self {
        Parser {
            tokens: tokenize(source),
            position: 0,
        }
    }

    pub fn parse(&mut self) -> ParseResult<ExpressionNode> {
        self.check_unknown()?;
        self.check_balance()?;

        let expr = if self.check(TokenKind::LBrace) {
            self.parse_projection(None)?
        } else {
            self.parse_chain()?
        };

        match self.current().kind {
            TokenKind::Eof => Ok(expr),
            TokenKind::Question => Err(ParseError::new(
                "ternary expression is only allowed inside a projection",
                self.current().offset,
            )),
            _ => Err(ParseError::new(
                format!("unexpected {} after end of expression", self.current()),
                self.current().offset,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        // The stream always ends with Eof and the parser never moves past it.
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        &self.tokens[(self.position + offset).min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> Option<&Token> {
        self.position.checked_sub(1).map(|i| &self.tokens[i])
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !token.is(TokenKind::Eof) {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                format!(
                    "expected {} {}, found {}",
                    kind.describe(),
                    context,
                    self.current()
                ),
                self.current().offset,
            ))
        }
    }

    /// Property names may collide with the `as`, `asc` and `desc` keywords.
    fn check_name(&self) -> bool {
        is_name(self.current().kind)
    }

    fn expect_name(&mut self, context: &str) -> ParseResult<Token> {
        if self.check_name() {
            Ok(self.advance())
        } else {
            self.expect(TokenKind::Identifier, context)
        }
    }

    // ------------------------------------------------------------------
    // Pre-passes
    // ------------------------------------------------------------------

    fn check_unknown(&self) -> ParseResult<()> {
        match self.tokens.iter().find(|t| t.is(TokenKind::Unknown)) {
            Some(token) if token.text.starts_with('\'') => Err(ParseError::new(
                "unterminated string literal",
                token.offset,
            )),
            Some(token) => Err(ParseError::new(
                format!("unexpected character '{}'", token.text),
                token.offset,
            )),
            None => Ok(()),
        }
    }

    /// Verifies that `()`, `[]`, `{}` and `${}` are balanced and properly
    /// nested before any grammar rule runs.
    fn check_balance(&self) -> ParseResult<()> {
        let mut stack: Vec<&Token> = Vec::new();

        for token in &self.tokens {
            match token.kind {
                TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::ParamOpen => stack.push(token),
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    let Some(opener) = stack.pop() else {
                        return Err(ParseError::new(
                            format!(
                                "unexpected '{}' without matching '{}'",
                                token.text,
                                opener_for(token.kind)
                            ),
                            token.offset,
                        ));
                    };
                    if !closes(opener.kind, token.kind) {
                        return Err(ParseError::new(
                            format!(
                                "expected '{}' to close '{}' at position {}, found '{}'",
                                closer_for(opener.kind),
                                opener.text,
                                opener.offset,
                                token.text
                            ),
                            token.offset,
                        ));
                    }
                }
                _ => {}
            }
        }

        match stack.pop() {
            Some(opener) => Err(ParseError::new(
                format!(
                    "unclosed '{}' (missing '{}')",
                    opener.text,
                    closer_for(opener.kind)
                ),
                opener.offset,
            )),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Chains
    // ------------------------------------------------------------------

    /// Parses `Ident` followed by any number of navigation, filter, indexer,
    /// function and projection postfixes.
    fn parse_chain(&mut self) -> ParseResult<ExpressionNode> {
        let head = match self.current().kind {
            kind if is_name(kind) => self.advance(),
            TokenKind::LBrace => {
                return Err(ParseError::new(
                    "projection '{' must follow '.' or start the expression",
                    self.current().offset,
                ));
            }
            _ => {
                return Err(ParseError::new(
                    format!("expected property name, found {}", self.current()),
                    self.current().offset,
                ));
            }
        };

        let mut expr = ExpressionNode::Property(PropertyRef::new(head.text));
        // What the last postfix was, for the missing '.' diagnostics.
        let mut closed_by: Option<&'static str> = None;

        loop {
            match self.current().kind {
                TokenKind::Dot => {
                    self.advance();
                    match self.current().kind {
                        kind if is_name(kind) => {
                            let name = self.advance().text;
                            expr = extend_navigation(expr, PropertyRef::new(name));
                        }
                        TokenKind::LBrace => return self.parse_projection(Some(expr)),
                        _ => {
                            return Err(ParseError::new(
                                format!(
                                    "expected property name or '{{' after '.', found {}",
                                    self.current()
                                ),
                                self.current().offset,
                            ));
                        }
                    }
                    closed_by = None;
                }
                TokenKind::NullSafeDot => {
                    self.advance();
                    let name = self.expect_name("after '?.'")?.text;
                    expr = extend_navigation(expr, PropertyRef::null_safe(name));
                    closed_by = None;
                }
                TokenKind::LParen => {
                    self.advance();
                    let predicate = self.parse_or()?;
                    self.expect(TokenKind::RParen, "to close filter")?;
                    expr = ExpressionNode::Filter {
                        target: Box::new(expr),
                        predicate: Box::new(predicate),
                    };
                    closed_by = Some("filter");
                }
                TokenKind::LBracket => {
                    expr = self.parse_indexer(expr)?;
                    closed_by = Some("indexer");
                }
                TokenKind::Colon => {
                    let adjacent = self
                        .previous()
                        .is_some_and(|prev| prev.end() == self.current().offset);
                    if !adjacent {
                        // Separator of an enclosing ternary.
                        break;
                    }
                    expr = self.parse_function(expr)?;
                    closed_by = None;
                }
                TokenKind::LBrace => {
                    return Err(ParseError::new(
                        "missing '.' before projection '{'",
                        self.current().offset,
                    ));
                }
                TokenKind::Identifier
                    if closed_by.is_some() && TextOp::from_word(&self.current().text).is_none() =>
                {
                    return Err(ParseError::new(
                        format!(
                            "missing '.' before '{}' after {}",
                            self.current().text,
                            closed_by.unwrap_or("indexer")
                        ),
                        self.current().offset,
                    ));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_function(&mut self, target: ExpressionNode) -> ParseResult<ExpressionNode> {
        self.advance(); // ':'
        let name_token = self.expect(TokenKind::Identifier, "after ':'")?;
        let function = Function::from_name(&name_token.text).ok_or_else(|| {
            ParseError::new(
                format!("unknown function '{}'", name_token.text),
                name_token.offset,
            )
        })?;
        let spec = function.arg_spec();

        let has_parens =
            self.check(TokenKind::LParen) && name_token.end() == self.current().offset;

        if !has_parens {
            if spec.is_required() {
                return Err(ParseError::new(
                    format!("function '{}' requires an argument", function.name()),
                    name_token.offset,
                ));
            }
            return Ok(ExpressionNode::FunctionCall {
                target: Box::new(target),
                function,
                arg: None,
            });
        }

        let open = self.advance();
        if !spec.accepts_arg() {
            return Err(ParseError::new(
                format!("function '{}' takes no argument", function.name()),
                open.offset,
            ));
        }

        if self.check(TokenKind::RParen) {
            if spec.is_required() {
                return Err(ParseError::new(
                    format!("function '{}' requires an argument", function.name()),
                    self.current().offset,
                ));
            }
            self.advance();
            return Ok(ExpressionNode::FunctionCall {
                target: Box::new(target),
                function,
                arg: None,
            });
        }

        let arg = if spec.is_predicate() {
            FunctionArg::Predicate(Box::new(self.parse_or()?))
        } else {
            FunctionArg::Value(Box::new(self.parse_operand()?))
        };
        self.expect(TokenKind::RParen, "to close function argument")?;

        Ok(ExpressionNode::FunctionCall {
            target: Box::new(target),
            function,
            arg: Some(arg),
        })
    }

    // ------------------------------------------------------------------
    // Indexers
    // ------------------------------------------------------------------

    fn parse_indexer(&mut self, target: ExpressionNode) -> ParseResult<ExpressionNode> {
        let open = self.advance(); // '['

        let mut slots = Vec::new();
        while slots.len() < 2 {
            match self.current().kind {
                TokenKind::Integer => {
                    let token = self.advance();
                    let value = parse_integer(&token)?;
                    slots.push(ExpressionNode::Literal(Literal::Integer(value)));
                }
                TokenKind::ParamOpen => slots.push(self.parse_parameter()?),
                TokenKind::Float => {
                    return Err(ParseError::new(
                        format!("indexer positions must be integers, found {}", self.current()),
                        self.current().offset,
                    ));
                }
                _ => break,
            }
        }

        if slots.is_empty() {
            return Err(ParseError::new(
                "indexer requires an index or a skip/take pair",
                open.offset,
            ));
        }

        let ordering = match self.current().kind {
            TokenKind::Asc | TokenKind::Desc => {
                let direction = if self.advance().is(TokenKind::Asc) {
                    OrderDirection::Asc
                } else {
                    OrderDirection::Desc
                };
                let by = self.parse_chain()?;
                Some(Ordering {
                    direction,
                    by: Box::new(by),
                })
            }
            _ => None,
        };

        if !self.check(TokenKind::RBracket) {
            return Err(ParseError::new(
                format!(
                    "expected 'asc', 'desc' or ']' in indexer, found {}",
                    self.current()
                ),
                self.current().offset,
            ));
        }
        self.advance();

        let mut slots = slots.into_iter();
        let first = slots.next();
        let second = slots.next();

        let mode = match (first, second) {
            (Some(ExpressionNode::Literal(Literal::Integer(0))), None) => {
                IndexMode::Single(SingleIndex::First)
            }
            (Some(ExpressionNode::Literal(Literal::Integer(-1))), None) => {
                IndexMode::Single(SingleIndex::Last)
            }
            (skip, take) => IndexMode::Range {
                skip: skip.map(Box::new),
                take: take.map(Box::new),
            },
        };

        Ok(ExpressionNode::Indexer {
            target: Box::new(target),
            mode,
            ordering,
        })
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    fn parse_projection(&mut self, target: Option<ExpressionNode>) -> ParseResult<ExpressionNode> {
        let open = self.advance(); // '{'
        let mut fields: Vec<ProjectedField> = Vec::new();

        if self.check(TokenKind::RBrace) {
            return Err(ParseError::new("projection has no fields", open.offset));
        }

        loop {
            let start = self.current().offset;
            let field = self.parse_projected_field()?;

            if fields
                .iter()
                .any(|existing| existing.output_name() == field.output_name())
            {
                return Err(ParseError::new(
                    format!("duplicate projection field '{}'", field.output_name()),
                    start,
                ));
            }
            fields.push(field);

            match self.current().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    break;
                }
                _ => {
                    return Err(ParseError::new(
                        format!("expected ',' or '}}' in projection, found {}", self.current()),
                        self.current().offset,
                    ));
                }
            }
        }

        Ok(ExpressionNode::Projection {
            target: target.map(Box::new),
            fields,
        })
    }

    fn parse_projected_field(&mut self) -> ParseResult<ProjectedField> {
        let start = self.current().offset;

        if self.check_name() && matches!(self.peek(1).kind, TokenKind::Comma | TokenKind::RBrace)
        {
            return Ok(ProjectedField::Plain(self.advance().text));
        }

        let expr = if self.check(TokenKind::LParen) {
            self.parse_grouped_field()?
        } else {
            self.parse_chain()?
        };

        if !self.check(TokenKind::As) {
            let message = if matches!(expr, ExpressionNode::Conditional { .. }) {
                "ternary expression in projection requires an 'as' alias"
            } else {
                "computed projection field requires an 'as' alias"
            };
            return Err(ParseError::new(message, start));
        }
        self.advance();

        let alias = self.expect(TokenKind::Identifier, "as projection alias")?.text;
        Ok(ProjectedField::Computed {
            expr: Box::new(expr),
            alias,
        })
    }

    /// `( bool_expr )` or `( bool_expr ? operand : operand )` inside a
    /// projection.
    fn parse_grouped_field(&mut self) -> ParseResult<ExpressionNode> {
        self.advance(); // '('
        let condition = self.parse_or()?;

        if self.check(TokenKind::Question) {
            self.advance();
            let then = self.parse_operand()?;
            self.expect(TokenKind::Colon, "in ternary expression")?;
            let otherwise = self.parse_operand()?;
            self.expect(TokenKind::RParen, "to close ternary expression")?;
            return Ok(ExpressionNode::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }

        self.expect(TokenKind::RParen, "to close computed field")?;
        Ok(match condition {
            BoolExpr::Truthy(node) => *node,
            other => ExpressionNode::Predicate(Box::new(other)),
        })
    }

    // ------------------------------------------------------------------
    // Operands and parameters
    // ------------------------------------------------------------------

    fn parse_operand(&mut self) -> ParseResult<ExpressionNode> {
        match self.current().kind {
            kind if is_name(kind) => self.parse_chain(),
            TokenKind::ParamOpen => self.parse_parameter(),
            TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Boolean
            | TokenKind::Null => {
                let token = self.advance();
                Ok(ExpressionNode::Literal(literal_from(&token)?))
            }
            _ => Err(ParseError::new(
                format!("expected value, found {}", self.current()),
                self.current().offset,
            )),
        }
    }

    fn parse_parameter(&mut self) -> ParseResult<ExpressionNode> {
        let open = self.advance(); // '${'
        let name = self.expect(TokenKind::Identifier, "as runtime parameter name")?.text;

        if self.check(TokenKind::RBrace) {
            return Err(ParseError::new(
                format!(
                    "runtime parameter '{name}' requires a default value (write ${{{name}|default}})"
                ),
                open.offset,
            ));
        }
        self.expect(TokenKind::Pipe, "after runtime parameter name")?;

        let token = self.current().clone();
        let default = match token.kind {
            TokenKind::Integer
            | TokenKind::Float
            | TokenKind::String
            | TokenKind::Boolean
            | TokenKind::Null => literal_from(&token)?,
            // Bare words are taken as string defaults: ${Status|Open}
            kind if is_name(kind) => Literal::String(token.text.clone()),
            _ => {
                return Err(ParseError::new(
                    format!("runtime parameter '{name}' requires a default value"),
                    token.offset,
                ));
            }
        };
        self.advance();
        self.expect(TokenKind::RBrace, "to close runtime parameter")?;

        Ok(ExpressionNode::RuntimeParameter { name, default })
    }

    // ------------------------------------------------------------------
    // Boolean expressions
    // ------------------------------------------------------------------

    fn parse_or(&mut self) -> ParseResult<BoolExpr> {
        let mut left = self.parse_and()?;

        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = BoolExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<BoolExpr> {
        let mut left = self.parse_condition()?;

        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_condition()?;
            left = BoolExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_condition(&mut self) -> ParseResult<BoolExpr> {
        if self.check(TokenKind::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(TokenKind::RParen, "to close group")?;
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        let op_token = self.current().clone();

        let compare = match op_token.kind {
            TokenKind::Eq => Some(CompareOp::Equal),
            TokenKind::NotEq => Some(CompareOp::NotEqual),
            TokenKind::Gt => Some(CompareOp::GreaterThan),
            TokenKind::GtEq => Some(CompareOp::GreaterEqual),
            TokenKind::Lt => Some(CompareOp::LessThan),
            TokenKind::LtEq => Some(CompareOp::LessEqual),
            _ => None,
        };

        if let Some(op) = compare {
            self.advance();
            let next = self.current();
            if matches!(
                next.kind,
                TokenKind::Eq | TokenKind::Gt | TokenKind::Lt | TokenKind::GtEq | TokenKind::LtEq
            ) && next.offset == op_token.end()
            {
                return Err(ParseError::new(
                    format!("unrecognized filter operator '{}{}'", op_token.text, next.text),
                    op_token.offset,
                ));
            }
            let right = self.parse_operand()?;
            return Ok(BoolExpr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        if op_token.is(TokenKind::Identifier) {
            let Some(op) = TextOp::from_word(&op_token.text) else {
                return Err(ParseError::new(
                    format!("unrecognized filter operator '{}'", op_token.text),
                    op_token.offset,
                ));
            };
            self.advance();
            let right = self.parse_operand()?;
            return Ok(BoolExpr::Text {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        if matches!(
            op_token.kind,
            TokenKind::Integer | TokenKind::Float | TokenKind::String | TokenKind::Boolean
        ) {
            return Err(ParseError::new(
                format!("unrecognized filter operator before {}", op_token),
                op_token.offset,
            ));
        }

        Ok(quantifier_or_truthy(left))
    }
}

/// `Lines:any(...)` and `Lines:all(...)` in a condition become quantifiers.
fn quantifier_or_truthy(node: ExpressionNode) -> BoolExpr {
    match node {
        ExpressionNode::FunctionCall {
            target,
            function: Function::Any,
            arg,
        } => BoolExpr::Any {
            collection: target,
            predicate: match arg {
                Some(FunctionArg::Predicate(pred)) => Some(pred),
                _ => None,
            },
        },
        ExpressionNode::FunctionCall {
            target,
            function: Function::All,
            arg: Some(FunctionArg::Predicate(predicate)),
        } => BoolExpr::All {
            collection: target,
            predicate,
        },
        other => BoolExpr::Truthy(Box::new(other)),
    }
}

fn extend_navigation(expr: ExpressionNode, step: PropertyRef) -> ExpressionNode {
    match expr {
        ExpressionNode::Property(first) => ExpressionNode::Navigation {
            target: None,
            steps: vec![first, step],
        },
        ExpressionNode::Navigation { target, mut steps } => {
            steps.push(step);
            ExpressionNode::Navigation { target, steps }
        }
        other => ExpressionNode::Navigation {
            target: Some(Box::new(other)),
            steps: vec![step],
        },
    }
}

fn is_name(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier | TokenKind::As | TokenKind::Asc | TokenKind::Desc
    )
}

fn parse_integer(token: &Token) -> ParseResult<i64> {
    token
        .text
        .parse::<i64>()
        .map_err(|_| ParseError::new(format!("integer out of range: {}", token.text), token.offset))
}

fn literal_from(token: &Token) -> ParseResult<Literal> {
    match token.kind {
        TokenKind::Integer => parse_integer(token).map(Literal::Integer),
        TokenKind::Float => token
            .text
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| ParseError::new(format!("invalid number: {}", token.text), token.offset)),
        TokenKind::String => Ok(Literal::String(unquote(&token.text))),
        TokenKind::Boolean => Ok(Literal::Boolean(token.text == "true")),
        TokenKind::Null => Ok(Literal::Null),
        _ => Err(ParseError::new(
            format!("expected literal, found {}", token),
            token.offset,
        )),
    }
}

fn closes(opener: TokenKind, closer: TokenKind) -> bool {
    matches!(
        (opener, closer),
        (TokenKind::LParen, TokenKind::RParen)
            | (TokenKind::LBracket, TokenKind::RBracket)
            | (TokenKind::LBrace, TokenKind::RBrace)
            | (TokenKind::ParamOpen, TokenKind::RBrace)
    )
}

fn closer_for(opener: TokenKind) -> &'static str {
    match opener {
        TokenKind::LParen => ")",
        TokenKind::LBracket => "]",
        _ => "}",
    }
}

fn opener_for(closer: TokenKind) -> &'static str {
    match closer {
        TokenKind::RParen => "(",
        TokenKind::RBracket => "[",
        _ => "{",
    }
}
