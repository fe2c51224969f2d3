// tests/lexer_tests.rs

use fieldlink::ast::TokenKind;
use fieldlink::lexer::{tokenize, unquote};
use proptest::prelude::*;

fn kinds(input: &str) -> Vec<TokenKind> {
    tokenize(input).into_iter().map(|t| t.kind).collect()
}

// ============================================================================
// Single Character Tokens
// ============================================================================

#[test]
fn test_single_char_tokens() {
    let test_cases = vec![
        (".", TokenKind::Dot),
        (",", TokenKind::Comma),
        (":", TokenKind::Colon),
        ("(", TokenKind::LParen),
        (")", TokenKind::RParen),
        ("[", TokenKind::LBracket),
        ("]", TokenKind::RBracket),
        ("{", TokenKind::LBrace),
        ("}", TokenKind::RBrace),
        ("?", TokenKind::Question),
        ("|", TokenKind::Pipe),
        ("=", TokenKind::Eq),
        (">", TokenKind::Gt),
        ("<", TokenKind::Lt),
    ];

    for (input, expected) in test_cases {
        let tokens = tokenize(input);
        assert_eq!(tokens[0].kind, expected, "input: {input}");
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[0].text, input);
        assert_eq!(tokens[1].kind, TokenKind::Eof);
    }
}

// ============================================================================
// Two Character Tokens
// ============================================================================

#[test]
fn test_two_char_tokens() {
    let test_cases = vec![
        ("?.", TokenKind::NullSafeDot),
        ("${", TokenKind::ParamOpen),
        ("==", TokenKind::Eq),
        ("!=", TokenKind::NotEq),
        (">=", TokenKind::GtEq),
        ("<=", TokenKind::LtEq),
        ("&&", TokenKind::And),
        ("||", TokenKind::Or),
    ];

    for (input, expected) in test_cases {
        assert_eq!(kinds(input), vec![expected, TokenKind::Eof], "input: {input}");
    }
}

// ============================================================================
// Offsets
// ============================================================================

#[test]
fn test_offsets_of_indexer() {
    let tokens = tokenize("Orders[0 desc CreatedAt]");
    let summary: Vec<(TokenKind, &str, usize)> = tokens
        .iter()
        .map(|t| (t.kind, t.text.as_str(), t.offset))
        .collect();

    assert_eq!(
        summary,
        vec![
            (TokenKind::Identifier, "Orders", 0),
            (TokenKind::LBracket, "[", 6),
            (TokenKind::Integer, "0", 7),
            (TokenKind::Desc, "desc", 9),
            (TokenKind::Identifier, "CreatedAt", 14),
            (TokenKind::RBracket, "]", 23),
            (TokenKind::Eof, "", 24),
        ]
    );
}

#[test]
fn test_token_end_is_adjacent_offset() {
    let tokens = tokenize("Name:upper");
    assert_eq!(tokens[0].end(), tokens[1].offset);
    assert_eq!(tokens[1].end(), tokens[2].offset);

    let tokens = tokenize("A ? B : C");
    assert_ne!(tokens[3].end(), tokens[4].offset);
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_numbers() {
    let tokens = tokenize("42 -1 3.5");
    assert_eq!(tokens[0].kind, TokenKind::Integer);
    assert_eq!(tokens[0].text, "42");
    assert_eq!(tokens[1].kind, TokenKind::Integer);
    assert_eq!(tokens[1].text, "-1");
    assert_eq!(tokens[2].kind, TokenKind::Float);
    assert_eq!(tokens[2].text, "3.5");
}

#[test]
fn test_string_with_doubled_quote() {
    let tokens = tokenize("'O''Brien'");
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].text, "'O''Brien'");
    assert_eq!(unquote(&tokens[0].text), "O'Brien");
    assert_eq!(tokens[1].kind, TokenKind::Eof);
}

#[test]
fn test_unterminated_string_is_unknown() {
    let tokens = tokenize("Name = 'abc");
    assert_eq!(tokens[2].kind, TokenKind::Unknown);
    assert_eq!(tokens[2].offset, 7);
    assert_eq!(tokens[2].text, "'abc");
    assert_eq!(tokens[3].kind, TokenKind::Eof);
}

#[test]
fn test_keywords_are_exact_words() {
    assert_eq!(kinds("ascending"), vec![TokenKind::Identifier, TokenKind::Eof]);
    assert_eq!(kinds("Asc"), vec![TokenKind::Identifier, TokenKind::Eof]);
    assert_eq!(kinds("desc"), vec![TokenKind::Desc, TokenKind::Eof]);
}

// ============================================================================
// Runtime Parameters and Unknown Input
// ============================================================================

#[test]
fn test_runtime_parameter() {
    assert_eq!(
        kinds("${Take|10}"),
        vec![
            TokenKind::ParamOpen,
            TokenKind::Identifier,
            TokenKind::Pipe,
            TokenKind::Integer,
            TokenKind::RBrace,
            TokenKind::Eof,
        ]
    );
}

#[test]
fn test_unknown_characters() {
    for input in ["$x", "&", "!", "#", "@"] {
        assert_eq!(tokenize(input)[0].kind, TokenKind::Unknown, "input: {input}");
    }
}

proptest! {
    #[test]
    fn test_tokenize_is_total(input in ".{0,64}") {
        let tokens = tokenize(&input);
        prop_assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        for token in &tokens {
            prop_assert!(token.end() <= input.len());
        }
    }
}
