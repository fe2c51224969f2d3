// tests/parser_tests.rs

use fieldlink::ast::*;
use fieldlink::parser::{ParseError, parse};
use proptest::prelude::*;

fn parse_err(input: &str) -> ParseError {
    match parse(input) {
        Ok(ast) => panic!("expected parse error for {input:?}, got {ast:?}"),
        Err(e) => e,
    }
}

fn prop(name: &str) -> ExpressionNode {
    ExpressionNode::Property(PropertyRef::new(name))
}

fn int(value: i64) -> ExpressionNode {
    ExpressionNode::Literal(Literal::Integer(value))
}

// ============================================================================
// Navigation
// ============================================================================

#[test]
fn test_single_property() {
    assert_eq!(parse("Name").unwrap(), prop("Name"));
}

#[test]
fn test_dotted_navigation() {
    let ast = parse("Customer.Address.City").unwrap();
    assert_eq!(
        ast,
        ExpressionNode::Navigation {
            target: None,
            steps: vec![
                PropertyRef::new("Customer"),
                PropertyRef::new("Address"),
                PropertyRef::new("City"),
            ],
        }
    );
}

#[test]
fn test_null_safe_navigation() {
    match parse("Customer?.Address?.City").unwrap() {
        ExpressionNode::Navigation { target: None, steps } => {
            let flags: Vec<bool> = steps.iter().map(|s| s.null_safe).collect();
            assert_eq!(flags, vec![false, true, true]);
        }
        other => panic!("Expected Navigation, got {:?}", other),
    }
}

#[test]
fn test_keywords_as_property_names() {
    assert_eq!(parse("desc").unwrap(), prop("desc"));
    assert_eq!(
        parse("Meta.as?.asc").unwrap(),
        ExpressionNode::Navigation {
            target: None,
            steps: vec![
                PropertyRef::new("Meta"),
                PropertyRef::new("as"),
                PropertyRef::null_safe("asc"),
            ],
        }
    );
    assert_eq!(
        parse("Orders[0 asc desc]").unwrap(),
        ExpressionNode::Indexer {
            target: Box::new(prop("Orders")),
            mode: IndexMode::Single(SingleIndex::First),
            ordering: Some(Ordering {
                direction: OrderDirection::Asc,
                by: Box::new(prop("desc")),
            }),
        }
    );
    match parse("{asc, desc}").unwrap() {
        ExpressionNode::Projection { fields, .. } => assert_eq!(
            fields,
            vec![
                ProjectedField::Plain("asc".to_string()),
                ProjectedField::Plain("desc".to_string()),
            ]
        ),
        other => panic!("Expected Projection, got {:?}", other),
    }
}

// ============================================================================
// Indexers
// ============================================================================

#[test]
fn test_indexer_first() {
    let ast = parse("Orders[0 asc CreatedAt]").unwrap();
    assert_eq!(
        ast,
        ExpressionNode::Indexer {
            target: Box::new(prop("Orders")),
            mode: IndexMode::Single(SingleIndex::First),
            ordering: Some(Ordering {
                direction: OrderDirection::Asc,
                by: Box::new(prop("CreatedAt")),
            }),
        }
    );
}

#[test]
fn test_indexer_last_then_navigation() {
    match parse("Orders[-1 desc CreatedAt].Total").unwrap() {
        ExpressionNode::Navigation {
            target: Some(target),
            steps,
        } => {
            assert_eq!(steps, vec![PropertyRef::new("Total")]);
            assert!(matches!(
                *target,
                ExpressionNode::Indexer {
                    mode: IndexMode::Single(SingleIndex::Last),
                    ordering: Some(Ordering {
                        direction: OrderDirection::Desc,
                        ..
                    }),
                    ..
                }
            ));
        }
        other => panic!("Expected Navigation over Indexer, got {:?}", other),
    }
}

#[test]
fn test_indexer_range() {
    match parse("Orders[1 2 asc Total]").unwrap() {
        ExpressionNode::Indexer {
            mode: IndexMode::Range { skip, take },
            ..
        } => {
            assert_eq!(skip.as_deref(), Some(&int(1)));
            assert_eq!(take.as_deref(), Some(&int(2)));
        }
        other => panic!("Expected range Indexer, got {:?}", other),
    }
}

#[test]
fn test_indexer_with_runtime_parameters() {
    let ast = parse("Users[${Skip|0} ${Take|10} asc Email]").unwrap();
    assert_eq!(ast.parameter_names(), vec!["Skip".to_string(), "Take".to_string()]);

    match ast {
        ExpressionNode::Indexer {
            mode: IndexMode::Range { take: Some(take), .. },
            ..
        } => assert_eq!(
            *take,
            ExpressionNode::RuntimeParameter {
                name: "Take".to_string(),
                default: Literal::Integer(10),
            }
        ),
        other => panic!("Expected range Indexer, got {:?}", other),
    }
}

// ============================================================================
// Filters and Functions
// ============================================================================

#[test]
fn test_filter_precedence() {
    match parse("Orders(Status = 'Open' && Total > 100 || Paid)").unwrap() {
        ExpressionNode::Filter { predicate, .. } => match *predicate {
            BoolExpr::Or(left, right) => {
                assert!(matches!(*left, BoolExpr::And(_, _)));
                assert_eq!(*right, BoolExpr::Truthy(Box::new(prop("Paid"))));
            }
            other => panic!("Expected Or, got {:?}", other),
        },
        other => panic!("Expected Filter, got {:?}", other),
    }
}

#[test]
fn test_text_operator_in_filter() {
    match parse("Users(Email endswith '@example.com')").unwrap() {
        ExpressionNode::Filter { predicate, .. } => assert_eq!(
            *predicate,
            BoolExpr::Text {
                left: Box::new(prop("Email")),
                op: TextOp::EndsWith,
                right: Box::new(ExpressionNode::Literal(Literal::String(
                    "@example.com".to_string()
                ))),
            }
        ),
        other => panic!("Expected Filter, got {:?}", other),
    }
}

#[test]
fn test_quantifier_in_filter() {
    match parse("Customers(Orders:any(Total > 100))").unwrap() {
        ExpressionNode::Filter { predicate, .. } => match *predicate {
            BoolExpr::Any {
                collection,
                predicate: Some(inner),
            } => {
                assert_eq!(*collection, prop("Orders"));
                assert!(matches!(*inner, BoolExpr::Compare { op: CompareOp::GreaterThan, .. }));
            }
            other => panic!("Expected Any, got {:?}", other),
        },
        other => panic!("Expected Filter, got {:?}", other),
    }

    match parse("Customers(Orders:any)").unwrap() {
        ExpressionNode::Filter { predicate, .. } => {
            assert!(matches!(*predicate, BoolExpr::Any { predicate: None, .. }));
        }
        other => panic!("Expected Filter, got {:?}", other),
    }
}

#[test]
fn test_functions() {
    assert_eq!(
        parse("Orders:count").unwrap(),
        ExpressionNode::FunctionCall {
            target: Box::new(prop("Orders")),
            function: Function::Count,
            arg: None,
        }
    );

    assert_eq!(
        parse("Name:substring(2)").unwrap(),
        ExpressionNode::FunctionCall {
            target: Box::new(prop("Name")),
            function: Function::Substring,
            arg: Some(FunctionArg::Value(Box::new(int(2)))),
        }
    );

    match parse("Orders:sum(Total)").unwrap() {
        ExpressionNode::FunctionCall {
            function: Function::Sum,
            arg: Some(FunctionArg::Value(arg)),
            ..
        } => assert_eq!(*arg, prop("Total")),
        other => panic!("Expected sum call, got {:?}", other),
    }
}

#[test]
fn test_parameter_with_bare_word_default() {
    match parse("Orders(Status = ${Status|Open})").unwrap() {
        ExpressionNode::Filter { predicate, .. } => match *predicate {
            BoolExpr::Compare { right, .. } => assert_eq!(
                *right,
                ExpressionNode::RuntimeParameter {
                    name: "Status".to_string(),
                    default: Literal::String("Open".to_string()),
                }
            ),
            other => panic!("Expected Compare, got {:?}", other),
        },
        other => panic!("Expected Filter, got {:?}", other),
    }
}

// ============================================================================
// Projections
// ============================================================================

#[test]
fn test_root_projection() {
    assert_eq!(
        parse("{Id, Name}").unwrap(),
        ExpressionNode::Projection {
            target: None,
            fields: vec![
                ProjectedField::Plain("Id".to_string()),
                ProjectedField::Plain("Name".to_string()),
            ],
        }
    );
}

#[test]
fn test_projection_with_aliases() {
    match parse("Customer.{Id, (Name:upper) as UpperName, Orders:count as OrderCount}").unwrap() {
        ExpressionNode::Projection {
            target: Some(target),
            fields,
        } => {
            assert_eq!(*target, prop("Customer"));
            let names: Vec<&str> = fields.iter().map(|f| f.output_name()).collect();
            assert_eq!(names, vec!["Id", "UpperName", "OrderCount"]);
            assert!(matches!(
                &fields[1],
                ProjectedField::Computed { expr, .. }
                    if matches!(**expr, ExpressionNode::FunctionCall { function: Function::Upper, .. })
            ));
        }
        other => panic!("Expected Projection, got {:?}", other),
    }
}

#[test]
fn test_projection_ternary() {
    match parse("{Id, (Total > 100 ? 'big' : 'small') as Size}").unwrap() {
        ExpressionNode::Projection { fields, .. } => match &fields[1] {
            ProjectedField::Computed { expr, alias } => {
                assert_eq!(alias, "Size");
                assert!(matches!(**expr, ExpressionNode::Conditional { .. }));
            }
            other => panic!("Expected computed field, got {:?}", other),
        },
        other => panic!("Expected Projection, got {:?}", other),
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_positions() {
    let test_cases = vec![
        ("Orders[0 asc CreatedAt", "unclosed '[' (missing ']')", 6),
        (
            "Orders(Status = 'Open']",
            "expected ')' to close '(' at position 6, found ']'",
            22,
        ),
        ("Name)", "unexpected ')' without matching '('", 4),
        ("Orders:frobnicate", "unknown function 'frobnicate'", 7),
        ("Name:substring", "function 'substring' requires an argument", 5),
        ("Name:upper()", "function 'upper' takes no argument", 10),
        ("Orders[]", "indexer requires an index or a skip/take pair", 6),
        ("{}", "projection has no fields", 0),
        ("{Id, Id}", "duplicate projection field 'Id'", 5),
        (
            "Customer.{Name:upper}",
            "computed projection field requires an 'as' alias",
            10,
        ),
        (
            "{(Total > 10 ? 'big' : 'small')}",
            "ternary expression in projection requires an 'as' alias",
            1,
        ),
        ("Orders(Total >> 5)", "unrecognized filter operator '>>'", 13),
        ("Orders(Total <> 5)", "unrecognized filter operator '<>'", 13),
        ("Orders(Status like 'x')", "unrecognized filter operator 'like'", 14),
        ("Orders[0]Total", "missing '.' before 'Total' after indexer", 9),
        ("Orders(Total > 1)Total", "missing '.' before 'Total' after filter", 17),
        ("Customer{Id}", "missing '.' before projection '{'", 8),
        ("Flag ? 'a' : 'b'", "ternary expression is only allowed inside a projection", 5),
        ("Name #", "unexpected character '#'", 5),
        ("Orders(Name = 'abc)", "unterminated string literal", 14),
    ];

    for (input, message, position) in test_cases {
        let err = parse_err(input);
        assert_eq!(err.message, message, "input: {input}");
        assert_eq!(err.position, position, "input: {input}");
    }
}

#[test]
fn test_parameter_without_default() {
    let err = parse_err("Users[${Take} asc Email]");
    assert!(err.message.contains("requires a default value"), "{}", err.message);
    assert_eq!(err.position, 6);
}

#[test]
fn test_float_index_rejected() {
    let err = parse_err("Orders[1.5]");
    assert!(err.message.starts_with("indexer positions must be integers"));
    assert_eq!(err.position, 7);
}

#[test]
fn test_error_display_includes_position() {
    let err = parse_err("Name)");
    assert_eq!(
        err.to_string(),
        "unexpected ')' without matching '(' at position 4"
    );
}

// ============================================================================
// Properties
// ============================================================================

const VALID: &[&str] = &[
    "Name",
    "Customer.Address.City",
    "Customer?.Address?.City",
    "Orders[0 desc CreatedAt].Total",
    "Orders(Status = 'Open')[1 2 asc Total]",
    "Orders:sum(Total)",
    "Customers(Orders:any(Total > 100))",
    "Customer.{Id, (Name:upper) as UpperName}",
    "{Id, (Total > 100 ? 'big' : 'small') as Size}",
    "Users[${Skip|0} ${Take|10} asc Email]",
];

proptest! {
    #[test]
    fn test_parse_is_deterministic(input in ".{0,48}") {
        prop_assert_eq!(parse(&input), parse(&input));
    }

    #[test]
    fn test_valid_expressions_parse(input in prop::sample::select(VALID)) {
        prop_assert!(parse(input).is_ok());
    }

    #[test]
    fn test_unbalanced_suffix_is_rejected(
        input in prop::sample::select(VALID),
        suffix in prop::sample::select(vec![")", "]", "}", "(", "[", "{"]),
    ) {
        let broken = format!("{input}{suffix}");
        prop_assert!(parse(&broken).is_err(), "accepted {}", broken);
    }
}
