use crate::ast::ExpressionNode;

/// Comparison operators usable in filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal (`=` or `==`)
    Equal,
    /// Not equal (`!=`)
    NotEqual,
    /// Greater than (`>`)
    GreaterThan,
    /// Greater than or equal (`>=`)
    GreaterEqual,
    /// Less than (`<`)
    LessThan,
    /// Less than or equal (`<=`)
    LessEqual,
}

/// Word operators over strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    StartsWith,
    EndsWith,
    Contains,
    /// Regular expression match
    Matches,
}

impl TextOp {
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "startswith" => Some(TextOp::StartsWith),
            "endswith" => Some(TextOp::EndsWith),
            "contains" => Some(TextOp::Contains),
            "matches" => Some(TextOp::Matches),
            _ => None,
        }
    }
}

/// Boolean expression of a filter, quantifier or ternary condition.
///
/// # Examples
/// ```text
/// Total > 100
/// Email endswith '@example.com'
/// Lines:any(Quantity > 2)
/// Status = 'Open' || (Total >= 10 && Paid)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Compare {
        left: Box<ExpressionNode>,
        op: CompareOp,
        right: Box<ExpressionNode>,
    },
    Text {
        left: Box<ExpressionNode>,
        op: TextOp,
        right: Box<ExpressionNode>,
    },
    /// Existential quantifier. Without a predicate it tests non-emptiness.
    Any {
        collection: Box<ExpressionNode>,
        predicate: Option<Box<BoolExpr>>,
    },
    /// Universal quantifier
    All {
        collection: Box<ExpressionNode>,
        predicate: Box<BoolExpr>,
    },
    And(Box<BoolExpr>, Box<BoolExpr>),
    Or(Box<BoolExpr>, Box<BoolExpr>),
    /// A bare operand used as a condition
    Truthy(Box<ExpressionNode>),
}

impl BoolExpr {
    pub(crate) fn collect_parameters(&self, names: &mut Vec<String>) {
        match self {
            BoolExpr::Compare { left, right, .. } | BoolExpr::Text { left, right, .. } => {
                left.collect_parameters(names);
                right.collect_parameters(names);
            }
            BoolExpr::Any {
                collection,
                predicate,
            } => {
                collection.collect_parameters(names);
                if let Some(predicate) = predicate {
                    predicate.collect_parameters(names);
                }
            }
            BoolExpr::All {
                collection,
                predicate,
            } => {
                collection.collect_parameters(names);
                predicate.collect_parameters(names);
            }
            BoolExpr::And(l, r) | BoolExpr::Or(l, r) => {
                l.collect_parameters(names);
                r.collect_parameters(names);
            }
            BoolExpr::Truthy(node) => node.collect_parameters(names),
        }
    }
}
