use crate::ast::{BoolExpr, Function};

/// Literal operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Null,
}

/// One step of a navigation chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRef {
    /// Exposed field name (an alias when the field declares one)
    pub name: String,
    /// `true` for `?.Name`: a null input yields null instead of faulting
    pub null_safe: bool,
}

impl PropertyRef {
    pub fn new(name: impl Into<String>) -> Self {
        PropertyRef {
            name: name.into(),
            null_safe: false,
        }
    }

    pub fn null_safe(name: impl Into<String>) -> Self {
        PropertyRef {
            name: name.into(),
            null_safe: true,
        }
    }
}

/// Argument of a function call.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    /// Value argument, evaluated per element for aggregates
    ///
    /// # Examples
    /// ```text
    /// Orders:sum(Total)
    /// Name:substring(2)
    /// ```
    Value(Box<ExpressionNode>),

    /// Predicate argument for quantifiers
    ///
    /// # Examples
    /// ```text
    /// Orders:any(Total > 100)
    /// ```
    Predicate(Box<BoolExpr>),
}

/// Which end of an ordered collection a single-element indexer selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleIndex {
    /// `[0 ...]`
    First,
    /// `[-1 ...]`
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexMode {
    /// One element after ordering, or null when empty
    Single(SingleIndex),

    /// A page after ordering. Slots are integer literals or runtime
    /// parameters.
    ///
    /// # Examples
    /// ```text
    /// Orders[1 2 asc Total]              // skip 1, take 2
    /// Users[${Skip|0} ${Take|10} asc Email]
    /// ```
    Range {
        skip: Option<Box<ExpressionNode>>,
        take: Option<Box<ExpressionNode>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

/// `asc Path` / `desc Path` inside an indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    pub direction: OrderDirection,
    pub by: Box<ExpressionNode>,
}

/// Member of a projection.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedField {
    /// Direct field read kept under its own name
    Plain(String),

    /// Sub-expression bound to an alias
    ///
    /// # Examples
    /// ```text
    /// (Name:upper) as UpperName
    /// Orders:count as OrderCount
    /// ```
    Computed {
        expr: Box<ExpressionNode>,
        alias: String,
    },
}

impl ProjectedField {
    /// Name the field is reachable under in the projected record.
    pub fn output_name(&self) -> &str {
        match self {
            ProjectedField::Plain(name) => name,
            ProjectedField::Computed { alias, .. } => alias,
        }
    }
}

/// Abstract syntax tree of a navigation/query expression.
///
/// Nodes are immutable once parsed. Parsing is a pure function of the
/// expression text, so equal texts always give equal trees.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionNode {
    /// Single field access
    ///
    /// # Examples
    /// ```text
    /// Name
    /// ```
    Property(PropertyRef),

    /// Dotted chain. `target` is set when the chain continues after a
    /// filter, indexer or function.
    ///
    /// # Examples
    /// ```text
    /// Customer.Address.City
    /// Customer?.Address?.City
    /// Orders[0 desc CreatedAt].Total
    /// ```
    Navigation {
        target: Option<Box<ExpressionNode>>,
        steps: Vec<PropertyRef>,
    },

    /// Function applied to the value of `target`
    ///
    /// # Examples
    /// ```text
    /// Orders:count
    /// Orders:sum(Total)
    /// Name:upper
    /// ```
    FunctionCall {
        target: Box<ExpressionNode>,
        function: Function,
        arg: Option<FunctionArg>,
    },

    /// Keeps the elements of a collection matching a predicate
    ///
    /// # Examples
    /// ```text
    /// Orders(Status = 'Open' && Total > 100)
    /// ```
    Filter {
        target: Box<ExpressionNode>,
        predicate: Box<BoolExpr>,
    },

    /// Orders a collection, then selects one element or a page
    Indexer {
        target: Box<ExpressionNode>,
        mode: IndexMode,
        ordering: Option<Ordering>,
    },

    /// Builds a new record from the target. `target` is `None` for a root
    /// projection such as `{Id, Name}`.
    Projection {
        target: Option<Box<ExpressionNode>>,
        fields: Vec<ProjectedField>,
    },

    /// `${name|default}` substituted from caller parameters at build time
    RuntimeParameter { name: String, default: Literal },

    /// Constant operand
    Literal(Literal),

    /// Boolean computed value, such as `(Total > 10) as IsBig`
    Predicate(Box<BoolExpr>),

    /// `cond ? then : otherwise`, only inside projections
    Conditional {
        condition: Box<BoolExpr>,
        then: Box<ExpressionNode>,
        otherwise: Box<ExpressionNode>,
    },
}

impl ExpressionNode {
    /// Names of every runtime parameter referenced by the tree.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_parameters(&mut names);
        names.sort();
        names.dedup();
        names
    }

    pub(crate) fn collect_parameters(&self, names: &mut Vec<String>) {
        match self {
            ExpressionNode::RuntimeParameter { name, .. } => names.push(name.clone()),
            ExpressionNode::Property(_) | ExpressionNode::Literal(_) => {}
            ExpressionNode::Navigation { target, .. } => {
                if let Some(target) = target {
                    target.collect_parameters(names);
                }
            }
            ExpressionNode::FunctionCall { target, arg, .. } => {
                target.collect_parameters(names);
                match arg {
                    Some(FunctionArg::Value(node)) => node.collect_parameters(names),
                    Some(FunctionArg::Predicate(pred)) => pred.collect_parameters(names),
                    None => {}
                }
            }
            ExpressionNode::Filter { target, predicate } => {
                target.collect_parameters(names);
                predicate.collect_parameters(names);
            }
            ExpressionNode::Indexer {
                target,
                mode,
                ordering,
            } => {
                target.collect_parameters(names);
                if let IndexMode::Range { skip, take } = mode {
                    for slot in [skip, take].into_iter().flatten() {
                        slot.collect_parameters(names);
                    }
                }
                if let Some(ordering) = ordering {
                    ordering.by.collect_parameters(names);
                }
            }
            ExpressionNode::Projection { target, fields } => {
                if let Some(target) = target {
                    target.collect_parameters(names);
                }
                for field in fields {
                    if let ProjectedField::Computed { expr, .. } = field {
                        expr.collect_parameters(names);
                    }
                }
            }
            ExpressionNode::Predicate(pred) => pred.collect_parameters(names),
            ExpressionNode::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.collect_parameters(names);
                then.collect_parameters(names);
                otherwise.collect_parameters(names);
            }
        }
    }
}
