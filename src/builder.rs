//! Compiles parsed expressions against a concrete record type.
//!
//! Every node becomes a closure over the value it is applied to. Closures
//! compose: a navigation wraps its target, a filter wraps its collection and
//! so on, so the compiled tree runs without looking at the AST again.

use std::{collections::HashMap, fmt, sync::Arc};

use regex::Regex;
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use tracing::warn;

use crate::{
    Value,
    accessor::{AccessorError, TypeAccessorCache, TypeAccessors},
    ast::{
        BoolExpr, CompareOp, ExpressionNode, Function, FunctionArg, IndexMode, Literal,
        OrderDirection, Ordering, ProjectedField, PropertyRef, SingleIndex, TextOp,
    },
    config::{EngineConfig, PartialRangePolicy},
    engine::RuntimeParameters,
    parser::ParseError,
    schema::{FieldDescriptor, TypeDescriptor, TypeRegistry, ValueType},
};

/// Errors raised while running a compiled expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// A non-null-safe step was applied to null
    #[error("cannot read '{property}' from null (use '?.' for null-safe navigation)")]
    NullNavigation { property: String },

    /// Type mismatch or invalid operation for the given value
    #[error("type error: {0}")]
    TypeError(String),
}

/// Errors raised while compiling an expression against a type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuildError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("type '{type_name}' has no property '{property}'")]
    UnknownProperty { type_name: String, property: String },

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{function}': {message}")]
    ArgumentMismatch { function: String, message: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid value for parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("indexer needs both skip and take to page")]
    PartialRange,

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Accessor(AccessorError),
}

impl From<AccessorError> for BuildError {
    fn from(err: AccessorError) -> Self {
        match err {
            AccessorError::UnknownType(name) => BuildError::UnknownType(name),
            AccessorError::NotFound { type_name, name } => BuildError::UnknownProperty {
                type_name,
                property: name,
            },
            other => BuildError::Accessor(other),
        }
    }
}

type EvalFn = Arc<dyn Fn(&Value) -> Result<Value, EvalError> + Send + Sync>;
type PredicateFn = Arc<dyn Fn(&Value) -> Result<bool, EvalError> + Send + Sync>;
type Getter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// A compiled expression and the type of what it produces.
#[derive(Clone)]
pub struct CompiledExpression {
    eval: EvalFn,
    pub result_type: ValueType,
}

impl CompiledExpression {
    fn new(
        result_type: ValueType,
        eval: impl Fn(&Value) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> Self {
        CompiledExpression {
            eval: Arc::new(eval),
            result_type,
        }
    }

    fn constant(value: Value) -> Self {
        let result_type = type_of(&value);
        CompiledExpression::new(result_type, move |_| Ok(value.clone()))
    }

    /// Runs the expression over one record.
    pub fn evaluate(&self, input: &Value) -> Result<Value, EvalError> {
        (self.eval)(input)
    }

    pub fn result_type(&self) -> &ValueType {
        &self.result_type
    }
}

impl fmt::Debug for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledExpression")
            .field("result_type", &self.result_type)
            .finish_non_exhaustive()
    }
}

/// What the builder knows while compiling one node.
///
/// Descending into a collection creates a new context for the element type
/// instead of mutating this one.
pub struct ExpressionBuildContext<'a> {
    current_type: ValueType,
    registry: &'a TypeRegistry,
    accessors: &'a TypeAccessorCache,
    parameters: &'a RuntimeParameters,
    config: &'a EngineConfig,
}

/// Compiles `ast` against the context's target type.
pub fn build(
    ast: &ExpressionNode,
    ctx: &ExpressionBuildContext<'_>,
) -> Result<CompiledExpression, BuildError> {
    ctx.build(ast)
}

impl<'a> ExpressionBuildContext<'a> {
    pub fn new(
        target_type: ValueType,
        registry: &'a TypeRegistry,
        accessors: &'a TypeAccessorCache,
        parameters: &'a RuntimeParameters,
        config: &'a EngineConfig,
    ) -> Self {
        ExpressionBuildContext {
            current_type: target_type,
            registry,
            accessors,
            parameters,
            config,
        }
    }

    pub fn current_type(&self) -> &ValueType {
        &self.current_type
    }

    fn descend(&self, element_type: ValueType) -> ExpressionBuildContext<'a> {
        ExpressionBuildContext {
            current_type: element_type,
            registry: self.registry,
            accessors: self.accessors,
            parameters: self.parameters,
            config: self.config,
        }
    }

    pub fn build(&self, node: &ExpressionNode) -> Result<CompiledExpression, BuildError> {
        match node {
            ExpressionNode::Property(step) => {
                self.build_navigation(None, std::slice::from_ref(step))
            }
            ExpressionNode::Navigation { target, steps } => {
                self.build_navigation(target.as_deref(), steps)
            }
            ExpressionNode::FunctionCall {
                target,
                function,
                arg,
            } => self.build_function(target, *function, arg.as_ref()),
            ExpressionNode::Filter { target, predicate } => self.build_filter(target, predicate),
            ExpressionNode::Indexer {
                target,
                mode,
                ordering,
            } => self.build_indexer(target, mode, ordering.as_ref()),
            ExpressionNode::Projection { target, fields } => {
                self.build_projection(target.as_deref(), fields)
            }
            ExpressionNode::RuntimeParameter { name, default } => Ok(CompiledExpression::constant(
                self.parameter_value(name, default),
            )),
            ExpressionNode::Literal(literal) => {
                Ok(CompiledExpression::constant(literal_value(literal)))
            }
            ExpressionNode::Predicate(predicate) => {
                let predicate = self.build_predicate(predicate)?;
                Ok(CompiledExpression::new(ValueType::Boolean, move |input| {
                    predicate(input).map(Value::Boolean)
                }))
            }
            ExpressionNode::Conditional {
                condition,
                then,
                otherwise,
            } => self.build_conditional(condition, then, otherwise),
        }
    }

    fn identity(&self) -> CompiledExpression {
        CompiledExpression::new(self.current_type.clone(), |input| Ok(input.clone()))
    }

    fn table_for(&self, value_type: &ValueType) -> Result<Arc<TypeAccessors>, BuildError> {
        match value_type {
            ValueType::Entity(name) if !self.registry.contains(name) => {
                Err(BuildError::UnknownType(name.clone()))
            }
            ValueType::Entity(name) => Ok(self.accessors.table(name)?),
            ValueType::Record(descriptor) => Ok(Arc::new(TypeAccessors::build(descriptor)?)),
            other => Err(BuildError::TypeMismatch(format!(
                "{other} has no properties"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    fn build_navigation(
        &self,
        target: Option<&ExpressionNode>,
        steps: &[PropertyRef],
    ) -> Result<CompiledExpression, BuildError> {
        let mut compiled = match target {
            Some(target) => self.build(target)?,
            None => self.identity(),
        };

        for step in steps {
            let (getter, result_type) = self.resolve_step(&compiled.result_type, &step.name)?;
            let source = compiled.eval;
            let property = step.name.clone();
            let null_safe = step.null_safe;
            compiled = CompiledExpression::new(result_type, move |input| {
                let value = source(input)?;
                read_step(&value, &property, null_safe, &getter)
            });
        }
        Ok(compiled)
    }

    /// Getter and static type for reading `name` from a value of
    /// `input_type`. Reading through a list maps over its elements.
    fn resolve_step(
        &self,
        input_type: &ValueType,
        name: &str,
    ) -> Result<(Getter, ValueType), BuildError> {
        match input_type {
            ValueType::List(element) => {
                let (getter, element_type) = self.resolve_step(element, name)?;
                let result_type = match element_type {
                    list @ ValueType::List(_) => list,
                    other => ValueType::list_of(other),
                };
                Ok((getter, result_type))
            }
            ValueType::Any => {
                let key = name.to_string();
                let getter: Getter =
                    Arc::new(move |record| record.get(&key).cloned().unwrap_or(Value::Null));
                Ok((getter, ValueType::Any))
            }
            ValueType::Entity(_) | ValueType::Record(_) => {
                let accessor = self.table_for(input_type)?.get(name)?;
                let result_type = accessor.value_type().clone();
                let getter: Getter = Arc::new(move |record| accessor.get(record));
                Ok((getter, result_type))
            }
            scalar => Err(BuildError::TypeMismatch(format!(
                "cannot read property '{name}' from {scalar}"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn build_function(
        &self,
        target: &ExpressionNode,
        function: Function,
        arg: Option<&FunctionArg>,
    ) -> Result<CompiledExpression, BuildError> {
        let source = self.build(target)?;
        let spec = function.arg_spec();

        if arg.is_none() && spec.is_required() {
            return Err(argument_mismatch(function, "an argument is required"));
        }
        match arg {
            Some(_) if !spec.accepts_arg() => {
                return Err(argument_mismatch(function, "takes no argument"));
            }
            Some(FunctionArg::Value(_)) if spec.is_predicate() => {
                return Err(argument_mismatch(function, "expects a predicate"));
            }
            Some(FunctionArg::Predicate(_)) if !spec.is_predicate() => {
                return Err(argument_mismatch(function, "expects a value"));
            }
            _ => {}
        }
        let value_arg = match arg {
            Some(FunctionArg::Value(node)) => Some(node.as_ref()),
            _ => None,
        };
        let predicate_arg = match arg {
            Some(FunctionArg::Predicate(pred)) => Some(pred.as_ref()),
            _ => None,
        };

        match function {
            Function::Count => {
                element_of(&source.result_type, "count")?;
                Ok(then(source, ValueType::Integer, |value| match value {
                    Value::Array(items) => Ok(Value::Integer(items.len() as i64)),
                    Value::Null => Ok(Value::Integer(0)),
                    other => Err(requires("count", "a collection", &other)),
                }))
            }
            Function::Length => {
                if !(source.result_type.is_list() || source.result_type.is_textual()) {
                    return Err(BuildError::TypeMismatch(format!(
                        "length requires a collection or string, found {}",
                        source.result_type
                    )));
                }
                Ok(then(source, ValueType::Integer, |value| match value {
                    Value::Array(items) => Ok(Value::Integer(items.len() as i64)),
                    Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
                    Value::Null => Ok(Value::Null),
                    other => Err(requires("length", "a collection or string", &other)),
                }))
            }
            Function::Sum | Function::Avg | Function::Min | Function::Max => {
                self.build_aggregate(source, function, value_arg)
            }
            Function::First | Function::Last => {
                let element = element_of(&source.result_type, function.name())?;
                let last = function == Function::Last;
                Ok(then(source, element, move |value| match value {
                    Value::Array(mut items) => Ok(if last {
                        items.pop().unwrap_or(Value::Null)
                    } else if items.is_empty() {
                        Value::Null
                    } else {
                        items.swap_remove(0)
                    }),
                    Value::Null => Ok(Value::Null),
                    other => Err(requires(if last { "last" } else { "first" }, "a collection", &other)),
                }))
            }
            Function::Any | Function::All => {
                let quantifier =
                    self.build_quantifier(source, predicate_arg, function == Function::All)?;
                Ok(CompiledExpression::new(ValueType::Boolean, move |input| {
                    quantifier(input).map(Value::Boolean)
                }))
            }
            Function::Upper | Function::Lower | Function::Trim => {
                expect_textual(&source.result_type, function.name())?;
                Ok(then(source, ValueType::String, move |value| match value {
                    Value::String(s) => Ok(Value::String(match function {
                        Function::Upper => s.to_uppercase(),
                        Function::Lower => s.to_lowercase(),
                        _ => s.trim().to_string(),
                    })),
                    Value::Null => Ok(Value::Null),
                    other => Err(requires(function.name(), "a string", &other)),
                }))
            }
            Function::Substring => {
                expect_textual(&source.result_type, "substring")?;
                let start = self.build_value_arg(value_arg, function, &ValueType::Integer)?;
                Ok(with_input(source, ValueType::String, move |input, value| {
                    let s = match value {
                        Value::String(s) => s,
                        Value::Null => return Ok(Value::Null),
                        other => return Err(requires("substring", "a string", &other)),
                    };
                    let start = start.evaluate(input)?;
                    match start.as_int() {
                        Some(n) if n >= 0 => {
                            Ok(Value::String(s.chars().skip(n as usize).collect()))
                        }
                        _ => Err(EvalError::TypeError(format!(
                            "substring start must be a non-negative integer, got {}",
                            start.as_string()
                        ))),
                    }
                }))
            }
            Function::StartsWith | Function::EndsWith | Function::Contains => {
                let needle = self.build_value_arg(value_arg, function, &ValueType::Any)?;
                if function == Function::Contains && source.result_type.is_list() {
                    return Ok(with_input(source, ValueType::Boolean, move |input, value| {
                        let needle = needle.evaluate(input)?;
                        match value {
                            Value::Array(items) => Ok(Value::Boolean(
                                items.iter().any(|item| item.loose_eq(&needle)),
                            )),
                            Value::Null => Ok(Value::Boolean(false)),
                            other => Err(requires("contains", "a collection", &other)),
                        }
                    }));
                }
                expect_textual(&source.result_type, function.name())?;
                expect_textual(&needle.result_type, function.name())?;
                let op = match function {
                    Function::StartsWith => TextOp::StartsWith,
                    Function::EndsWith => TextOp::EndsWith,
                    _ => TextOp::Contains,
                };
                Ok(with_input(source, ValueType::Boolean, move |input, value| {
                    let needle = needle.evaluate(input)?;
                    Ok(Value::Boolean(text_match(op, &value, &needle)))
                }))
            }
            Function::Matches => {
                expect_textual(&source.result_type, "matches")?;
                let node = value_arg
                    .ok_or_else(|| argument_mismatch(function, "an argument is required"))?;
                let regex = self.constant_pattern(node)?;
                Ok(then(source, ValueType::Boolean, move |value| {
                    Ok(Value::Boolean(match value {
                        Value::String(s) => regex.is_match(&s),
                        _ => false,
                    }))
                }))
            }
        }
    }

    fn build_value_arg(
        &self,
        arg: Option<&ExpressionNode>,
        function: Function,
        expected: &ValueType,
    ) -> Result<CompiledExpression, BuildError> {
        let node = arg.ok_or_else(|| argument_mismatch(function, "an argument is required"))?;
        if let ExpressionNode::RuntimeParameter { name, default } = node {
            let value = self.parameter_value(name, default);
            return Ok(CompiledExpression::constant(coerce_parameter(
                name, value, expected,
            )?));
        }
        let compiled = self.build(node)?;
        if *expected == ValueType::Integer
            && !matches!(compiled.result_type, ValueType::Integer | ValueType::Any)
        {
            return Err(argument_mismatch(
                function,
                &format!("expects an integer, found {}", compiled.result_type),
            ));
        }
        Ok(compiled)
    }

    fn build_aggregate(
        &self,
        source: CompiledExpression,
        function: Function,
        arg: Option<&ExpressionNode>,
    ) -> Result<CompiledExpression, BuildError> {
        let element = element_of(&source.result_type, function.name())?;
        let selector = match arg {
            Some(node) => Some(self.descend(element.clone()).build(node)?),
            None => None,
        };
        let selected_type = selector
            .as_ref()
            .map(|s| s.result_type.clone())
            .unwrap_or(element);

        let ordered = matches!(function, Function::Min | Function::Max);
        let accepted = selected_type.is_numeric()
            || (ordered && matches!(selected_type, ValueType::String | ValueType::Boolean));
        if !accepted {
            return Err(if arg.is_none() && selected_type.is_record() {
                argument_mismatch(
                    function,
                    &format!("needs a value argument over {selected_type} elements"),
                )
            } else {
                BuildError::TypeMismatch(format!(
                    "{} requires numeric values, found {selected_type}",
                    function.name()
                ))
            });
        }

        let result_type = match function {
            Function::Sum if selected_type == ValueType::Integer => ValueType::Integer,
            Function::Sum | Function::Avg if selected_type == ValueType::Any => ValueType::Any,
            Function::Sum | Function::Avg => ValueType::Float,
            _ => selected_type,
        };

        let selector = selector.map(|s| s.eval);
        Ok(then(source, result_type, move |value| {
            let items = match value {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => return Err(requires(function.name(), "a collection", &other)),
            };
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                let selected = match &selector {
                    Some(selector) => selector(&item)?,
                    None => item,
                };
                if !selected.is_null() {
                    values.push(selected);
                }
            }
            match function {
                Function::Sum => decimal_sum(&values).map(|(sum, _)| decimal_to_value(sum)),
                Function::Avg => {
                    if values.is_empty() {
                        return Ok(Value::Null);
                    }
                    let (sum, count) = decimal_sum(&values)?;
                    sum.checked_div(Decimal::from(count))
                        .map(decimal_to_value)
                        .ok_or_else(|| EvalError::TypeError("avg overflowed".to_string()))
                }
                Function::Min => Ok(extreme(values, std::cmp::Ordering::Less)),
                _ => Ok(extreme(values, std::cmp::Ordering::Greater)),
            }
        }))
    }

    // ------------------------------------------------------------------
    // Filters and quantifiers
    // ------------------------------------------------------------------

    fn build_filter(
        &self,
        target: &ExpressionNode,
        predicate: &BoolExpr,
    ) -> Result<CompiledExpression, BuildError> {
        let source = self.build(target)?;
        let element = element_of(&source.result_type, "filter")?;
        let predicate = self.descend(element).build_predicate(predicate)?;
        let result_type = source.result_type.clone();

        Ok(then(source, result_type, move |value| match value {
            Value::Array(items) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in items {
                    if predicate(&item)? {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            Value::Null => Ok(Value::Null),
            other => Err(requires("filter", "a collection", &other)),
        }))
    }

    fn build_quantifier(
        &self,
        collection: CompiledExpression,
        predicate: Option<&BoolExpr>,
        all: bool,
    ) -> Result<PredicateFn, BuildError> {
        let element = element_of(&collection.result_type, if all { "all" } else { "any" })?;
        let predicate = match predicate {
            Some(predicate) => Some(self.descend(element).build_predicate(predicate)?),
            None if all => {
                return Err(argument_mismatch(Function::All, "an argument is required"));
            }
            None => None,
        };
        let source = collection.eval;

        Ok(Arc::new(move |input| {
            let items = match source(input)? {
                Value::Array(items) => items,
                Value::Null => return Ok(all),
                other => {
                    return Err(requires(
                        if all { "all" } else { "any" },
                        "a collection",
                        &other,
                    ));
                }
            };
            let Some(predicate) = &predicate else {
                return Ok(!items.is_empty());
            };
            for item in &items {
                let matched = predicate(item)?;
                if all && !matched {
                    return Ok(false);
                }
                if !all && matched {
                    return Ok(true);
                }
            }
            Ok(all)
        }))
    }

    fn build_predicate(&self, expr: &BoolExpr) -> Result<PredicateFn, BuildError> {
        match expr {
            BoolExpr::Compare { left, op, right } => {
                let (left, right) = self.build_operands(left, right)?;
                check_comparable(*op, &left.result_type, &right.result_type)?;
                let op = *op;
                let (left, right) = (left.eval, right.eval);
                Ok(Arc::new(move |input| {
                    Ok(compare(op, &left(input)?, &right(input)?))
                }))
            }
            BoolExpr::Text { left, op, right } => {
                let left = self.build(left)?;
                expect_textual(&left.result_type, text_op_name(*op))?;
                if *op == TextOp::Matches {
                    let regex = self.constant_pattern(right)?;
                    let left = left.eval;
                    return Ok(Arc::new(move |input| {
                        Ok(matches!(left(input)?, Value::String(s) if regex.is_match(&s)))
                    }));
                }
                let right = self.build_operand_as(right, &ValueType::String)?;
                expect_textual(&right.result_type, text_op_name(*op))?;
                let op = *op;
                let (left, right) = (left.eval, right.eval);
                Ok(Arc::new(move |input| {
                    Ok(text_match(op, &left(input)?, &right(input)?))
                }))
            }
            BoolExpr::Any {
                collection,
                predicate,
            } => self.build_quantifier(self.build(collection)?, predicate.as_deref(), false),
            BoolExpr::All {
                collection,
                predicate,
            } => self.build_quantifier(self.build(collection)?, Some(predicate.as_ref()), true),
            BoolExpr::And(left, right) => {
                let (left, right) = (self.build_predicate(left)?, self.build_predicate(right)?);
                Ok(Arc::new(move |input| Ok(left(input)? && right(input)?)))
            }
            BoolExpr::Or(left, right) => {
                let (left, right) = (self.build_predicate(left)?, self.build_predicate(right)?);
                Ok(Arc::new(move |input| Ok(left(input)? || right(input)?)))
            }
            BoolExpr::Truthy(node) => {
                let operand = self.build(node)?.eval;
                Ok(Arc::new(move |input| Ok(operand(input)?.is_truthy())))
            }
        }
    }

    /// Compiles both sides of a comparison. A runtime parameter takes the
    /// type of the other side.
    fn build_operands(
        &self,
        left: &ExpressionNode,
        right: &ExpressionNode,
    ) -> Result<(CompiledExpression, CompiledExpression), BuildError> {
        match (left, right) {
            (ExpressionNode::RuntimeParameter { .. }, _) => {
                let right = self.build(right)?;
                let left = self.build_operand_as(left, &right.result_type)?;
                Ok((left, right))
            }
            _ => {
                let left = self.build(left)?;
                let right = self.build_operand_as(right, &left.result_type)?;
                Ok((left, right))
            }
        }
    }

    fn build_operand_as(
        &self,
        node: &ExpressionNode,
        expected: &ValueType,
    ) -> Result<CompiledExpression, BuildError> {
        match node {
            ExpressionNode::RuntimeParameter { name, default } => {
                let value = self.parameter_value(name, default);
                Ok(CompiledExpression::constant(coerce_parameter(
                    name, value, expected,
                )?))
            }
            other => self.build(other),
        }
    }

    // ------------------------------------------------------------------
    // Indexers
    // ------------------------------------------------------------------

    fn build_indexer(
        &self,
        target: &ExpressionNode,
        mode: &IndexMode,
        ordering: Option<&Ordering>,
    ) -> Result<CompiledExpression, BuildError> {
        let source = self.build(target)?;
        let element = element_of(&source.result_type, "indexer")?;

        let order_key = match ordering {
            Some(ordering) => {
                let key = self.descend(element.clone()).build(&ordering.by)?;
                Some((key.eval, ordering.direction))
            }
            None => None,
        };

        let (result_type, pick) = match mode {
            IndexMode::Single(single) => (element, Pick::Single(*single)),
            IndexMode::Range {
                skip: Some(skip),
                take: Some(take),
            } => {
                let skip = self.slot_value(skip, "skip")?;
                let take = self.slot_value(take, "take")?;
                (source.result_type.clone(), Pick::Page { skip, take })
            }
            IndexMode::Range { skip, take } => {
                if let Some(slot) = skip.as_deref().or(take.as_deref()) {
                    self.slot_value(slot, "skip")?;
                    match self.config.partial_range {
                        PartialRangePolicy::Reject => return Err(BuildError::PartialRange),
                        PartialRangePolicy::OrderOnly => warn!(
                            target_type = %self.current_type,
                            "indexer has only a skip or a take; applying ordering only"
                        ),
                    }
                }
                (source.result_type.clone(), Pick::All)
            }
        };

        Ok(then(source, result_type, move |value| {
            let items = match value {
                Value::Array(items) => items,
                Value::Null => return Ok(Value::Null),
                other => return Err(requires("indexer", "a collection", &other)),
            };
            let items = match &order_key {
                Some((key, direction)) => sort_by_key(items, key, *direction)?,
                None => items,
            };
            Ok(pick.apply(items))
        }))
    }

    fn slot_value(&self, slot: &ExpressionNode, label: &str) -> Result<usize, BuildError> {
        let (name, value) = match slot {
            ExpressionNode::Literal(literal) => (label.to_string(), literal_value(literal)),
            ExpressionNode::RuntimeParameter { name, default } => {
                (name.clone(), self.parameter_value(name, default))
            }
            _ => {
                return Err(BuildError::TypeMismatch(format!(
                    "indexer {label} must be an integer or runtime parameter"
                )));
            }
        };
        let value = coerce_parameter(&name, value, &ValueType::Integer)?;
        match value.as_int() {
            Some(n) if n >= 0 => Ok(n as usize),
            _ => Err(BuildError::InvalidParameter {
                name,
                message: format!(
                    "expected a non-negative integer, found {}",
                    value.as_string()
                ),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Projections and conditionals
    // ------------------------------------------------------------------

    fn build_projection(
        &self,
        target: Option<&ExpressionNode>,
        fields: &[ProjectedField],
    ) -> Result<CompiledExpression, BuildError> {
        let source = match target {
            Some(target) => self.build(target)?,
            None => self.identity(),
        };
        let (element, is_list) = match &source.result_type {
            ValueType::List(element) => ((**element).clone(), true),
            other => (other.clone(), false),
        };
        if !element.is_record() {
            return Err(BuildError::TypeMismatch(format!(
                "projection requires a record, found {element}"
            )));
        }

        let element_ctx = self.descend(element.clone());
        let mut members: Vec<(String, EvalFn)> = Vec::with_capacity(fields.len());
        let mut descriptor = TypeDescriptor::new(String::new());

        for field in fields {
            let compiled = match field {
                ProjectedField::Plain(name) => {
                    element_ctx.build_navigation(None, &[PropertyRef::new(name.clone())])?
                }
                ProjectedField::Computed { expr, .. } => element_ctx.build(expr)?,
            };
            let name = field.output_name().to_string();
            descriptor = descriptor.field(FieldDescriptor::new(name.clone(), compiled.result_type));
            members.push((name, compiled.eval));
        }

        let names: Vec<&str> = members.iter().map(|(name, _)| name.as_str()).collect();
        descriptor.name = format!("{element}{{{}}}", names.join(", "));
        let record = ValueType::Record(Arc::new(descriptor));
        let result_type = if is_list {
            ValueType::list_of(record)
        } else {
            record
        };

        let project = move |item: &Value| -> Result<Value, EvalError> {
            if item.is_null() {
                return Ok(Value::Null);
            }
            let mut record = HashMap::with_capacity(members.len());
            for (name, eval) in &members {
                record.insert(name.clone(), eval(item)?);
            }
            Ok(Value::Object(record))
        };

        Ok(then(source, result_type, move |value| match value {
            Value::Array(items) => items
                .iter()
                .map(&project)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => project(&other),
        }))
    }

    fn build_conditional(
        &self,
        condition: &BoolExpr,
        then_branch: &ExpressionNode,
        otherwise: &ExpressionNode,
    ) -> Result<CompiledExpression, BuildError> {
        let condition = self.build_predicate(condition)?;
        let then_branch = self.build(then_branch)?;
        let otherwise = self.build(otherwise)?;

        let result_type = match (&then_branch.result_type, &otherwise.result_type) {
            (a, b) if a == b => a.clone(),
            (ValueType::Any, other) | (other, ValueType::Any) => other.clone(),
            (ValueType::Integer, ValueType::Float) | (ValueType::Float, ValueType::Integer) => {
                ValueType::Float
            }
            _ => ValueType::Any,
        };
        let (then_branch, otherwise) = (then_branch.eval, otherwise.eval);

        Ok(CompiledExpression::new(result_type, move |input| {
            if condition(input)? {
                then_branch(input)
            } else {
                otherwise(input)
            }
        }))
    }

    // ------------------------------------------------------------------
    // Constants
    // ------------------------------------------------------------------

    fn parameter_value(&self, name: &str, default: &Literal) -> Value {
        self.parameters
            .get(name)
            .cloned()
            .unwrap_or_else(|| literal_value(default))
    }

    fn constant_pattern(&self, node: &ExpressionNode) -> Result<Regex, BuildError> {
        let pattern = match node {
            ExpressionNode::Literal(literal) => literal_value(literal),
            ExpressionNode::RuntimeParameter { name, default } => {
                self.parameter_value(name, default)
            }
            _ => {
                return Err(argument_mismatch(
                    Function::Matches,
                    "the pattern must be a string literal or runtime parameter",
                ));
            }
        };
        let pattern = match pattern {
            Value::String(pattern) => pattern,
            other => {
                return Err(argument_mismatch(
                    Function::Matches,
                    &format!("the pattern must be a string, found {}", other.type_name()),
                ));
            }
        };
        Regex::new(&pattern).map_err(|e| BuildError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })
    }
}

// ----------------------------------------------------------------------
// Runtime helpers
// ----------------------------------------------------------------------

enum Pick {
    Single(SingleIndex),
    Page { skip: usize, take: usize },
    All,
}

impl Pick {
    fn apply(&self, mut items: Vec<Value>) -> Value {
        match self {
            Pick::Single(SingleIndex::First) => {
                if items.is_empty() {
                    Value::Null
                } else {
                    items.swap_remove(0)
                }
            }
            Pick::Single(SingleIndex::Last) => items.pop().unwrap_or(Value::Null),
            Pick::Page { skip, take } => {
                Value::Array(items.into_iter().skip(*skip).take(*take).collect())
            }
            Pick::All => Value::Array(items),
        }
    }
}

/// Stable sort by a computed key.
fn sort_by_key(
    items: Vec<Value>,
    key: &EvalFn,
    direction: OrderDirection,
) -> Result<Vec<Value>, EvalError> {
    let mut keyed = items
        .into_iter()
        .map(|item| Ok((key(&item)?, item)))
        .collect::<Result<Vec<_>, EvalError>>()?;
    match direction {
        OrderDirection::Asc => keyed.sort_by(|a, b| a.0.sort_cmp(&b.0)),
        OrderDirection::Desc => keyed.sort_by(|a, b| b.0.sort_cmp(&a.0)),
    }
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

fn read_step(
    value: &Value,
    property: &str,
    null_safe: bool,
    getter: &Getter,
) -> Result<Value, EvalError> {
    match value {
        Value::Null if null_safe => Ok(Value::Null),
        Value::Null => Err(EvalError::NullNavigation {
            property: property.to_string(),
        }),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match read_step(item, property, null_safe, getter)? {
                    Value::Array(inner) => out.extend(inner),
                    other => out.push(other),
                }
            }
            Ok(Value::Array(out))
        }
        Value::Object(_) => Ok(getter(value)),
        other => Err(EvalError::TypeError(format!(
            "cannot read '{property}' from {}",
            other.type_name()
        ))),
    }
}

fn then(
    source: CompiledExpression,
    result_type: ValueType,
    f: impl Fn(Value) -> Result<Value, EvalError> + Send + Sync + 'static,
) -> CompiledExpression {
    let source = source.eval;
    CompiledExpression::new(result_type, move |input| f(source(input)?))
}

fn with_input(
    source: CompiledExpression,
    result_type: ValueType,
    f: impl Fn(&Value, Value) -> Result<Value, EvalError> + Send + Sync + 'static,
) -> CompiledExpression {
    let source = source.eval;
    CompiledExpression::new(result_type, move |input| f(input, source(input)?))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> bool {
    match op {
        CompareOp::Equal => left.loose_eq(right),
        CompareOp::NotEqual => !left.loose_eq(right),
        _ => match left.partial_compare(right) {
            Some(ord) => match op {
                CompareOp::GreaterThan => ord.is_gt(),
                CompareOp::GreaterEqual => ord.is_ge(),
                CompareOp::LessThan => ord.is_lt(),
                _ => ord.is_le(),
            },
            None => false,
        },
    }
}

fn text_match(op: TextOp, left: &Value, right: &Value) -> bool {
    let (Value::String(haystack), Value::String(needle)) = (left, right) else {
        return false;
    };
    match op {
        TextOp::StartsWith => haystack.starts_with(needle.as_str()),
        TextOp::EndsWith => haystack.ends_with(needle.as_str()),
        TextOp::Contains => haystack.contains(needle.as_str()),
        // Patterns are compiled at build time and never reach here.
        TextOp::Matches => false,
    }
}

fn text_op_name(op: TextOp) -> &'static str {
    match op {
        TextOp::StartsWith => "startswith",
        TextOp::EndsWith => "endswith",
        TextOp::Contains => "contains",
        TextOp::Matches => "matches",
    }
}

fn decimal_sum(values: &[Value]) -> Result<(Decimal, i64), EvalError> {
    let mut total = Decimal::ZERO;
    let mut count = 0i64;
    for value in values {
        let term = match value {
            Value::Integer(n) => Decimal::from(*n),
            Value::Float(f) => Decimal::from_f64(*f).ok_or_else(|| {
                EvalError::TypeError(format!("cannot aggregate non-finite number {f}"))
            })?,
            other => {
                return Err(EvalError::TypeError(format!(
                    "aggregate requires numeric values, got {}",
                    other.type_name()
                )));
            }
        };
        total = total
            .checked_add(term)
            .ok_or_else(|| EvalError::TypeError("sum overflowed".to_string()))?;
        count += 1;
    }
    Ok((total, count))
}

fn decimal_to_value(d: Decimal) -> Value {
    if d.is_integer()
        && let Some(n) = d.to_i64()
    {
        return Value::Integer(n);
    }
    d.to_f64().map(Value::Float).unwrap_or(Value::Null)
}

/// Smallest (`Less`) or largest (`Greater`) value; the first one wins ties.
fn extreme(values: Vec<Value>, want: std::cmp::Ordering) -> Value {
    values
        .into_iter()
        .reduce(|best, item| {
            if item.sort_cmp(&best) == want {
                item
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}

// ----------------------------------------------------------------------
// Build-time type helpers
// ----------------------------------------------------------------------

fn element_of(value_type: &ValueType, what: &str) -> Result<ValueType, BuildError> {
    match value_type {
        ValueType::List(element) => Ok((**element).clone()),
        ValueType::Any => Ok(ValueType::Any),
        other => Err(BuildError::TypeMismatch(format!(
            "{what} requires a collection, found {other}"
        ))),
    }
}

fn expect_textual(value_type: &ValueType, what: &str) -> Result<(), BuildError> {
    if value_type.is_textual() {
        Ok(())
    } else {
        Err(BuildError::TypeMismatch(format!(
            "{what} requires a string, found {value_type}"
        )))
    }
}

fn check_comparable(op: CompareOp, left: &ValueType, right: &ValueType) -> Result<(), BuildError> {
    let scalar = |t: &ValueType| {
        matches!(
            t,
            ValueType::Integer | ValueType::Float | ValueType::String | ValueType::Boolean
        )
    };
    let compatible = match (left, right) {
        (ValueType::Any, _) | (_, ValueType::Any) => true,
        (ValueType::Integer | ValueType::Float, ValueType::Integer | ValueType::Float) => true,
        (a, b) if a == b => {
            scalar(a) || matches!(op, CompareOp::Equal | CompareOp::NotEqual)
        }
        _ => false,
    };
    if compatible {
        Ok(())
    } else {
        Err(BuildError::TypeMismatch(format!(
            "cannot compare {left} with {right}"
        )))
    }
}

/// Brings a runtime parameter value to the type its slot expects.
fn coerce_parameter(name: &str, value: Value, expected: &ValueType) -> Result<Value, BuildError> {
    let coerced = match (expected, &value) {
        (_, Value::Null) | (ValueType::Any, _) => Some(value.clone()),
        (ValueType::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),
        (ValueType::Integer, v) => v.as_int().map(Value::Integer),
        (ValueType::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::Float),
        (ValueType::Float, v) => v.as_float().map(Value::Float),
        (ValueType::String, Value::String(_)) => Some(value.clone()),
        (ValueType::String, Value::Integer(_) | Value::Float(_) | Value::Boolean(_)) => {
            Some(Value::String(value.as_string()))
        }
        (ValueType::Boolean, Value::Boolean(_)) => Some(value.clone()),
        (ValueType::Boolean, Value::String(s)) => s.parse::<bool>().ok().map(Value::Boolean),
        (ValueType::List(_), Value::Array(_)) => Some(value.clone()),
        _ => None,
    };
    coerced.ok_or_else(|| BuildError::InvalidParameter {
        name: name.to_string(),
        message: format!("expected {expected}, found {}", value.as_string()),
    })
}

fn argument_mismatch(function: Function, message: &str) -> BuildError {
    BuildError::ArgumentMismatch {
        function: function.name().to_string(),
        message: message.to_string(),
    }
}

fn requires(function: &str, what: &str, found: &Value) -> EvalError {
    EvalError::TypeError(format!(
        "{function} requires {what}, got {}",
        found.type_name()
    ))
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(n) => Value::Integer(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Null => Value::Null,
    }
}

fn type_of(value: &Value) -> ValueType {
    match value {
        Value::Integer(_) => ValueType::Integer,
        Value::Float(_) => ValueType::Float,
        Value::String(_) => ValueType::String,
        Value::Boolean(_) => ValueType::Boolean,
        Value::Array(_) => ValueType::list_of(ValueType::Any),
        Value::Null | Value::Object(_) => ValueType::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_sum_of_floats_is_exact() {
        let values = vec![Value::Float(0.1), Value::Float(0.2), Value::Float(0.7)];
        let (sum, count) = decimal_sum(&values).unwrap();
        assert_eq!(count, 3);
        assert_eq!(decimal_to_value(sum), Value::Integer(1));
    }

    #[test]
    fn extreme_keeps_first_of_ties() {
        let values = vec![Value::Integer(2), Value::Float(1.0), Value::Integer(1)];
        assert_eq!(extreme(values, std::cmp::Ordering::Less), Value::Float(1.0));
    }

    #[test]
    fn parameters_coerce_from_text() {
        assert_eq!(
            coerce_parameter("Take", Value::from("10"), &ValueType::Integer),
            Ok(Value::Integer(10))
        );
        assert!(coerce_parameter("Take", Value::from("ten"), &ValueType::Integer).is_err());
    }

    #[test]
    fn comparing_text_with_numbers_is_rejected() {
        assert!(check_comparable(CompareOp::Equal, &ValueType::String, &ValueType::Integer).is_err());
        assert!(check_comparable(CompareOp::LessThan, &ValueType::Integer, &ValueType::Float).is_ok());
    }
}
