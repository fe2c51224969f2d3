//! Dependency analysis of decorated fields.
//!
//! A decorated field whose selector is another decorated field cannot be
//! fetched until that field has been resolved. Following selectors gives
//! each field a chain of dependencies, and the chain length gives the level
//! at which the field can be resolved.

use std::collections::BTreeMap;

use tracing::warn;

use crate::{
    config::CyclePolicy,
    schema::{FetchDecoration, TypeDescriptor, TypeRegistry, ValueType},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("selector cycle on type '{type_name}': {}", path.join(" -> "))]
    Cycle {
        type_name: String,
        path: Vec<String>,
    },

    #[error(
        "field '{field}' of type '{type_name}' names no expression and its target has no display or identity field"
    )]
    MissingExpression { type_name: String, field: String },
}

/// Where a decorated field takes its selector id from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// A plain field of the instance, by declared name
    Field(String),
    /// Another decorated field of the instance, resolved earlier
    Dependency(String),
    /// No such field exists; the selector text itself is the id
    Literal(String),
}

/// One decorated field in a dependency chain.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyEdge {
    pub target_field: String,
    /// Expression evaluated on the remote entity, defaults filled in
    pub expression: String,
    pub selector_field: String,
    pub selector: Selector,
    pub attribute_kind: String,
    pub target_type: String,
    pub value_type: ValueType,
    /// Level of this field: number of decorated fields below it
    pub order: usize,
}

/// A decorated field followed by its transitive dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyChain {
    /// `edges[0]` is the field itself
    pub edges: Vec<DependencyEdge>,
    /// `edges.len() - 1`
    pub order: usize,
    /// Set when expansion stopped at a field already on the chain
    pub truncated: bool,
}

impl DependencyChain {
    pub fn head(&self) -> &DependencyEdge {
        // Chains are only built with at least one edge.
        &self.edges[0]
    }

    pub fn field(&self) -> &str {
        &self.head().target_field
    }
}

/// Dependency chains of every decorated field of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGraph {
    pub type_name: String,
    /// In field declaration order
    pub chains: Vec<DependencyChain>,
    /// Selector paths cut short because they revisit a field
    pub cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    pub fn chain(&self, field: &str) -> Option<&DependencyChain> {
        self.chains.iter().find(|c| c.field() == field)
    }

    pub fn max_order(&self) -> Option<usize> {
        self.chains.iter().map(|c| c.order).max()
    }

    /// Chains grouped by order, ascending.
    pub fn levels(&self) -> BTreeMap<usize, Vec<&DependencyChain>> {
        let mut levels: BTreeMap<usize, Vec<&DependencyChain>> = BTreeMap::new();
        for chain in &self.chains {
            levels.entry(chain.order).or_default().push(chain);
        }
        levels
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// Analyzes the decorated fields of `type_name`.
pub fn build_graph(
    registry: &TypeRegistry,
    type_name: &str,
    policy: CyclePolicy,
) -> Result<DependencyGraph, GraphError> {
    let descriptor = registry
        .get(type_name)
        .ok_or_else(|| GraphError::UnknownType(type_name.to_string()))?;

    let mut graph = DependencyGraph {
        type_name: type_name.to_string(),
        chains: Vec::new(),
        cycles: Vec::new(),
    };

    for (field, _) in descriptor.decorated_fields() {
        let mut path = Vec::new();
        let mut truncated = None;
        collect_chain(descriptor, &field.name, &mut path, &mut truncated);

        if let Some(cycle) = &truncated {
            match policy {
                CyclePolicy::Reject => {
                    return Err(GraphError::Cycle {
                        type_name: type_name.to_string(),
                        path: cycle.clone(),
                    });
                }
                CyclePolicy::Truncate => {
                    warn!(
                        type_name,
                        field = %field.name,
                        cycle = %cycle.join(" -> "),
                        "selector cycle truncated"
                    );
                }
            }
        }

        let len = path.len();
        let edges = path
            .iter()
            .enumerate()
            .map(|(i, name)| edge_for(registry, descriptor, name, len - 1 - i))
            .collect::<Result<Vec<_>, _>>()?;

        graph.chains.push(DependencyChain {
            order: len - 1,
            edges,
            truncated: truncated.is_some(),
        });
        graph.cycles.extend(truncated);
    }

    Ok(graph)
}

/// Follows selectors from `field`, pushing each decorated field visited.
/// Stops at a field already on `path` and reports the closed loop.
fn collect_chain(
    descriptor: &TypeDescriptor,
    field: &str,
    path: &mut Vec<String>,
    truncated: &mut Option<Vec<String>>,
) {
    if path.iter().any(|visited| visited == field) {
        let mut cycle = path.clone();
        cycle.push(field.to_string());
        *truncated = Some(cycle);
        return;
    }
    path.push(field.to_string());

    let Some(fetch) = descriptor.field_named(field).and_then(|f| f.fetch.as_ref()) else {
        return;
    };
    if let Some(selector) = descriptor.find_field(&fetch.selector_field)
        && selector.fetch.is_some()
    {
        let next = selector.name.clone();
        collect_chain(descriptor, &next, path, truncated);
    }
}

fn edge_for(
    registry: &TypeRegistry,
    descriptor: &TypeDescriptor,
    field_name: &str,
    order: usize,
) -> Result<DependencyEdge, GraphError> {
    let field = descriptor
        .field_named(field_name)
        .ok_or_else(|| GraphError::UnknownType(descriptor.name.clone()))?;
    let fetch = field
        .fetch
        .as_ref()
        .ok_or_else(|| GraphError::UnknownType(descriptor.name.clone()))?;

    Ok(DependencyEdge {
        target_field: field.name.clone(),
        expression: expression_for(registry, descriptor, &field.name, fetch)?,
        selector_field: fetch.selector_field.clone(),
        selector: selector_for(descriptor, fetch),
        attribute_kind: fetch.attribute_kind.clone(),
        target_type: fetch.target_type.clone(),
        value_type: field.value_type.clone(),
        order,
    })
}

fn selector_for(descriptor: &TypeDescriptor, fetch: &FetchDecoration) -> Selector {
    match descriptor.find_field(&fetch.selector_field) {
        Some(field) if field.fetch.is_some() => Selector::Dependency(field.name.clone()),
        Some(field) => Selector::Field(field.name.clone()),
        None => Selector::Literal(fetch.selector_field.clone()),
    }
}

fn expression_for(
    registry: &TypeRegistry,
    descriptor: &TypeDescriptor,
    field: &str,
    fetch: &FetchDecoration,
) -> Result<String, GraphError> {
    if let Some(expression) = &fetch.expression {
        return Ok(expression.clone());
    }
    let target = registry
        .get(&fetch.target_type)
        .ok_or_else(|| GraphError::UnknownType(fetch.target_type.clone()))?;
    let default = target
        .default_fetch_field()
        .ok_or_else(|| GraphError::MissingExpression {
            type_name: descriptor.name.clone(),
            field: field.to_string(),
        })?;
    // Expressions address fields by exposed name.
    Ok(target
        .field_named(default)
        .map(|f| f.exposed_name().to_string())
        .unwrap_or_else(|| default.to_string()))
}
