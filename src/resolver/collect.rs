//! Walks live instances and lists every decorated field awaiting a value.

use std::sync::Arc;

use crate::{
    Value,
    accessor::Accessor,
    engine::Engine,
    graph::Selector,
    path::InstancePath,
    schema::ValueType,
};

use super::ResolveError;

/// One `(instance, decorated field)` slot to fill during a pass.
#[derive(Debug, Clone)]
pub(crate) struct PendingFetch {
    pub location: InstancePath,
    pub field: String,
    pub field_type: ValueType,
    pub accessor: Arc<Accessor>,
    pub selector: Selector,
    pub expression: String,
    pub attribute_kind: String,
    pub order: usize,
}

/// Pending fetches of every instance, nested records included.
pub(crate) fn collect(
    engine: &Engine,
    type_name: &str,
    instances: &[Value],
) -> Result<Vec<PendingFetch>, ResolveError> {
    let mut pending = Vec::new();
    for (index, instance) in instances.iter().enumerate() {
        visit(engine, type_name, instance, InstancePath::root(index), &mut pending)?;
    }
    Ok(pending)
}

fn visit(
    engine: &Engine,
    type_name: &str,
    value: &Value,
    location: InstancePath,
    out: &mut Vec<PendingFetch>,
) -> Result<(), ResolveError> {
    if !matches!(value, Value::Object(_)) {
        return Ok(());
    }

    let graph = engine.graph(type_name)?;
    if !graph.is_empty() {
        let table = engine.accessors().table(type_name)?;
        for chain in &graph.chains {
            let edge = chain.head();
            out.push(PendingFetch {
                location: location.clone(),
                field: edge.target_field.clone(),
                field_type: edge.value_type.clone(),
                accessor: table.by_real_name(&edge.target_field)?,
                selector: edge.selector.clone(),
                expression: edge.expression.clone(),
                attribute_kind: edge.attribute_kind.clone(),
                order: chain.order,
            });
        }
    }

    let Some(descriptor) = engine.registry().get(type_name) else {
        return Ok(());
    };
    // Decorated fields hold fetched results; only plain record fields are
    // walked.
    for field in descriptor.fields.iter().filter(|f| f.fetch.is_none()) {
        let Some(child) = value.get(&field.name) else {
            continue;
        };
        match (&field.value_type, child) {
            (ValueType::Entity(nested), _) => {
                visit(engine, nested, child, location.field(&field.name), out)?;
            }
            (ValueType::List(element), Value::Array(items)) => {
                if let ValueType::Entity(nested) = element.as_ref() {
                    let list = location.field(&field.name);
                    for (index, item) in items.iter().enumerate() {
                        visit(engine, nested, item, list.index(index), out)?;
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}
