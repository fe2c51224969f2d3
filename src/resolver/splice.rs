//! Turns fetched JSON back into field values and writes them in place.

use std::collections::HashMap;

use crate::{
    Value,
    convert::parse_json,
    fetch::FetchedEntity,
    schema::{CoerceError, ValueType},
};

use super::{ResolveError, collect::PendingFetch};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Coerce(#[from] CoerceError),
}

/// Text key of a selector id. A boundary may echo `1` back as `"1"` or
/// `1.0`; all three match.
pub(crate) fn id_key(id: &Value) -> String {
    id.as_string()
}

/// Fetched entities by id key.
pub(crate) fn index_response(entities: Vec<FetchedEntity>) -> HashMap<String, FetchedEntity> {
    entities
        .into_iter()
        .map(|entity| (id_key(&entity.id), entity))
        .collect()
}

/// Value for one selector id. A missing entity or expression reads as null.
pub(crate) fn decode(
    response: &HashMap<String, FetchedEntity>,
    id: &Value,
    fetch: &PendingFetch,
    value_type: &ValueType,
) -> Result<Value, ResolveError> {
    let Some(serialized) = response
        .get(&id_key(id))
        .and_then(|entity| entity.value_for(&fetch.expression))
    else {
        return Ok(Value::Null);
    };

    let decode_error = |source: DecodeError| ResolveError::Decode {
        field: fetch.field.clone(),
        source,
    };
    let value = parse_json(serialized).map_err(|e| decode_error(e.into()))?;
    value_type
        .coerce(value)
        .map_err(|e| decode_error(e.into()))
}

/// Writes `value` into the slot of `fetch`. Returns `false` when the
/// instance no longer exists at that location.
pub(crate) fn write(instances: &mut [Value], fetch: &PendingFetch, value: Value) -> bool {
    match fetch.location.get_mut(instances) {
        Some(instance) => fetch.accessor.set(instance, value),
        None => false,
    }
}
