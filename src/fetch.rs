//! The boundary between the resolver and wherever remote entities live.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    Value,
    builder::{BuildError, EvalError},
    convert::to_json_string,
    engine::{Engine, RuntimeParameters},
};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{0}")]
    Message(String),

    #[error("no source serves attribute kind '{0}'")]
    UnknownAttributeKind(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One batched request: every id and expression of a resolution group.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub attribute_kind: String,
    /// Distinct, non-null
    pub selector_ids: Vec<Value>,
    /// Distinct
    pub expressions: Vec<String>,
    pub parameters: RuntimeParameters,
}

/// Values of one requested entity, one JSON text per expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedEntity {
    pub id: Value,
    pub values: Vec<(String, String)>,
}

impl FetchedEntity {
    pub fn value_for(&self, expression: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(expr, _)| expr == expression)
            .map(|(_, serialized)| serialized.as_str())
    }
}

/// Serves batched fetches for the resolver.
///
/// Ids with no matching entity are left out of the response; the resolver
/// writes null for them.
#[async_trait]
pub trait FetchBoundary: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<FetchedEntity>, FetchError>;
}

#[async_trait]
impl<T: FetchBoundary + ?Sized> FetchBoundary for Arc<T> {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<FetchedEntity>, FetchError> {
        (**self).fetch(request).await
    }
}

struct Dataset {
    target_type: String,
    entities: Vec<Value>,
}

/// A fetch boundary over in-process collections.
///
/// Each attribute kind maps to a registered type and its entities. Requests
/// are answered by compiling each expression against that type and
/// evaluating it on every requested entity.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use fieldlink::{Engine, FetchBoundary, FetchRequest, InMemorySource, RuntimeParameters,
///     TypeRegistry, Value};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let registry = TypeRegistry::from_json_str(r#"[
///   {"name": "Customer", "identity_field": "Id",
///    "fields": [{"name": "Id", "type": "integer"}, {"name": "Name", "type": "string"}]}
/// ]"#).unwrap();
/// let engine = Arc::new(Engine::new(registry));
///
/// let ada: Value = [("Id", Value::Integer(1)), ("Name", Value::from("Ada"))].into_iter().collect();
/// let source = InMemorySource::new(engine).with_dataset("customers", "Customer", vec![ada]);
///
/// let fetched = source.fetch(FetchRequest {
///     attribute_kind: "customers".into(),
///     selector_ids: vec![Value::Integer(1)],
///     expressions: vec!["Name".into()],
///     parameters: RuntimeParameters::new(),
/// }).await.unwrap();
/// assert_eq!(fetched[0].value_for("Name"), Some("\"Ada\""));
/// # });
/// ```
pub struct InMemorySource {
    engine: Arc<Engine>,
    datasets: HashMap<String, Dataset>,
}

impl InMemorySource {
    pub fn new(engine: Arc<Engine>) -> Self {
        InMemorySource {
            engine,
            datasets: HashMap::new(),
        }
    }

    pub fn with_dataset(
        mut self,
        attribute_kind: impl Into<String>,
        target_type: impl Into<String>,
        entities: Vec<Value>,
    ) -> Self {
        self.datasets.insert(
            attribute_kind.into(),
            Dataset {
                target_type: target_type.into(),
                entities,
            },
        );
        self
    }
}

#[async_trait]
impl FetchBoundary for InMemorySource {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<FetchedEntity>, FetchError> {
        let dataset = self
            .datasets
            .get(&request.attribute_kind)
            .ok_or_else(|| FetchError::UnknownAttributeKind(request.attribute_kind.clone()))?;

        let identity = self
            .engine
            .accessors()
            .identity_accessor(&dataset.target_type)
            .map_err(BuildError::from)?;

        let compiled = request
            .expressions
            .iter()
            .map(|text| {
                self.engine
                    .compile(&dataset.target_type, text, &request.parameters)
                    .map(|expr| (text, expr))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut fetched = Vec::with_capacity(request.selector_ids.len());
        for id in &request.selector_ids {
            let Some(entity) = dataset
                .entities
                .iter()
                .find(|entity| identity.get(entity).loose_eq(id))
            else {
                continue;
            };

            let mut values = Vec::with_capacity(compiled.len());
            for (text, expr) in &compiled {
                let value = expr.evaluate(entity)?;
                values.push(((*text).clone(), to_json_string(&value)?));
            }
            fetched.push(FetchedEntity {
                id: id.clone(),
                values,
            });
        }

        debug!(
            attribute_kind = %request.attribute_kind,
            requested = request.selector_ids.len(),
            found = fetched.len(),
            "served in-memory fetch"
        );
        Ok(fetched)
    }
}
