//! Dependency-ordered resolution of decorated fields.
//!
//! A pass works level by level. Every decorated field of every instance is
//! collected with the order of its dependency chain. Within one level the
//! fields are grouped by attribute kind and each group becomes a single
//! fetch; the groups of a level are fetched concurrently and spliced back
//! before the next level reads them as selectors.

mod collect;
mod splice;

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use futures::future::try_join_all;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::{
    Value,
    accessor::AccessorError,
    engine::{Engine, RuntimeParameters},
    fetch::{FetchBoundary, FetchError, FetchRequest},
    graph::{GraphError, Selector},
    path::InstancePath,
    schema::ValueType,
};

use collect::PendingFetch;
pub use splice::DecodeError;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Accessor(#[from] AccessorError),

    #[error("fetch for attribute kind '{attribute_kind}' failed: {source}")]
    Fetch {
        attribute_kind: String,
        #[source]
        source: FetchError,
    },

    #[error("cannot decode fetched value for field '{field}': {source}")]
    Decode {
        field: String,
        #[source]
        source: DecodeError,
    },

    #[error("resolution cancelled before level {level} completed")]
    Cancelled { level: usize },
}

/// Per-call inputs of a resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Forwarded with every fetch request
    pub parameters: RuntimeParameters,
    /// Resolution stops once this reads `true`
    pub cancel: Option<watch::Receiver<bool>>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(mut self, parameters: RuntimeParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// What a pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Levels fully resolved
    pub levels: usize,
    pub fetch_calls: usize,
    pub fields_written: usize,
    /// Fields set to null because their selector was null
    pub fields_skipped: usize,
}

/// Selector ids of one pending fetch.
enum SelectorIds {
    Single(Value),
    Many(Vec<Value>),
}

/// Everything fetched in one call: one attribute kind at one level.
#[derive(Default)]
struct Batch {
    ids: Vec<Value>,
    seen_ids: HashSet<String>,
    expressions: Vec<String>,
    members: Vec<(PendingFetch, SelectorIds)>,
}

impl Batch {
    fn add(&mut self, fetch: PendingFetch, ids: SelectorIds) {
        let new_ids = match &ids {
            SelectorIds::Single(id) => std::slice::from_ref(id),
            SelectorIds::Many(ids) => ids.as_slice(),
        };
        for id in new_ids {
            if self.seen_ids.insert(splice::id_key(id)) {
                self.ids.push(id.clone());
            }
        }
        if !self.expressions.contains(&fetch.expression) {
            self.expressions.push(fetch.expression.clone());
        }
        self.members.push((fetch, ids));
    }
}

/// Fills decorated fields of live instances through a [`FetchBoundary`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use fieldlink::{Engine, InMemorySource, ResolveOptions, Resolver, TypeRegistry, Value};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let registry = TypeRegistry::from_json_str(r#"[
///   {"name": "Customer", "identity_field": "Id", "display_field": "Name",
///    "fields": [{"name": "Id", "type": "integer"}, {"name": "Name", "type": "string"}]},
///   {"name": "OrderDto", "fields": [
///     {"name": "CustomerId", "type": "integer"},
///     {"name": "CustomerName", "type": "string", "fetch": {
///       "selector_field": "CustomerId", "attribute_kind": "customers", "target_type": "Customer"}}
///   ]}
/// ]"#).unwrap();
/// let engine = Arc::new(Engine::new(registry));
/// let ada: Value = [("Id", Value::Integer(1)), ("Name", Value::from("Ada"))].into_iter().collect();
/// let source = InMemorySource::new(Arc::clone(&engine)).with_dataset("customers", "Customer", vec![ada]);
/// let resolver = Resolver::new(engine, Arc::new(source));
///
/// let mut order: Value = [("CustomerId", Value::Integer(1))].into_iter().collect();
/// resolver.resolve_one("OrderDto", &mut order, ResolveOptions::new()).await.unwrap();
/// assert_eq!(order.get("CustomerName"), Some(&Value::from("Ada")));
/// # });
/// ```
pub struct Resolver {
    engine: Arc<Engine>,
    boundary: Arc<dyn FetchBoundary>,
}

impl Resolver {
    pub fn new(engine: Arc<Engine>, boundary: Arc<dyn FetchBoundary>) -> Self {
        Resolver { engine, boundary }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub async fn resolve_one(
        &self,
        type_name: &str,
        instance: &mut Value,
        options: ResolveOptions,
    ) -> Result<ResolveReport, ResolveError> {
        self.resolve(type_name, std::slice::from_mut(instance), options)
            .await
    }

    /// Resolves every decorated field of `instances` and of the records
    /// nested in them.
    pub async fn resolve(
        &self,
        type_name: &str,
        instances: &mut [Value],
        options: ResolveOptions,
    ) -> Result<ResolveReport, ResolveError> {
        let pending = collect::collect(&self.engine, type_name, instances)?;

        let mut levels: BTreeMap<usize, Vec<PendingFetch>> = BTreeMap::new();
        for fetch in pending {
            levels.entry(fetch.order).or_default().push(fetch);
        }

        let mut resolved: HashMap<(InstancePath, String), Value> = HashMap::new();
        let mut report = ResolveReport::default();
        let mut cancel = options.cancel.clone();

        for (level, fetches) in levels {
            if cancel.as_ref().is_some_and(|rx| *rx.borrow()) {
                return Err(ResolveError::Cancelled { level });
            }

            let mut batches: BTreeMap<String, Batch> = BTreeMap::new();
            let mut skipped = Vec::new();
            for fetch in fetches {
                let selector = selector_value(&fetch, instances, &resolved);
                let ids = match selector {
                    Value::Null => None,
                    Value::Array(items) => Some(SelectorIds::Many(
                        items.into_iter().filter(|id| !id.is_null()).collect(),
                    )),
                    id => Some(SelectorIds::Single(id)),
                };
                match ids {
                    Some(ids) => batches
                        .entry(fetch.attribute_kind.clone())
                        .or_default()
                        .add(fetch, ids),
                    None => skipped.push(fetch),
                }
            }

            debug!(
                level,
                batches = batches.len(),
                fields = batches.values().map(|b| b.members.len()).sum::<usize>(),
                "resolving level"
            );

            let calls = batches
                .iter()
                .filter(|(_, batch)| !batch.ids.is_empty())
                .map(|(kind, batch)| {
                    let request = FetchRequest {
                        attribute_kind: kind.clone(),
                        selector_ids: batch.ids.clone(),
                        expressions: batch.expressions.clone(),
                        parameters: options.parameters.clone(),
                    };
                    let boundary = Arc::clone(&self.boundary);
                    async move {
                        let attribute_kind = request.attribute_kind.clone();
                        boundary
                            .fetch(request)
                            .await
                            .map(|entities| (attribute_kind.clone(), entities))
                            .map_err(|source| ResolveError::Fetch {
                                attribute_kind,
                                source,
                            })
                    }
                })
                .collect::<Vec<_>>();
            let call_count = calls.len();

            let responses = match cancel.as_mut() {
                Some(rx) => tokio::select! {
                    responses = try_join_all(calls) => responses?,
                    _ = cancelled(rx) => {
                        info!(level, "resolution cancelled");
                        return Err(ResolveError::Cancelled { level });
                    }
                },
                None => try_join_all(calls).await?,
            };
            report.fetch_calls += call_count;

            let mut responses: HashMap<String, _> = responses
                .into_iter()
                .map(|(kind, entities)| (kind, splice::index_response(entities)))
                .collect();

            // The whole level decodes before anything is written, so a
            // decode failure leaves every field of the level untouched.
            let mut decoded = Vec::new();
            for (kind, batch) in batches {
                let response = responses.remove(&kind).unwrap_or_default();
                for (fetch, ids) in batch.members {
                    let value = match &ids {
                        SelectorIds::Single(id) => {
                            splice::decode(&response, id, &fetch, &fetch.field_type)?
                        }
                        SelectorIds::Many(ids) => {
                            let element = match &fetch.field_type {
                                ValueType::List(element) => element.as_ref().clone(),
                                other => other.clone(),
                            };
                            let values = ids
                                .iter()
                                .map(|id| splice::decode(&response, id, &fetch, &element))
                                .collect::<Result<Vec<_>, _>>()?;
                            Value::Array(values)
                        }
                    };
                    decoded.push((fetch, value));
                }
            }

            for fetch in skipped {
                splice::write(instances, &fetch, Value::Null);
                resolved.insert((fetch.location, fetch.field), Value::Null);
                report.fields_skipped += 1;
            }
            for (fetch, value) in decoded {
                let key = (fetch.location.clone(), fetch.field.clone());
                if resolved.contains_key(&key) {
                    continue;
                }
                if splice::write(instances, &fetch, value.clone()) {
                    report.fields_written += 1;
                }
                resolved.insert(key, value);
            }

            report.levels += 1;
        }

        info!(
            type_name,
            instances = instances.len(),
            levels = report.levels,
            fetch_calls = report.fetch_calls,
            fields_written = report.fields_written,
            fields_skipped = report.fields_skipped,
            "resolution complete"
        );
        Ok(report)
    }
}

/// Selector id of a pending fetch at the time its level runs.
fn selector_value(
    fetch: &PendingFetch,
    instances: &[Value],
    resolved: &HashMap<(InstancePath, String), Value>,
) -> Value {
    let current = |field: &str| {
        fetch
            .location
            .get(instances)
            .and_then(|instance| instance.get(field))
            .cloned()
            .unwrap_or(Value::Null)
    };
    match &fetch.selector {
        Selector::Literal(text) => literal_id(text),
        Selector::Field(field) => current(field),
        // A dependency cut from a cycle has not been resolved in this
        // pass; its current value stands in.
        Selector::Dependency(field) => resolved
            .get(&(fetch.location.clone(), field.clone()))
            .cloned()
            .unwrap_or_else(|| current(field)),
    }
}

fn literal_id(text: &str) -> Value {
    text.parse::<i64>()
        .map(Value::Integer)
        .unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Completes once the receiver reads `true`. Never completes if the
/// sender is dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
