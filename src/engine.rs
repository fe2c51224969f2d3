//! The expression engine: registry, configuration and every cache in one
//! explicitly constructed object.

use std::{collections::BTreeMap, collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    Value,
    accessor::TypeAccessorCache,
    ast::ExpressionNode,
    builder::{BuildError, CompiledExpression, ExpressionBuildContext},
    config::EngineConfig,
    convert::value_to_json,
    graph::{DependencyGraph, GraphError, build_graph},
    parser::{ParseError, parse},
    schema::{TypeRegistry, ValueType},
};

/// Caller-supplied values for `${name|default}` placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeParameters(BTreeMap<String, Value>);

impl RuntimeParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stable text form of the values bound to `names`. Parameters outside
    /// `names` do not contribute.
    pub fn fingerprint(&self, names: &[String]) -> String {
        names
            .iter()
            .filter_map(|name| self.0.get(name).map(|value| (name, value)))
            .map(|(name, value)| format!("{name}={}", value_to_json(value.clone())))
            .collect::<Vec<_>>()
            .join(";")
    }
}

type CompileKey = (String, String, String);

/// Parses, compiles and analyzes on demand, caching every result.
///
/// Results are cached forever, failures included, so the same input always
/// fails the same way. An engine is cheap to share behind an `Arc`.
///
/// # Examples
///
/// ```
/// use fieldlink::{Engine, RuntimeParameters, TypeRegistry, Value};
///
/// let registry = TypeRegistry::from_json_str(r#"[
///   {"name": "Customer", "fields": [{"name": "Name", "type": "string"}]}
/// ]"#).unwrap();
/// let engine = Engine::new(registry);
///
/// let upper = engine.compile("Customer", "Name:upper", &RuntimeParameters::new()).unwrap();
/// let ada: Value = [("Name", Value::from("Ada"))].into_iter().collect();
/// assert_eq!(upper.evaluate(&ada).unwrap(), Value::from("ADA"));
/// ```
pub struct Engine {
    registry: Arc<TypeRegistry>,
    config: EngineConfig,
    accessors: TypeAccessorCache,
    parsed: RwLock<HashMap<String, Result<Arc<ExpressionNode>, ParseError>>>,
    compiled: RwLock<HashMap<CompileKey, Result<Arc<CompiledExpression>, BuildError>>>,
    graphs: RwLock<HashMap<String, Result<Arc<DependencyGraph>, GraphError>>>,
}

impl Engine {
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    pub fn with_config(registry: TypeRegistry, config: EngineConfig) -> Self {
        let registry = Arc::new(registry);
        Engine {
            accessors: TypeAccessorCache::new(Arc::clone(&registry)),
            registry,
            config,
            parsed: RwLock::new(HashMap::new()),
            compiled: RwLock::new(HashMap::new()),
            graphs: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn accessors(&self) -> &TypeAccessorCache {
        &self.accessors
    }

    /// Parses `text` once; later calls return the cached tree or error.
    pub fn parse(&self, text: &str) -> Result<Arc<ExpressionNode>, ParseError> {
        if let Some(cached) = self.parsed.read().get(text) {
            return cached.clone();
        }

        let mut parsed = self.parsed.write();
        if let Some(cached) = parsed.get(text) {
            return cached.clone();
        }
        let result = parse(text).map(Arc::new);
        if let Err(err) = &result {
            debug!(expression = text, error = %err, "expression failed to parse");
        }
        parsed.insert(text.to_string(), result.clone());
        result
    }

    /// Compiles `text` against `type_name` with the given parameters.
    ///
    /// Only the parameters the expression references take part in the
    /// cache key.
    pub fn compile(
        &self,
        type_name: &str,
        text: &str,
        parameters: &RuntimeParameters,
    ) -> Result<Arc<CompiledExpression>, BuildError> {
        let fingerprint = match self.parse(text) {
            Ok(ast) => parameters.fingerprint(&ast.parameter_names()),
            Err(_) => String::new(),
        };
        let key = (type_name.to_string(), text.to_string(), fingerprint);
        if let Some(cached) = self.compiled.read().get(&key) {
            return cached.clone();
        }

        let mut compiled = self.compiled.write();
        if let Some(cached) = compiled.get(&key) {
            return cached.clone();
        }
        let result = self.compile_uncached(type_name, text, parameters);
        match &result {
            Ok(expr) => debug!(
                type_name,
                expression = text,
                result_type = %expr.result_type,
                "compiled expression"
            ),
            Err(err) => debug!(
                type_name,
                expression = text,
                error = %err,
                "expression failed to compile"
            ),
        }
        compiled.insert(key, result.clone());
        result
    }

    fn compile_uncached(
        &self,
        type_name: &str,
        text: &str,
        parameters: &RuntimeParameters,
    ) -> Result<Arc<CompiledExpression>, BuildError> {
        if !self.registry.contains(type_name) {
            return Err(BuildError::UnknownType(type_name.to_string()));
        }
        let ast = self.parse(text)?;
        let ctx = ExpressionBuildContext::new(
            ValueType::entity(type_name),
            &self.registry,
            &self.accessors,
            parameters,
            &self.config,
        );
        ctx.build(&ast).map(Arc::new)
    }

    /// Dependency graph of `type_name`, built once.
    pub fn graph(&self, type_name: &str) -> Result<Arc<DependencyGraph>, GraphError> {
        if let Some(cached) = self.graphs.read().get(type_name) {
            return cached.clone();
        }

        let mut graphs = self.graphs.write();
        if let Some(cached) = graphs.get(type_name) {
            return cached.clone();
        }
        let result = build_graph(&self.registry, type_name, self.config.cycle_policy).map(Arc::new);
        if let Ok(graph) = &result {
            debug!(
                type_name,
                chains = graph.chains.len(),
                max_order = graph.max_order().unwrap_or(0),
                "built dependency graph"
            );
        }
        graphs.insert(type_name.to_string(), result.clone());
        result
    }

    /// Number of cached parse results.
    pub fn parsed_len(&self) -> usize {
        self.parsed.read().len()
    }

    /// Number of cached compile results.
    pub fn compiled_len(&self) -> usize {
        self.compiled.read().len()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("parsed", &self.parsed_len())
            .field("compiled", &self.compiled_len())
            .finish_non_exhaustive()
    }
}
