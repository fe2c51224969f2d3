//! Type registrations: what each record type exposes and which of its
//! fields are filled from remote entities.
//!
//! A registry is built once, either through the builder API or from JSON:
//!
//! ```
//! use fieldlink::TypeRegistry;
//!
//! let registry = TypeRegistry::from_json_str(r#"[
//!   {
//!     "name": "Customer",
//!     "identity_field": "Id",
//!     "display_field": "Name",
//!     "fields": [
//!       {"name": "Id", "type": "integer"},
//!       {"name": "Name", "type": "string"}
//!     ]
//!   },
//!   {
//!     "name": "OrderDto",
//!     "fields": [
//!       {"name": "CustomerId", "type": "integer"},
//!       {"name": "CustomerName", "type": "string", "fetch": {
//!         "selector_field": "CustomerId",
//!         "attribute_kind": "customers",
//!         "target_type": "Customer"
//!       }}
//!     ]
//!   }
//! ]"#).unwrap();
//!
//! assert!(registry.get("OrderDto").unwrap().is_decorated());
//! ```

use std::{collections::HashMap, fmt, sync::Arc};

use serde::Deserialize;

use crate::Value;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid registration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("type '{0}' is registered twice")]
    DuplicateType(String),

    #[error("field '{field}' of type '{type_name}' refers to unregistered type '{target}'")]
    UnknownType {
        type_name: String,
        field: String,
        target: String,
    },
}

/// Statically known type of a field or of an expression result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "TypeSpec")]
pub enum ValueType {
    /// Unknown or mixed
    Any,
    Boolean,
    Integer,
    Float,
    String,
    List(Box<ValueType>),
    /// A registered record type, by name
    Entity(String),
    /// An anonymous record produced by a projection
    Record(Arc<TypeDescriptor>),
}

/// Serialized form of [`ValueType`]: `"integer"`, `{"list": "string"}`,
/// `{"entity": "Customer"}`.
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum TypeSpec {
    Any,
    Boolean,
    Integer,
    Float,
    String,
    List(Box<TypeSpec>),
    Entity(String),
}

impl From<TypeSpec> for ValueType {
    fn from(spec: TypeSpec) -> Self {
        match spec {
            TypeSpec::Any => ValueType::Any,
            TypeSpec::Boolean => ValueType::Boolean,
            TypeSpec::Integer => ValueType::Integer,
            TypeSpec::Float => ValueType::Float,
            TypeSpec::String => ValueType::String,
            TypeSpec::List(inner) => ValueType::List(Box::new((*inner).into())),
            TypeSpec::Entity(name) => ValueType::Entity(name),
        }
    }
}

impl ValueType {
    pub fn list_of(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    pub fn entity(name: impl Into<String>) -> Self {
        ValueType::Entity(name.into())
    }

    /// Element type of a list, `None` for scalars and records.
    pub fn element_type(&self) -> Option<&ValueType> {
        match self {
            ValueType::List(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ValueType::List(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Integer | ValueType::Float | ValueType::Any)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ValueType::String | ValueType::Any)
    }

    pub fn is_record(&self) -> bool {
        matches!(self, ValueType::Entity(_) | ValueType::Record(_) | ValueType::Any)
    }

    /// Brings a fetched value into the shape this type declares.
    ///
    /// Null is accepted everywhere. Whole floats become integers, integers
    /// become floats, and list elements are coerced one by one.
    pub fn coerce(&self, value: Value) -> Result<Value, CoerceError> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ValueType::Any, v) => Ok(v),
            (ValueType::Boolean, v @ Value::Boolean(_)) => Ok(v),
            (ValueType::Integer, v @ Value::Integer(_)) => Ok(v),
            // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive.
            (ValueType::Integer, Value::Float(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
            {
                Ok(Value::Integer(f as i64))
            }
            (ValueType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (ValueType::Float, v @ Value::Float(_)) => Ok(v),
            (ValueType::String, v @ Value::String(_)) => Ok(v),
            (ValueType::List(inner), Value::Array(items)) => items
                .into_iter()
                .map(|item| inner.coerce(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (ValueType::Entity(_) | ValueType::Record(_), v @ Value::Object(_)) => Ok(v),
            (expected, found) => Err(CoerceError {
                expected: expected.to_string(),
                found: found.type_name(),
            }),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "any"),
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::String => write!(f, "string"),
            ValueType::List(inner) => write!(f, "list<{inner}>"),
            ValueType::Entity(name) => write!(f, "{name}"),
            ValueType::Record(desc) => write!(f, "{}", desc.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct CoerceError {
    pub expected: String,
    pub found: &'static str,
}

/// Per-field metadata saying where a field's value comes from.
///
/// The resolver reads the selector field of the instance, asks the fetch
/// boundary registered for `attribute_kind` for the entity with that id and
/// evaluates `expression` against it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchDecoration {
    /// Field holding the remote id. When no field of that name exists, the
    /// text itself is the id.
    pub selector_field: String,
    /// Expression evaluated on the remote entity. Defaults to the target's
    /// display field, or its identity field.
    #[serde(default)]
    pub expression: Option<String>,
    pub attribute_kind: String,
    pub target_type: String,
}

impl FetchDecoration {
    pub fn new(
        selector_field: impl Into<String>,
        attribute_kind: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        FetchDecoration {
            selector_field: selector_field.into(),
            expression: None,
            attribute_kind: attribute_kind.into(),
            target_type: target_type.into(),
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldDescriptor {
    /// Declared name, also the key used in record objects
    pub name: String,
    /// External name. When set it replaces `name` in expressions.
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub fetch: Option<FetchDecoration>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        FieldDescriptor {
            name: name.into(),
            alias: None,
            value_type,
            fetch: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_fetch(mut self, fetch: FetchDecoration) -> Self {
        self.fetch = Some(fetch);
        self
    }

    /// Name the field is addressed by in expressions.
    pub fn exposed_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(default)]
    pub identity_field: Option<String>,
    #[serde(default)]
    pub display_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        TypeDescriptor {
            name: name.into(),
            identity_field: None,
            display_field: None,
            fields: Vec::new(),
        }
    }

    pub fn identity(mut self, field: impl Into<String>) -> Self {
        self.identity_field = Some(field.into());
        self
    }

    pub fn display(mut self, field: impl Into<String>) -> Self {
        self.display_field = Some(field.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Field by declared name.
    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field by declared name, falling back to its exposed name.
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_named(name)
            .or_else(|| self.fields.iter().find(|f| f.exposed_name() == name))
    }

    pub fn decorated_fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &FetchDecoration)> {
        self.fields
            .iter()
            .filter_map(|f| f.fetch.as_ref().map(|fetch| (f, fetch)))
    }

    pub fn is_decorated(&self) -> bool {
        self.fields.iter().any(|f| f.fetch.is_some())
    }

    /// Field requested when a decoration names no expression.
    pub fn default_fetch_field(&self) -> Option<&str> {
        self.display_field
            .as_deref()
            .or(self.identity_field.as_deref())
    }
}

/// The registration table of every record type the engine knows about.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Load a registry from a JSON array of type descriptors.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        let types: Vec<TypeDescriptor> = serde_json::from_str(json)?;
        types
            .into_iter()
            .fold(TypeRegistry::builder(), TypeRegistryBuilder::with_type)
            .build()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Descriptor of a record-shaped value type, if it has one.
    pub fn descriptor_for(&self, value_type: &ValueType) -> Option<Arc<TypeDescriptor>> {
        match value_type {
            ValueType::Entity(name) => self.types.get(name).cloned(),
            ValueType::Record(desc) => Some(Arc::clone(desc)),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    types: Vec<TypeDescriptor>,
}

impl TypeRegistryBuilder {
    pub fn with_type(mut self, descriptor: TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Checks that names are unique and that every entity and fetch target
    /// reference points at a registered type.
    pub fn build(self) -> Result<TypeRegistry, SchemaError> {
        let mut types = HashMap::with_capacity(self.types.len());
        for descriptor in self.types {
            if types.contains_key(&descriptor.name) {
                return Err(SchemaError::DuplicateType(descriptor.name));
            }
            types.insert(descriptor.name.clone(), Arc::new(descriptor));
        }

        for descriptor in types.values() {
            for field in &descriptor.fields {
                let mut targets = Vec::new();
                referenced_entities(&field.value_type, &mut targets);
                if let Some(fetch) = &field.fetch {
                    targets.push(fetch.target_type.as_str());
                }
                if let Some(missing) = targets.into_iter().find(|t| !types.contains_key(*t)) {
                    return Err(SchemaError::UnknownType {
                        type_name: descriptor.name.clone(),
                        field: field.name.clone(),
                        target: missing.to_string(),
                    });
                }
            }
        }

        Ok(TypeRegistry { types })
    }
}

fn referenced_entities<'a>(value_type: &'a ValueType, out: &mut Vec<&'a str>) {
    match value_type {
        ValueType::Entity(name) => out.push(name),
        ValueType::List(inner) => referenced_entities(inner, out),
        _ => {}
    }
}
