//! Per-type field accessors, built once and shared.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    Value,
    schema::{FieldDescriptor, TypeDescriptor, TypeRegistry, ValueType},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessorError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("type '{type_name}' exposes '{name}' more than once")]
    DuplicateName { type_name: String, name: String },

    #[error("type '{type_name}' has no field '{name}'")]
    NotFound { type_name: String, name: String },
}

type Getter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
type Setter = Arc<dyn Fn(&mut Value, Value) -> bool + Send + Sync>;

/// Compiled read/write access to one field of a record type.
pub struct Accessor {
    pub exposed_name: String,
    pub field: FieldDescriptor,
    get: Getter,
    set: Setter,
}

impl Accessor {
    fn for_field(field: &FieldDescriptor) -> Self {
        let key = field.name.clone();
        let get: Getter = Arc::new(move |record: &Value| {
            record.get(&key).cloned().unwrap_or(Value::Null)
        });

        let key = field.name.clone();
        let set: Setter = Arc::new(move |record: &mut Value, value: Value| match record {
            Value::Object(map) => {
                map.insert(key.clone(), value);
                true
            }
            _ => false,
        });

        Accessor {
            exposed_name: field.exposed_name().to_string(),
            field: field.clone(),
            get,
            set,
        }
    }

    /// Reads the field. Absent fields and non-record inputs read as null.
    pub fn get(&self, record: &Value) -> Value {
        (self.get)(record)
    }

    /// Writes the field. Returns `false` when `record` is not a record.
    pub fn set(&self, record: &mut Value, value: Value) -> bool {
        (self.set)(record, value)
    }

    pub fn value_type(&self) -> &ValueType {
        &self.field.value_type
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("exposed_name", &self.exposed_name)
            .field("field", &self.field.name)
            .field("value_type", &self.field.value_type)
            .finish()
    }
}

/// Accessor table of one type.
#[derive(Debug)]
pub struct TypeAccessors {
    pub type_name: String,
    by_exposed: HashMap<String, Arc<Accessor>>,
    by_name: HashMap<String, Arc<Accessor>>,
}

impl TypeAccessors {
    /// Builds the table for a descriptor. Fails when two fields share an
    /// exposed name.
    pub fn build(descriptor: &TypeDescriptor) -> Result<Self, AccessorError> {
        let mut by_exposed = HashMap::with_capacity(descriptor.fields.len());
        let mut by_name = HashMap::with_capacity(descriptor.fields.len());

        for field in &descriptor.fields {
            let accessor = Arc::new(Accessor::for_field(field));
            if by_exposed
                .insert(accessor.exposed_name.clone(), Arc::clone(&accessor))
                .is_some()
            {
                return Err(AccessorError::DuplicateName {
                    type_name: descriptor.name.clone(),
                    name: accessor.exposed_name.clone(),
                });
            }
            by_name.insert(field.name.clone(), accessor);
        }

        Ok(TypeAccessors {
            type_name: descriptor.name.clone(),
            by_exposed,
            by_name,
        })
    }

    /// Accessor by exposed name. An aliased field is reachable only through
    /// its alias.
    pub fn get(&self, exposed_name: &str) -> Result<Arc<Accessor>, AccessorError> {
        self.by_exposed
            .get(exposed_name)
            .cloned()
            .ok_or_else(|| self.not_found(exposed_name))
    }

    /// Accessor by declared name, ignoring aliases.
    pub fn by_real_name(&self, name: &str) -> Result<Arc<Accessor>, AccessorError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    pub fn exposed_names(&self) -> impl Iterator<Item = &str> {
        self.by_exposed.keys().map(String::as_str)
    }

    fn not_found(&self, name: &str) -> AccessorError {
        AccessorError::NotFound {
            type_name: self.type_name.clone(),
            name: name.to_string(),
        }
    }
}

/// Lazily built accessor tables for every registered type.
///
/// A table is built the first time its type is asked for and never
/// invalidated. Concurrent first requests build it once.
pub struct TypeAccessorCache {
    registry: Arc<TypeRegistry>,
    tables: RwLock<HashMap<String, Arc<TypeAccessors>>>,
}

impl TypeAccessorCache {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        TypeAccessorCache {
            registry,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self, type_name: &str) -> Result<Arc<TypeAccessors>, AccessorError> {
        if let Some(table) = self.tables.read().get(type_name) {
            return Ok(Arc::clone(table));
        }

        let mut tables = self.tables.write();
        // Another caller may have built it while we waited for the lock.
        if let Some(table) = tables.get(type_name) {
            return Ok(Arc::clone(table));
        }

        let descriptor = self
            .registry
            .get(type_name)
            .ok_or_else(|| AccessorError::UnknownType(type_name.to_string()))?;
        let table = Arc::new(TypeAccessors::build(descriptor)?);
        debug!(
            type_name,
            fields = descriptor.fields.len(),
            "built accessor table"
        );
        tables.insert(type_name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Accessor for `exposed_name` on `type_name`.
    pub fn get_accessor(
        &self,
        type_name: &str,
        exposed_name: &str,
    ) -> Result<Arc<Accessor>, AccessorError> {
        self.table(type_name)?.get(exposed_name)
    }

    /// Accessor for the identity field, looked up by its real name.
    pub fn identity_accessor(&self, type_name: &str) -> Result<Arc<Accessor>, AccessorError> {
        let field = self.special_field(type_name, |d| d.identity_field.as_deref())?;
        self.table(type_name)?.by_real_name(&field)
    }

    /// Accessor for the default display field, looked up by its real name.
    pub fn display_accessor(&self, type_name: &str) -> Result<Arc<Accessor>, AccessorError> {
        let field = self.special_field(type_name, |d| d.display_field.as_deref())?;
        self.table(type_name)?.by_real_name(&field)
    }

    fn special_field(
        &self,
        type_name: &str,
        pick: impl Fn(&TypeDescriptor) -> Option<&str>,
    ) -> Result<String, AccessorError> {
        let descriptor = self
            .registry
            .get(type_name)
            .ok_or_else(|| AccessorError::UnknownType(type_name.to_string()))?;
        pick(descriptor)
            .map(str::to_string)
            .ok_or_else(|| AccessorError::NotFound {
                type_name: type_name.to_string(),
                name: "<unset>".to_string(),
            })
    }

    /// Number of tables built so far.
    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TypeAccessorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeAccessorCache")
            .field("tables", &self.len())
            .finish()
    }
}
