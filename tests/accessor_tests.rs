// tests/accessor_tests.rs

use std::sync::Arc;

use fieldlink::*;

fn registry() -> Arc<TypeRegistry> {
    let registry = TypeRegistry::builder()
        .with_type(
            TypeDescriptor::new("Product")
                .identity("sku")
                .display("product_name")
                .field(FieldDescriptor::new("sku", ValueType::String))
                .field(FieldDescriptor::new("product_name", ValueType::String).with_alias("Name"))
                .field(FieldDescriptor::new("Price", ValueType::Float)),
        )
        .with_type(
            TypeDescriptor::new("Clash")
                .field(FieldDescriptor::new("a", ValueType::String).with_alias("B"))
                .field(FieldDescriptor::new("B", ValueType::String)),
        )
        .with_type(TypeDescriptor::new("Bare").field(FieldDescriptor::new("X", ValueType::Any)))
        .build()
        .unwrap();
    Arc::new(registry)
}

fn widget() -> Value {
    [
        ("sku", Value::from("W-1")),
        ("product_name", Value::from("widget")),
        ("Price", Value::Float(2.5)),
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// Lookup
// ============================================================================

#[test]
fn test_alias_is_the_exposed_name() {
    let cache = TypeAccessorCache::new(registry());
    let table = cache.table("Product").unwrap();

    let name = table.get("Name").unwrap();
    assert_eq!(name.exposed_name, "Name");
    assert_eq!(name.field.name, "product_name");
    assert_eq!(name.get(&widget()), Value::from("widget"));

    assert_eq!(
        table.get("product_name").unwrap_err(),
        AccessorError::NotFound {
            type_name: "Product".to_string(),
            name: "product_name".to_string(),
        }
    );
    assert!(table.by_real_name("product_name").is_ok());

    let mut names: Vec<&str> = table.exposed_names().collect();
    names.sort();
    assert_eq!(names, vec!["Name", "Price", "sku"]);
}

#[test]
fn test_identity_and_display_accessors() {
    let cache = TypeAccessorCache::new(registry());
    let identity = cache.identity_accessor("Product").unwrap();
    let display = cache.display_accessor("Product").unwrap();

    assert_eq!(identity.get(&widget()), Value::from("W-1"));
    assert_eq!(display.get(&widget()), Value::from("widget"));
    assert_eq!(display.exposed_name, "Name");

    assert!(matches!(
        cache.identity_accessor("Bare"),
        Err(AccessorError::NotFound { .. })
    ));
}

#[test]
fn test_unknown_type() {
    let cache = TypeAccessorCache::new(registry());
    assert_eq!(
        cache.get_accessor("Nope", "Id").unwrap_err(),
        AccessorError::UnknownType("Nope".to_string())
    );
}

#[test]
fn test_duplicate_exposed_name() {
    let cache = TypeAccessorCache::new(registry());
    assert_eq!(
        cache.table("Clash").unwrap_err(),
        AccessorError::DuplicateName {
            type_name: "Clash".to_string(),
            name: "B".to_string(),
        }
    );
    assert!(cache.is_empty());
}

// ============================================================================
// Reads and Writes
// ============================================================================

#[test]
fn test_absent_field_reads_null() {
    let cache = TypeAccessorCache::new(registry());
    let price = cache.get_accessor("Product", "Price").unwrap();
    let empty: Value = Vec::<(&str, Value)>::new().into_iter().collect();

    assert_eq!(price.get(&empty), Value::Null);
    assert_eq!(price.get(&Value::Integer(3)), Value::Null);
}

#[test]
fn test_set_writes_real_field() {
    let cache = TypeAccessorCache::new(registry());
    let name = cache.get_accessor("Product", "Name").unwrap();

    let mut product = widget();
    assert!(name.set(&mut product, Value::from("gadget")));
    assert_eq!(product.get("product_name"), Some(&Value::from("gadget")));
    assert_eq!(product.get("Name"), None);

    let mut scalar = Value::Integer(1);
    assert!(!name.set(&mut scalar, Value::from("gadget")));
}

#[test]
fn test_expressions_use_aliases() {
    let engine = Engine::new(TypeRegistry::clone(&registry()));
    let params = RuntimeParameters::new();

    let upper = engine.compile("Product", "Name:upper", &params).unwrap();
    assert_eq!(upper.evaluate(&widget()), Ok(Value::from("WIDGET")));

    assert!(matches!(
        engine.compile("Product", "product_name", &params),
        Err(BuildError::UnknownProperty { .. })
    ));
    assert!(matches!(
        engine.compile("Clash", "B", &params),
        Err(BuildError::Accessor(AccessorError::DuplicateName { .. }))
    ));
}

// ============================================================================
// Caching
// ============================================================================

#[test]
fn test_tables_are_built_once() {
    let cache = Arc::new(TypeAccessorCache::new(registry()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || cache.table("Product").unwrap())
        })
        .collect();
    let tables: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(tables.iter().all(|t| Arc::ptr_eq(t, &tables[0])));
    assert_eq!(cache.len(), 1);

    let name = cache.get_accessor("Product", "Name").unwrap();
    let again = cache.get_accessor("Product", "Name").unwrap();
    assert!(Arc::ptr_eq(&name, &again));
}
