// tests/config_tests.rs

use fieldlink::*;

// ============================================================================
// Engine Configuration
// ============================================================================

#[test]
fn test_default_config() {
    let config = EngineConfig::default();
    assert_eq!(config.cycle_policy, CyclePolicy::Truncate);
    assert_eq!(config.partial_range, PartialRangePolicy::OrderOnly);
    assert_eq!(EngineConfig::new(), config);
}

#[test]
fn test_config_from_json() {
    let config =
        EngineConfig::from_json_str(r#"{"cycle_policy": "reject", "partial_range": "reject"}"#)
            .unwrap();
    assert_eq!(
        config,
        EngineConfig::new()
            .with_cycle_policy(CyclePolicy::Reject)
            .with_partial_range(PartialRangePolicy::Reject)
    );
}

#[test]
fn test_missing_keys_keep_defaults() {
    let config = EngineConfig::from_json_str(r#"{"partial_range": "reject"}"#).unwrap();
    assert_eq!(config.cycle_policy, CyclePolicy::Truncate);
    assert_eq!(config.partial_range, PartialRangePolicy::Reject);

    assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
}

#[test]
fn test_invalid_policy_is_rejected() {
    assert!(EngineConfig::from_json_str(r#"{"cycle_policy": "ignore"}"#).is_err());
}

#[test]
fn test_engine_exposes_config() {
    let config = EngineConfig::new().with_cycle_policy(CyclePolicy::Reject);
    let engine = Engine::with_config(TypeRegistry::default(), config.clone());
    assert_eq!(engine.config(), &config);
}

// ============================================================================
// Registry Loading
// ============================================================================

#[test]
fn test_registry_from_json() {
    let registry = TypeRegistry::from_json_str(
        r#"[
          {"name": "Customer", "identity_field": "Id", "display_field": "full_name",
           "fields": [
             {"name": "Id", "type": "integer"},
             {"name": "full_name", "alias": "Name", "type": "string"},
             {"name": "Scores", "type": {"list": "float"}}
           ]},
          {"name": "OrderDto", "fields": [
             {"name": "CustomerId", "type": "integer"},
             {"name": "Buyer", "type": {"entity": "Customer"}},
             {"name": "CustomerName", "type": "string", "fetch": {
               "selector_field": "CustomerId", "attribute_kind": "customers",
               "target_type": "Customer", "expression": "Name:upper"}}
          ]}
        ]"#,
    )
    .unwrap();

    let mut names: Vec<&str> = registry.type_names().collect();
    names.sort();
    assert_eq!(names, vec!["Customer", "OrderDto"]);

    let customer = registry.get("Customer").unwrap();
    assert_eq!(customer.identity_field.as_deref(), Some("Id"));
    assert_eq!(customer.find_field("Name").unwrap().name, "full_name");
    assert_eq!(
        customer.field_named("Scores").unwrap().value_type,
        ValueType::list_of(ValueType::Float)
    );
    assert!(!customer.is_decorated());

    let order = registry.get("OrderDto").unwrap();
    let (field, fetch) = order.decorated_fields().next().unwrap();
    assert_eq!(field.name, "CustomerName");
    assert_eq!(fetch.expression.as_deref(), Some("Name:upper"));
    assert!(
        registry
            .descriptor_for(&order.field_named("Buyer").unwrap().value_type)
            .is_some()
    );
}

#[test]
fn test_registry_rejects_unknown_targets() {
    let err = TypeRegistry::from_json_str(
        r#"[{"name": "OrderDto", "fields": [
              {"name": "CustomerName", "type": "string", "fetch": {
                "selector_field": "CustomerId", "attribute_kind": "customers",
                "target_type": "Customer"}}
            ]}]"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::UnknownType { ref field, ref target, .. }
            if field == "CustomerName" && target == "Customer"
    ));
}

#[test]
fn test_registry_rejects_duplicates_and_bad_json() {
    let err = TypeRegistry::from_json_str(
        r#"[{"name": "A", "fields": []}, {"name": "A", "fields": []}]"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateType(ref name) if name == "A"));

    let err = TypeRegistry::from_json_str(r#"[{"name": "A", "fields": [{"name": "X"}]}]"#)
        .unwrap_err();
    assert!(matches!(err, SchemaError::Json(_)));
}
