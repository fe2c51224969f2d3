// tests/graph_tests.rs

use std::sync::Arc;

use fieldlink::*;

fn fetch(selector: &str, kind: &str, target: &str) -> FetchDecoration {
    FetchDecoration::new(selector, kind, target)
}

fn registry() -> TypeRegistry {
    TypeRegistry::builder()
        .with_type(
            TypeDescriptor::new("Region")
                .identity("Id")
                .display("Name")
                .field(FieldDescriptor::new("Id", ValueType::Integer))
                .field(FieldDescriptor::new("Name", ValueType::String)),
        )
        .with_type(
            TypeDescriptor::new("Customer")
                .identity("Id")
                .display("Name")
                .field(FieldDescriptor::new("Id", ValueType::Integer))
                .field(FieldDescriptor::new("Name", ValueType::String))
                .field(FieldDescriptor::new("RegionId", ValueType::Integer)),
        )
        .with_type(
            TypeDescriptor::new("Supplier")
                .identity("Id")
                .display("supplier_name")
                .field(FieldDescriptor::new("Id", ValueType::Integer))
                .field(FieldDescriptor::new("supplier_name", ValueType::String).with_alias("Title")),
        )
        .with_type(TypeDescriptor::new("Tag").field(FieldDescriptor::new("Label", ValueType::String)))
        .with_type(
            TypeDescriptor::new("OrderDto")
                .field(FieldDescriptor::new("CustomerId", ValueType::Integer))
                .field(
                    FieldDescriptor::new("CustomerName", ValueType::String)
                        .with_fetch(fetch("CustomerId", "customers", "Customer")),
                )
                .field(
                    FieldDescriptor::new("CustomerRegionId", ValueType::Integer).with_fetch(
                        fetch("CustomerId", "customers", "Customer").with_expression("RegionId"),
                    ),
                )
                .field(
                    FieldDescriptor::new("RegionName", ValueType::String)
                        .with_fetch(fetch("CustomerRegionId", "regions", "Region")),
                )
                .field(
                    FieldDescriptor::new("HeadquartersName", ValueType::String)
                        .with_fetch(fetch("42", "regions", "Region")),
                ),
        )
        .with_type(
            TypeDescriptor::new("SupplierDto")
                .field(FieldDescriptor::new("supplier_id", ValueType::Integer).with_alias("SupplierKey"))
                .field(
                    FieldDescriptor::new("SupplierTitle", ValueType::String)
                        .with_fetch(fetch("SupplierKey", "suppliers", "Supplier")),
                ),
        )
        .with_type(
            TypeDescriptor::new("Loop")
                .field(
                    FieldDescriptor::new("A", ValueType::Integer)
                        .with_fetch(fetch("B", "regions", "Region").with_expression("Id")),
                )
                .field(
                    FieldDescriptor::new("B", ValueType::Integer)
                        .with_fetch(fetch("A", "regions", "Region").with_expression("Id")),
                )
                .field(
                    FieldDescriptor::new("Label", ValueType::String)
                        .with_fetch(fetch("A", "regions", "Region")),
                ),
        )
        .with_type(
            TypeDescriptor::new("Tagged")
                .field(FieldDescriptor::new("TagId", ValueType::Integer))
                .field(
                    FieldDescriptor::new("TagLabel", ValueType::String)
                        .with_fetch(fetch("TagId", "tags", "Tag")),
                ),
        )
        .build()
        .unwrap()
}

fn graph(type_name: &str) -> DependencyGraph {
    build_graph(&registry(), type_name, CyclePolicy::Truncate).unwrap()
}

// ============================================================================
// Orders and Selectors
// ============================================================================

#[test]
fn test_orders() {
    let graph = graph("OrderDto");

    let orders: Vec<(&str, usize)> = graph.chains.iter().map(|c| (c.field(), c.order)).collect();
    assert_eq!(
        orders,
        vec![
            ("CustomerName", 0),
            ("CustomerRegionId", 0),
            ("RegionName", 1),
            ("HeadquartersName", 0),
        ]
    );
    assert_eq!(graph.max_order(), Some(1));
    assert!(graph.cycles.is_empty());
}

#[test]
fn test_levels() {
    let graph = graph("OrderDto");
    let levels = graph.levels();

    let level = |n: usize| levels[&n].iter().map(|c| c.field()).collect::<Vec<_>>();
    assert_eq!(level(0), vec!["CustomerName", "CustomerRegionId", "HeadquartersName"]);
    assert_eq!(level(1), vec!["RegionName"]);
}

#[test]
fn test_dependency_chain_edges() {
    let graph = graph("OrderDto");
    let chain = graph.chain("RegionName").unwrap();

    let edges: Vec<(&str, usize)> = chain
        .edges
        .iter()
        .map(|e| (e.target_field.as_str(), e.order))
        .collect();
    assert_eq!(edges, vec![("RegionName", 1), ("CustomerRegionId", 0)]);
    assert_eq!(
        chain.head().selector,
        Selector::Dependency("CustomerRegionId".to_string())
    );
    assert_eq!(chain.head().attribute_kind, "regions");
    assert!(!chain.truncated);
}

#[test]
fn test_selector_kinds() {
    let graph = graph("OrderDto");
    let selector = |field: &str| graph.chain(field).unwrap().head().selector.clone();

    assert_eq!(selector("CustomerName"), Selector::Field("CustomerId".to_string()));
    assert_eq!(selector("HeadquartersName"), Selector::Literal("42".to_string()));
}

#[test]
fn test_selector_by_alias() {
    let graph = graph("SupplierDto");
    assert_eq!(
        graph.chain("SupplierTitle").unwrap().head().selector,
        Selector::Field("supplier_id".to_string())
    );
}

// ============================================================================
// Default Expressions
// ============================================================================

#[test]
fn test_default_expression_is_display_field() {
    let graph = graph("OrderDto");
    assert_eq!(graph.chain("CustomerName").unwrap().head().expression, "Name");
    assert_eq!(graph.chain("CustomerRegionId").unwrap().head().expression, "RegionId");
}

#[test]
fn test_default_expression_uses_exposed_name() {
    let graph = graph("SupplierDto");
    assert_eq!(graph.chain("SupplierTitle").unwrap().head().expression, "Title");
}

#[test]
fn test_missing_default_expression() {
    let err = build_graph(&registry(), "Tagged", CyclePolicy::Truncate).unwrap_err();
    assert_eq!(
        err,
        GraphError::MissingExpression {
            type_name: "Tagged".to_string(),
            field: "TagLabel".to_string(),
        }
    );
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn test_cycle_is_truncated() {
    let graph = graph("Loop");

    let a = graph.chain("A").unwrap();
    assert!(a.truncated);
    assert_eq!(a.order, 1);
    assert_eq!(a.head().selector, Selector::Dependency("B".to_string()));

    let label = graph.chain("Label").unwrap();
    assert!(label.truncated);
    assert_eq!(label.order, 2);

    assert!(graph.cycles.contains(&vec!["A".to_string(), "B".to_string(), "A".to_string()]));
}

#[test]
fn test_cycle_rejected_by_policy() {
    let err = build_graph(&registry(), "Loop", CyclePolicy::Reject).unwrap_err();
    assert_eq!(
        err,
        GraphError::Cycle {
            type_name: "Loop".to_string(),
            path: vec!["A".to_string(), "B".to_string(), "A".to_string()],
        }
    );
    assert_eq!(err.to_string(), "selector cycle on type 'Loop': A -> B -> A");
}

#[test]
fn test_cycle_policy_from_engine_config() {
    let config = EngineConfig::new().with_cycle_policy(CyclePolicy::Reject);
    let engine = Engine::with_config(registry(), config);
    assert!(matches!(engine.graph("Loop"), Err(GraphError::Cycle { .. })));
    assert!(engine.graph("OrderDto").is_ok());
}

// ============================================================================
// Engine Integration
// ============================================================================

#[test]
fn test_undecorated_type_has_empty_graph() {
    let graph = graph("Customer");
    assert!(graph.is_empty());
    assert_eq!(graph.max_order(), None);
}

#[test]
fn test_unknown_type() {
    assert_eq!(
        build_graph(&registry(), "Nope", CyclePolicy::Truncate).unwrap_err(),
        GraphError::UnknownType("Nope".to_string())
    );
}

#[test]
fn test_engine_caches_graphs() {
    let engine = Engine::new(registry());
    let first = engine.graph("OrderDto").unwrap();
    let second = engine.graph("OrderDto").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}
