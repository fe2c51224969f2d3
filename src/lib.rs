pub mod accessor;
pub mod ast;
pub mod builder;
pub mod config;
pub mod convert;
pub mod engine;
pub mod fetch;
pub mod graph;
pub mod lexer;
pub mod parser;
pub mod path;
pub mod resolver;
pub mod schema;
pub mod value;

pub use accessor::{Accessor, AccessorError, TypeAccessorCache, TypeAccessors};
pub use ast::{ExpressionNode, Token, TokenKind};
pub use builder::{BuildError, CompiledExpression, EvalError, ExpressionBuildContext, build};
pub use config::{CyclePolicy, EngineConfig, PartialRangePolicy};
pub use engine::{Engine, RuntimeParameters};
pub use fetch::{FetchBoundary, FetchError, FetchRequest, FetchedEntity, InMemorySource};
pub use graph::{
    DependencyChain, DependencyEdge, DependencyGraph, GraphError, Selector, build_graph,
};
pub use lexer::{Lexer, tokenize};
pub use parser::{ParseError, Parser, parse};
pub use path::{InstancePath, PathSegment};
pub use resolver::{DecodeError, ResolveError, ResolveOptions, ResolveReport, Resolver};
pub use schema::{
    FetchDecoration, FieldDescriptor, SchemaError, TypeDescriptor, TypeRegistry, ValueType,
};
pub use value::Value;
