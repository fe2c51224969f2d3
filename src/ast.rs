//! # Field Expression Language - Abstract Syntax Tree
//!
//! A field expression describes how to reach data on a remote entity: which
//! properties to navigate, which elements of a collection to keep, how to
//! order and page them, what to aggregate and which shape to project.
//!
//! ## Modules
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (navigation, indexers, projections)
//! - **[operators]** - Boolean expressions used by filters and quantifiers
//! - **[functions]** - The closed registry of `:function` names
//!
//! ## Examples
//!
//! ### Navigation
//!
//! ```text
//! Customer.Address.City
//! Customer?.Address?.City      // null-safe
//! ```
//!
//! ### Filter, order and page
//!
//! ```text
//! Orders(Status = 'Open')[0 desc CreatedAt]
//! Orders[1 2 asc Total]
//! Users[${Skip|0} ${Take|10} asc Email]
//! ```
//!
//! ### Aggregates and string functions
//!
//! ```text
//! Orders:count
//! Orders:sum(Total)
//! Name:upper
//! ```
//!
//! ### Projections
//!
//! ```text
//! {Id, Name}
//! Customer.{Id, (Name:upper) as UpperName, Orders:count as OrderCount}
//! ```
pub mod expressions;
pub mod functions;
pub mod operators;
pub mod tokens;

pub use expressions::{
    ExpressionNode, FunctionArg, IndexMode, Literal, OrderDirection, Ordering, ProjectedField,
    PropertyRef, SingleIndex,
};
pub use functions::{ArgSpec, Function};
pub use operators::{BoolExpr, CompareOp, TextOp};
pub use tokens::{Token, TokenKind};
