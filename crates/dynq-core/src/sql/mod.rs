//! MySQL statement builder.

pub mod expr;
pub mod helpers;
pub mod query;
pub mod selector;

pub use expr::{AggregateFn, Combinator, CompareOp, Expr, ParamMap, Predicate};
pub use query::{Join, JoinKind, Query, SortDirection, Statement};
pub use selector::Selector;
