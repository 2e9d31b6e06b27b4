#![forbid(unsafe_code)]
//! nestq-operators: the composable operators and the adapter seam.
//!
//! Design intent:
//! - Every operator compiles once against a `Schema` (pure, no data access)
//!   and then evaluates synchronously over materialized `Record` sequences.
//! - Compiled operators keep their descriptor so a data source can translate
//!   the same request into its own native form (`traits::ReadSession`).
//! - Recursion across nesting levels and suspension/cancellation live in
//!   `nestq-exec`; this crate only sees one sequence at a time.

pub mod aggregate;
pub mod collection;
pub mod count;
pub mod flatten;
pub mod predicate;
pub mod slice;
pub mod sort;
pub mod traits;

pub use aggregate::{AggregatePipeline, AggregatePlan, GroupPlan};
pub use collection::{CollectionOp, Pushed};
pub use count::{nested_records, CountPlan, InMemoryCounts};
pub use flatten::FlattenPlan;
pub use predicate::{CompiledPredicate, Filter};
pub use slice::Window;
pub use sort::SortPlan;
pub use traits::{
    Capabilities, CountSource, DataSource, EvalEnv, Operator, Pushdown, ReadSession, SequenceRef,
};
