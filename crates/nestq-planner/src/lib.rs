#![forbid(unsafe_code)]
//! nestq-planner: catalog + query descriptor → validated `QueryPlan`.
//!
//! Design:
//! - `catalog` runs the one-time registration pass over declared
//!   sequence-valued fields.
//! - `compile` validates a descriptor against the catalog without touching
//!   data and binds every nested selection to compiled operators.
//! - `dsl` parses descriptors and schemas from YAML/JSON; `explain` renders
//!   a plan tree for humans.

pub mod catalog;
pub mod compile;
pub mod dsl;
pub mod error;
pub mod explain;
pub mod plan;

pub use catalog::{Catalog, CollectionField, OperatorSet};
pub use compile::compile_query;
pub use dsl::yaml::{parse_catalog_yaml, parse_query, parse_query_json, parse_query_yaml};
pub use error::PlanError;
pub use explain::explain;
pub use plan::{AggregationPlan, CollectionPlan, PlanBody, QueryPlan, SelectionPlan};
