#![forbid(unsafe_code)]
//! nestq-core: the shared vocabulary of the engine.
//!
//! - `types`: scalars, values, and tree-shaped records.
//! - `schema`: declared field types used for compile-time validation.
//! - `path`: dotted field references.
//! - `query`: the immutable Query Descriptor tree consumed by the planner.
//! - `error`, `config`, `cancel`, `hash`: ambient concerns shared by every crate.
//!
//! No operator logic and no I/O live here.

pub mod cancel;
pub mod config;
pub mod error;
pub mod hash;
pub mod path;
pub mod prelude;
pub mod query;
pub mod schema;
pub mod types;
