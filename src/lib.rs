#![forbid(unsafe_code)]
//! nestq: composable filter / sort / slice / count / aggregate / flatten
//! operators over nested record trees, with opportunistic pushdown to the
//! data source.
//!
//! This crate only re-exports the workspace members:
//! - [`core`]: values, schemas, query descriptors, errors, config.
//! - [`operators`]: the compiled operators and the data source traits.
//! - [`planner`]: catalog registration, descriptor compilation, YAML/JSON.
//! - [`io`]: the in-memory adapter and JSON readers/writers.
//! - [`exec`]: the engine.

pub use nestq_core as core;
pub use nestq_exec as exec;
pub use nestq_io as io;
pub use nestq_operators as operators;
pub use nestq_planner as planner;

pub use nestq_exec::{Engine, EngineError, ExecStats};
