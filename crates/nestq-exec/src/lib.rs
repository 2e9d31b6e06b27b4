#![forbid(unsafe_code)]
//! nestq-exec: evaluates a compiled `QueryPlan` against a data source.
//!
//! One read session per request. Each requested sequence is fetched with the
//! longest stage prefix the session can apply natively; the rest runs in
//! memory. Sibling selections of one parent may run on scoped threads, and
//! every adapter call and flatten branch passes a cancellation checkpoint.

pub mod metrics;
pub mod pushdown;
pub mod runtime;
pub mod scheduler;

pub use metrics::ExecStats;
pub use runtime::{Engine, EngineError};
