//! Convenient re-exports for downstream crates.

pub use crate::cancel::{CancelToken, RequestContext};
pub use crate::config::EngineConfig;
pub use crate::error::{CompileError, Error, ExecError, Result};
pub use crate::hash::{hash_serde, Hash256};
pub use crate::path::FieldPath;
pub use crate::query::{
    AggregateFunction, AggregateKind, AggregateQuery, CollectionQuery, CompareOp, FlattenPath,
    FlattenSpec, GroupSpec, Predicate, QueryBody, QueryDescriptor, Selection, SliceSpec,
    SortDirection, SortKey, SortSpec,
};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{Record, Scalar, Value};
