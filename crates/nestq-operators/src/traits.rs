//! Operator trait + the data source interfaces.
//!
//! The engine compiles each operator once, then calls `eval` with a
//! materialized sequence. Data sources expose a per-request `ReadSession`
//! whose capabilities decide which stages are pushed down; whatever the
//! session does not offer is evaluated here in memory, with identical
//! observable results.

use serde::{Deserialize, Serialize};

use nestq_core::cancel::RequestContext;
use nestq_core::error::ExecError;
use nestq_core::path::FieldPath;
use nestq_core::schema::Schema;
use nestq_core::types::Record;

use crate::aggregate::GroupPlan;
use crate::count::CountPlan;
use crate::predicate::CompiledPredicate;
use crate::slice::Window;
use crate::sort::SortPlan;

/// What an in-memory operator may need while evaluating.
#[derive(Clone, Copy)]
pub struct EvalEnv<'a> {
    pub ctx: &'a RequestContext,
    /// Resolves `collection_count` terms met during filtering.
    pub counts: &'a dyn CountSource,
}

impl<'a> EvalEnv<'a> {
    pub fn new(ctx: &'a RequestContext, counts: &'a dyn CountSource) -> Self {
        Self { ctx, counts }
    }
}

/// Trait that every sequence-to-sequence operator implements.
///
/// Invariants:
/// - `eval` is deterministic given the same input.
/// - Output never contains elements absent from the input unless the
///   operator synthesizes them (aggregation).
pub trait Operator: Send + Sync {
    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str;

    fn eval(&self, input: Vec<Record>, env: &EvalEnv<'_>) -> Result<Vec<Record>, ExecError>;
}

/// Cardinality of a nested collection for one parent element.
pub trait CountSource: Sync {
    fn count(&self, parent: &Record, plan: &CountPlan) -> Result<u64, ExecError>;
}

/// Native capabilities a read session offers. Each one is independently
/// optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub count: bool,
    pub filter: bool,
    pub sort: bool,
    pub slice: bool,
    pub group_aggregate: bool,
}

impl Capabilities {
    pub const NONE: Capabilities = Capabilities {
        count: false,
        filter: false,
        sort: false,
        slice: false,
        group_aggregate: false,
    };

    pub const ALL: Capabilities = Capabilities {
        count: true,
        filter: true,
        sort: true,
        slice: true,
        group_aggregate: true,
    };
}

/// A sequence the engine asks a session for.
#[derive(Debug, Clone, Copy)]
pub enum SequenceRef<'a> {
    /// A top-level collection exposed by the source.
    Root(&'a str),
    /// The sequence-valued field at `path` of an already fetched record.
    Nested {
        parent: &'a Record,
        path: &'a FieldPath,
    },
}

/// Stages the engine asks a session to apply natively.
///
/// A stage is only present when every earlier stage (filter, then sort, then
/// slice) is present or absent from the request altogether; sessions must
/// apply exactly what is present.
#[derive(Clone, Copy)]
pub struct Pushdown<'a> {
    pub element: &'a Schema,
    pub filter: Option<&'a CompiledPredicate>,
    pub order: Option<&'a SortPlan>,
    pub window: Option<Window>,
}

impl<'a> Pushdown<'a> {
    /// Plain materialization.
    pub fn scan(element: &'a Schema) -> Self {
        Self {
            element,
            filter: None,
            order: None,
            window: None,
        }
    }
}

/// Per-request read session. Shared read-only by sibling operators of one
/// request; never shared across requests.
pub trait ReadSession: Sync {
    fn capabilities(&self) -> Capabilities;

    /// Materialize `seq` after applying the requested stages.
    ///
    /// Without a pushed order, elements must come back in stable storage
    /// order: order-sensitive aggregates rely on it.
    fn fetch(
        &self,
        seq: SequenceRef<'_>,
        pushdown: &Pushdown<'_>,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError>;

    /// Native cardinality. Only called when `capabilities().count` is set.
    fn count(
        &self,
        _seq: SequenceRef<'_>,
        _element: &Schema,
        _filter: Option<&CompiledPredicate>,
        _ctx: &RequestContext,
    ) -> Result<u64, ExecError> {
        Err(ExecError::SourceUnavailable(
            "native count not supported".into(),
        ))
    }

    /// Native outer filter + group pipeline. Only called when
    /// `capabilities().group_aggregate` is set; must return finished
    /// GroupResult records (having/order/slice applied).
    fn group_aggregate(
        &self,
        _seq: SequenceRef<'_>,
        _element: &Schema,
        _filter: Option<&CompiledPredicate>,
        _group: &GroupPlan,
        _ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        Err(ExecError::SourceUnavailable(
            "native group aggregate not supported".into(),
        ))
    }
}

/// A source of record trees.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Open the read session for one request.
    fn open<'s>(&'s self, ctx: &RequestContext) -> Result<Box<dyn ReadSession + 's>, ExecError>;
}
