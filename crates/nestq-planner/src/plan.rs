//! Compiled, immutable plan for one request.
//!
//! The tree mirrors the descriptor: one `CollectionPlan` per requested
//! sequence, one `AggregationPlan` per aggregate selection. Nothing here
//! refers to a data source.

use nestq_core::hash::Hash256;
use nestq_core::path::FieldPath;
use nestq_core::query::QueryDescriptor;
use nestq_core::schema::{DataType, Schema};
use nestq_operators::{AggregatePipeline, CollectionOp, FlattenPlan};

#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub source: String,
    /// blake3 of the serialized descriptor.
    pub fingerprint: Hash256,
    pub descriptor: QueryDescriptor,
    pub body: PlanBody,
}

impl QueryPlan {
    /// Schema of each produced record.
    pub fn output_schema(&self) -> &Schema {
        match &self.body {
            PlanBody::Collection(c) => &c.output,
            PlanBody::Aggregate(a) => a.output_schema(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PlanBody {
    Collection(CollectionPlan),
    Aggregate(AggregationPlan),
}

#[derive(Debug, Clone)]
pub struct CollectionPlan {
    /// Dotted location from the root, for logs and errors.
    pub path: String,
    pub element: Schema,
    pub op: CollectionOp,
    /// Empty keeps every element field unchanged.
    pub select: Vec<SelectionPlan>,
    pub flatten: Option<FlattenPlan>,
    pub output: Schema,
}

impl CollectionPlan {
    pub fn selects_all(&self) -> bool {
        self.select.is_empty()
    }

    /// True when any element needs work beyond the fetched record itself.
    pub fn has_nested(&self) -> bool {
        self.select.iter().any(SelectionPlan::is_nested)
    }
}

#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub path: String,
    pub element: Schema,
    pub pipeline: AggregatePipeline,
}

impl AggregationPlan {
    pub fn output_schema(&self) -> &Schema {
        self.pipeline.group.output_schema()
    }
}

#[derive(Debug, Clone)]
pub enum SelectionPlan {
    Field {
        path: FieldPath,
        name: String,
        data_type: DataType,
    },
    Collection {
        path: FieldPath,
        name: String,
        plan: Box<CollectionPlan>,
    },
    Aggregate {
        path: FieldPath,
        name: String,
        plan: Box<AggregationPlan>,
    },
}

impl SelectionPlan {
    pub fn name(&self) -> &str {
        match self {
            SelectionPlan::Field { name, .. }
            | SelectionPlan::Collection { name, .. }
            | SelectionPlan::Aggregate { name, .. } => name,
        }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            SelectionPlan::Field { path, .. }
            | SelectionPlan::Collection { path, .. }
            | SelectionPlan::Aggregate { path, .. } => path,
        }
    }

    pub fn is_nested(&self) -> bool {
        !matches!(self, SelectionPlan::Field { .. })
    }
}
