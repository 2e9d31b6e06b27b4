//! The Query Descriptor: an immutable, serializable request tree.
//!
//! A host layer assembles one descriptor per call; the planner compiles it
//! against a catalog and the engine evaluates the resulting plan. Nothing in
//! here knows how data is fetched.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::path::FieldPath;
use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    /// True for the operators that need an orderable operand type.
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte
        )
    }

    /// Whether `lhs <op> rhs` holds given `lhs.cmp(rhs)`.
    pub fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Neq => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// Boolean expression tree over record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Comparison {
        path: FieldPath,
        op: CompareOp,
        value: Scalar,
    },
    And {
        terms: Vec<Predicate>,
    },
    Or {
        terms: Vec<Predicate>,
    },
    Not {
        term: Box<Predicate>,
    },
    /// Filters the *outer* element by the cardinality of a nested collection.
    /// `inner` filters only the nested collection.
    CollectionCount {
        path: FieldPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inner: Option<Box<Predicate>>,
        op: CompareOp,
        value: u64,
    },
}

impl Predicate {
    pub fn cmp(path: &str, op: CompareOp, value: impl Into<Scalar>) -> Self {
        Predicate::Comparison {
            path: FieldPath::from(path),
            op,
            value: value.into(),
        }
    }

    pub fn and(terms: Vec<Predicate>) -> Self {
        Predicate::And { terms }
    }

    pub fn or(terms: Vec<Predicate>) -> Self {
        Predicate::Or { terms }
    }

    pub fn negate(term: Predicate) -> Self {
        Predicate::Not {
            term: Box::new(term),
        }
    }

    pub fn count(path: &str, inner: Option<Predicate>, op: CompareOp, value: u64) -> Self {
        Predicate::CollectionCount {
            path: FieldPath::from(path),
            inner: inner.map(Box::new),
            op,
            value,
        }
    }

    /// True when any node is a `CollectionCount`.
    pub fn has_collection_count(&self) -> bool {
        match self {
            Predicate::Comparison { .. } => false,
            Predicate::And { terms } | Predicate::Or { terms } => {
                terms.iter().any(Predicate::has_collection_count)
            }
            Predicate::Not { term } => term.has_collection_count(),
            Predicate::CollectionCount { .. } => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub path: FieldPath,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(path: &str) -> Self {
        Self {
            path: FieldPath::from(path),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(path: &str) -> Self {
        Self {
            path: FieldPath::from(path),
            direction: SortDirection::Desc,
        }
    }
}

/// Ordered keys; the first is primary.
pub type SortSpec = Vec<SortKey>;

/// Windowing request as supplied by the host. Values are signed so that
/// negative input is reported instead of wrapped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<i64>,
}

impl SliceSpec {
    pub fn skip_take(skip: i64, take: Option<i64>) -> Self {
        Self {
            skip: Some(skip),
            take,
            ..Self::default()
        }
    }

    pub fn first(n: i64) -> Self {
        Self {
            first: Some(n),
            ..Self::default()
        }
    }

    pub fn last(n: i64) -> Self {
        Self {
            last: Some(n),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    StringAgg,
}

impl AggregateKind {
    pub fn name(self) -> &'static str {
        match self {
            AggregateKind::Count => "count",
            AggregateKind::Sum => "sum",
            AggregateKind::Avg => "avg",
            AggregateKind::Min => "min",
            AggregateKind::Max => "max",
            AggregateKind::StringAgg => "string_agg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateFunction {
    pub kind: AggregateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<FieldPath>,
    /// Applied to the group's members for this function only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Member order for `string_agg`; other kinds are order-insensitive.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: SortSpec,
    pub alias: String,
}

impl AggregateFunction {
    pub fn new(kind: AggregateKind, target: Option<&str>, alias: &str) -> Self {
        Self {
            kind,
            target: target.map(FieldPath::from),
            filter: None,
            separator: None,
            order: Vec::new(),
            alias: alias.to_string(),
        }
    }

    pub fn count(alias: &str) -> Self {
        Self::new(AggregateKind::Count, None, alias)
    }

    pub fn string_agg(target: &str, separator: &str, alias: &str) -> Self {
        Self {
            separator: Some(separator.to_string()),
            ..Self::new(AggregateKind::StringAgg, Some(target), alias)
        }
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: SortSpec) -> Self {
        self.order = order;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default)]
    pub keys: Vec<FieldPath>,
    pub aggregates: Vec<AggregateFunction>,
    /// Over aliases and group keys only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Predicate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: SortSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenPath {
    /// Output name of a sibling collection or aggregate selection.
    pub child_field: String,
    pub prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenSpec {
    pub paths: Vec<FlattenPath>,
}

impl FlattenSpec {
    pub fn new(paths: &[(&str, &str)]) -> Self {
        Self {
            paths: paths
                .iter()
                .map(|(child, prefix)| FlattenPath {
                    child_field: child.to_string(),
                    prefix: prefix.to_string(),
                })
                .collect(),
        }
    }
}

/// Where / Order / Slice over one sequence, plus what to produce per element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub order: SortSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slice: Option<SliceSpec>,
    /// Empty selects every source field unchanged.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select: Vec<Selection>,
    /// Replaces each element by the cross product of the named sibling results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten: Option<FlattenSpec>,
}

impl CollectionQuery {
    pub fn filtered(filter: Predicate) -> Self {
        Self {
            filter: Some(filter),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateQuery {
    /// Outer Where, applied before grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Predicate>,
    pub group: GroupSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    /// Copy a value as stored.
    Field {
        path: FieldPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Collection {
        path: FieldPath,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(default)]
        query: CollectionQuery,
    },
    Aggregate {
        path: FieldPath,
        alias: String,
        query: AggregateQuery,
    },
}

impl Selection {
    pub fn field(path: &str) -> Self {
        Selection::Field {
            path: FieldPath::from(path),
            alias: None,
        }
    }

    pub fn collection(path: &str, query: CollectionQuery) -> Self {
        Selection::Collection {
            path: FieldPath::from(path),
            alias: None,
            query,
        }
    }

    pub fn aggregate(path: &str, alias: &str, query: AggregateQuery) -> Self {
        Selection::Aggregate {
            path: FieldPath::from(path),
            alias: alias.to_string(),
            query,
        }
    }

    pub fn path(&self) -> &FieldPath {
        match self {
            Selection::Field { path, .. }
            | Selection::Collection { path, .. }
            | Selection::Aggregate { path, .. } => path,
        }
    }

    /// Name of the produced field: the alias, or the path's last segment.
    pub fn output_name(&self) -> String {
        match self {
            Selection::Field { path, alias } | Selection::Collection { path, alias, .. } => alias
                .clone()
                .unwrap_or_else(|| path.last().unwrap_or_default().to_string()),
            Selection::Aggregate { alias, .. } => alias.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryBody {
    Collection(CollectionQuery),
    Aggregate(AggregateQuery),
}

/// Full request: a root sequence exposed by the data source and what to do
/// with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub source: String,
    #[serde(flatten)]
    pub body: QueryBody,
}

impl QueryDescriptor {
    pub fn collection(source: &str, query: CollectionQuery) -> Self {
        Self {
            source: source.to_string(),
            body: QueryBody::Collection(query),
        }
    }

    pub fn aggregate(source: &str, query: AggregateQuery) -> Self {
        Self {
            source: source.to_string(),
            body: QueryBody::Aggregate(query),
        }
    }
}
