//! In-memory data source.
//!
//! Holds complete record trees per root and serves nested sequences straight
//! from the parent record. Native capabilities are configurable; when one is
//! advertised, the session applies that stage itself using its own view of
//! the stored graph (counts included), so the engine never sees the
//! intermediate rows.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use nestq_core::cancel::RequestContext;
use nestq_core::error::ExecError;
use nestq_core::schema::Schema;
use nestq_core::types::Record;
use nestq_operators::{
    nested_records, Capabilities, CompiledPredicate, DataSource, EvalEnv, GroupPlan,
    InMemoryCounts, Operator, Pushdown, ReadSession, SequenceRef,
};

use crate::error::Result;
use crate::readers::json::read_dataset;

/// Adapter call counters, for observing what was pushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCalls {
    pub sessions: u64,
    pub fetches: u64,
    pub pushed_filters: u64,
    pub pushed_sorts: u64,
    pub pushed_slices: u64,
    pub counts: u64,
    pub group_aggregates: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sessions: AtomicU64,
    fetches: AtomicU64,
    pushed_filters: AtomicU64,
    pushed_sorts: AtomicU64,
    pushed_slices: AtomicU64,
    counts: AtomicU64,
    group_aggregates: AtomicU64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug)]
pub struct MemorySource {
    name: String,
    roots: BTreeMap<String, Vec<Record>>,
    caps: Capabilities,
    available: AtomicBool,
    /// Simulated latency per adapter call.
    delay: Option<Duration>,
    counters: Counters,
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            roots: BTreeMap::new(),
            caps: Capabilities::NONE,
            available: AtomicBool::new(true),
            delay: None,
            counters: Counters::default(),
        }
    }

    /// Load roots from a JSON dataset document.
    pub fn from_json<'s>(
        name: &str,
        src: &str,
        roots: impl IntoIterator<Item = (&'s str, &'s Schema)>,
    ) -> Result<Self> {
        let mut source = Self::new(name);
        source.roots = read_dataset(src, roots)?;
        Ok(source)
    }

    pub fn with_root(mut self, name: &str, records: Vec<Record>) -> Self {
        self.roots.insert(name.to_string(), records);
        self
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Toggle availability; new sessions fail while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn calls(&self) -> SourceCalls {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        SourceCalls {
            sessions: load(&c.sessions),
            fetches: load(&c.fetches),
            pushed_filters: load(&c.pushed_filters),
            pushed_sorts: load(&c.pushed_sorts),
            pushed_slices: load(&c.pushed_slices),
            counts: load(&c.counts),
            group_aggregates: load(&c.group_aggregates),
        }
    }

    fn sequence<'a>(&'a self, seq: SequenceRef<'a>) -> std::result::Result<Vec<&'a Record>, ExecError> {
        match seq {
            SequenceRef::Root(name) => self
                .roots
                .get(name)
                .map(|rs| rs.iter().collect())
                .ok_or_else(|| ExecError::SourceUnavailable(format!("no collection '{name}'"))),
            SequenceRef::Nested { parent, path } => nested_records(parent, path),
        }
    }
}

impl DataSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open<'s>(
        &'s self,
        ctx: &RequestContext,
    ) -> std::result::Result<Box<dyn ReadSession + 's>, ExecError> {
        ctx.checkpoint()?;
        if !self.available.load(Ordering::Acquire) {
            return Err(ExecError::SourceUnavailable(format!(
                "source '{}' is offline",
                self.name
            )));
        }
        bump(&self.counters.sessions);
        Ok(Box::new(MemorySession { source: self }))
    }
}

struct MemorySession<'s> {
    source: &'s MemorySource,
}

impl MemorySession<'_> {
    /// Latency + cancellation boundary shared by every call.
    fn enter(&self, ctx: &RequestContext) -> std::result::Result<(), ExecError> {
        ctx.checkpoint()?;
        if let Some(d) = self.source.delay {
            std::thread::sleep(d);
            ctx.checkpoint()?;
        }
        if !self.source.available.load(Ordering::Acquire) {
            return Err(ExecError::SourceUnavailable(format!(
                "source '{}' went offline",
                self.source.name
            )));
        }
        Ok(())
    }

    fn refuse(stage: &str) -> ExecError {
        ExecError::SourceUnavailable(format!("{stage} pushdown is not offered"))
    }
}

impl ReadSession for MemorySession<'_> {
    fn capabilities(&self) -> Capabilities {
        self.source.caps
    }

    fn fetch(
        &self,
        seq: SequenceRef<'_>,
        pushdown: &Pushdown<'_>,
        ctx: &RequestContext,
    ) -> std::result::Result<Vec<Record>, ExecError> {
        self.enter(ctx)?;
        let caps = self.source.caps;
        let counters = &self.source.counters;
        bump(&counters.fetches);

        let mut rows: Vec<Record> = match pushdown.filter {
            Some(pred) => {
                if !caps.filter {
                    return Err(Self::refuse("filter"));
                }
                if pred.has_counts() && !caps.count {
                    return Err(Self::refuse("count"));
                }
                bump(&counters.pushed_filters);
                let mut kept = Vec::new();
                for rec in self.source.sequence(seq)? {
                    if pred.eval(rec, &InMemoryCounts)? {
                        kept.push(rec.clone());
                    }
                }
                kept
            }
            None => self.source.sequence(seq)?.into_iter().cloned().collect(),
        };
        if let Some(order) = pushdown.order {
            if !caps.sort {
                return Err(Self::refuse("sort"));
            }
            bump(&counters.pushed_sorts);
            order.sort_in_place(&mut rows);
        }
        if let Some(window) = pushdown.window {
            if !caps.slice {
                return Err(Self::refuse("slice"));
            }
            bump(&counters.pushed_slices);
            rows = window.apply(rows);
        }
        Ok(rows)
    }

    fn count(
        &self,
        seq: SequenceRef<'_>,
        _element: &Schema,
        filter: Option<&CompiledPredicate>,
        ctx: &RequestContext,
    ) -> std::result::Result<u64, ExecError> {
        if !self.source.caps.count {
            return Err(Self::refuse("count"));
        }
        self.enter(ctx)?;
        bump(&self.source.counters.counts);
        let mut n = 0u64;
        for rec in self.source.sequence(seq)? {
            let keep = match filter {
                Some(p) => p.eval(rec, &InMemoryCounts)?,
                None => true,
            };
            if keep {
                n += 1;
            }
        }
        Ok(n)
    }

    fn group_aggregate(
        &self,
        seq: SequenceRef<'_>,
        _element: &Schema,
        filter: Option<&CompiledPredicate>,
        group: &GroupPlan,
        ctx: &RequestContext,
    ) -> std::result::Result<Vec<Record>, ExecError> {
        if !self.source.caps.group_aggregate {
            return Err(Self::refuse("group aggregate"));
        }
        let counted = filter.is_some_and(CompiledPredicate::has_counts) || group.has_counts();
        if counted && !self.source.caps.count {
            return Err(Self::refuse("count"));
        }
        self.enter(ctx)?;
        bump(&self.source.counters.group_aggregates);
        let mut base = Vec::new();
        for rec in self.source.sequence(seq)? {
            let keep = match filter {
                Some(p) => p.eval(rec, &InMemoryCounts)?,
                None => true,
            };
            if keep {
                base.push(rec.clone());
            }
        }
        group.eval(base, &EvalEnv::new(ctx, &InMemoryCounts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestq_core::query::{CompareOp, Predicate};
    use nestq_core::schema::{DataType, Field};
    use nestq_operators::predicate;

    fn source(caps: Capabilities) -> MemorySource {
        MemorySource::new("mem")
            .with_root(
                "t",
                (1..=4).map(|i| Record::new().with("n", i as i64)).collect(),
            )
            .with_capabilities(caps)
    }

    #[test]
    fn refuses_stages_it_does_not_offer() {
        let src = source(Capabilities::NONE);
        let ctx = RequestContext::new();
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, false)]);
        let pred = predicate::compile(&Predicate::cmp("n", CompareOp::Gt, 2i64), &schema)
            .expect("compile");
        let session = src.open(&ctx).expect("open");
        let push = Pushdown {
            filter: Some(&pred),
            ..Pushdown::scan(&schema)
        };
        assert!(matches!(
            session.fetch(SequenceRef::Root("t"), &push, &ctx),
            Err(ExecError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn native_filter_is_counted() {
        let src = source(Capabilities::ALL);
        let ctx = RequestContext::new();
        let schema = Schema::new(vec![Field::new("n", DataType::Int64, false)]);
        let pred = predicate::compile(&Predicate::cmp("n", CompareOp::Gt, 2i64), &schema)
            .expect("compile");
        let session = src.open(&ctx).expect("open");
        let push = Pushdown {
            filter: Some(&pred),
            ..Pushdown::scan(&schema)
        };
        let rows = session
            .fetch(SequenceRef::Root("t"), &push, &ctx)
            .expect("fetch");
        assert_eq!(rows.len(), 2);
        assert_eq!(src.calls().pushed_filters, 1);
    }

    #[test]
    fn offline_sources_fail_to_open() {
        let src = source(Capabilities::NONE);
        src.set_available(false);
        assert!(matches!(
            src.open(&RequestContext::new()),
            Err(ExecError::SourceUnavailable(_))
        ));
    }
}
