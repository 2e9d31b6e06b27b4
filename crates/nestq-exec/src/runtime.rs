//! Runtime: evaluate a `QueryPlan` against one read session.
//!
//! Behavior:
//! - Opens exactly one `ReadSession` per request and shares it read-only
//!   across every branch of that request.
//! - Each sequence is fetched once with the negotiated stage prefix; the
//!   remaining stages run in memory through the same compiled operators.
//! - Nested selections are evaluated per element and only when selected.
//! - Flatten runs in two phases: children are evaluated (possibly in
//!   parallel, cancellable), then combined synchronously.
//! - Any error discards the whole result.

use std::time::Instant;

use thiserror::Error;

use nestq_core::cancel::RequestContext;
use nestq_core::config::EngineConfig;
use nestq_core::error::ExecError;
use nestq_core::query::QueryDescriptor;
use nestq_core::types::{Record, Scalar, Value};

use nestq_operators::predicate::filter_rows;
use nestq_operators::{
    Capabilities, CountPlan, CountSource, DataSource, EvalEnv, Operator, Pushdown, ReadSession,
    SequenceRef,
};

use nestq_planner::{
    compile_query, AggregationPlan, Catalog, CollectionPlan, PlanBody, PlanError, QueryPlan,
    SelectionPlan,
};

use crate::metrics::{emit_stats, Counters, ExecStats};
use crate::pushdown::{aggregate_route, count_route, effective_capabilities, record_pushed, Route};
use crate::scheduler::run_branches;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

/// Stateless between calls; holds configuration only.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    cfg: EngineConfig,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    /// Compile and execute in one step.
    pub fn query(
        &self,
        desc: &QueryDescriptor,
        catalog: &Catalog,
        source: &dyn DataSource,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, EngineError> {
        let plan = compile_query(desc, catalog)?;
        Ok(self.execute(&plan, source, ctx)?)
    }

    pub fn execute(
        &self,
        plan: &QueryPlan,
        source: &dyn DataSource,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        self.execute_with_stats(plan, source, ctx).map(|(rows, _)| rows)
    }

    pub fn execute_with_stats(
        &self,
        plan: &QueryPlan,
        source: &dyn DataSource,
        ctx: &RequestContext,
    ) -> Result<(Vec<Record>, ExecStats), ExecError> {
        let ctx = match self.cfg.timeout() {
            Some(t) => ctx.clone().with_timeout(t),
            None => ctx.clone(),
        };
        let started = Instant::now();
        let request = ctx.id().to_string();

        #[cfg(feature = "tracing")]
        tracing::info!(
            %request,
            source = %source.name(),
            root = %plan.source,
            fingerprint = %plan.fingerprint.short(),
            "request start"
        );

        ctx.checkpoint()?;
        let session = source.open(&ctx)?;
        let counters = Counters::default();
        let runner = Runner {
            session: session.as_ref(),
            caps: effective_capabilities(&self.cfg, session.capabilities()),
            max_parallel: self.cfg.max_parallel_tasks.max(1),
            counters: &counters,
        };

        let root = SequenceRef::Root(&plan.source);
        let result = match &plan.body {
            PlanBody::Collection(c) => runner.collection(root, c, &ctx),
            PlanBody::Aggregate(a) => runner.aggregate(root, a, &ctx),
        };

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%request, error = %e, "request failed");
                return Err(e);
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let stats = counters.snapshot(rows.len(), elapsed_ms);
        emit_stats(&request, &stats);

        #[cfg(feature = "tracing")]
        tracing::info!(%request, rows = rows.len(), elapsed_ms, "request finished");

        Ok((rows, stats))
    }
}

struct Runner<'a> {
    session: &'a dyn ReadSession,
    caps: Capabilities,
    max_parallel: usize,
    counters: &'a Counters,
}

impl Runner<'_> {
    fn fetch(
        &self,
        seq: SequenceRef<'_>,
        push: &Pushdown<'_>,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        ctx.checkpoint()?;
        Counters::bump(&self.counters.fetches);
        self.session.fetch(seq, push, ctx)
    }

    fn collection(
        &self,
        seq: SequenceRef<'_>,
        plan: &CollectionPlan,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        let (push, pushed) = plan.op.negotiate(self.caps, &plan.element);
        let rows = self.fetch(seq, &push, ctx)?;
        record_pushed(self.counters, pushed);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            path = %plan.path,
            fetched = rows.len(),
            filter = pushed.filter,
            order = pushed.order,
            slice = pushed.window,
            "fetched sequence"
        );

        let counts = SessionCounts { runner: self, ctx };
        let rows = plan.op.finish(rows, pushed, &EvalEnv::new(ctx, &counts))?;

        if plan.selects_all() && plan.flatten.is_none() {
            return Ok(rows);
        }
        let mut out = Vec::with_capacity(rows.len());
        for rec in &rows {
            ctx.checkpoint()?;
            out.extend(self.element(rec, plan, ctx)?);
        }
        Ok(out)
    }

    /// Output for one element: one record, or its flattened rows.
    fn element(
        &self,
        rec: &Record,
        plan: &CollectionPlan,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        let nested: Vec<&SelectionPlan> = plan.select.iter().filter(|s| s.is_nested()).collect();
        let mut children = run_branches(ctx, self.max_parallel, &nested, |sel, branch| {
            self.selection(rec, sel, branch)
        })?
        .into_iter();

        let mut out = Record::new();
        let mut flattened: Vec<(&str, Vec<Record>)> = Vec::new();
        for sel in &plan.select {
            match sel {
                SelectionPlan::Field { path, name, .. } => {
                    let value = rec
                        .resolve(path)
                        .cloned()
                        .unwrap_or(Value::Scalar(Scalar::Null));
                    out.push(name.clone(), value);
                }
                SelectionPlan::Collection { name, .. } | SelectionPlan::Aggregate { name, .. } => {
                    let rows = children.next().unwrap_or_default();
                    if plan.flatten.is_some() {
                        flattened.push((name.as_str(), rows));
                    } else {
                        out.push(name.clone(), rows);
                    }
                }
            }
        }

        let Some(flatten) = &plan.flatten else {
            return Ok(vec![out]);
        };
        // A child may be listed under several prefixes; each listing gets its
        // own copy of the evaluated rows.
        let mut inputs = Vec::with_capacity(flattened.len());
        for child in flatten.child_fields() {
            let rows = flattened
                .iter()
                .find(|(n, _)| *n == child)
                .map(|(_, rows)| rows.clone())
                .unwrap_or_default();
            inputs.push(rows);
        }
        ctx.checkpoint()?;
        let rows = flatten.combine(&out, &inputs);
        Counters::add(&self.counters.flatten_rows, rows.len());

        #[cfg(feature = "tracing")]
        tracing::trace!(path = %plan.path, rows = rows.len(), "flattened element");

        Ok(rows)
    }

    fn selection(
        &self,
        parent: &Record,
        sel: &SelectionPlan,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        match sel {
            SelectionPlan::Collection { path, plan, .. } => {
                self.collection(SequenceRef::Nested { parent, path }, plan, ctx)
            }
            SelectionPlan::Aggregate { path, plan, .. } => {
                self.aggregate(SequenceRef::Nested { parent, path }, plan, ctx)
            }
            SelectionPlan::Field { .. } => Ok(Vec::new()),
        }
    }

    fn aggregate(
        &self,
        seq: SequenceRef<'_>,
        plan: &AggregationPlan,
        ctx: &RequestContext,
    ) -> Result<Vec<Record>, ExecError> {
        let filter = plan.pipeline.filter.as_ref();
        let needs_counts =
            filter.is_some_and(|p| p.has_counts()) || plan.pipeline.group.has_counts();
        let pushable = filter.is_some_and(|p| self.caps.count || !p.has_counts());
        match aggregate_route(self.caps, pushable, needs_counts) {
            Route::Native => {
                ctx.checkpoint()?;
                Counters::bump(&self.counters.native_aggregates);
                self.session
                    .group_aggregate(seq, &plan.element, filter, &plan.pipeline.group, ctx)
            }
            Route::Fetch { push_filter } => {
                Counters::bump(&self.counters.fallback_aggregates);
                let push = Pushdown {
                    filter: filter.filter(|_| push_filter),
                    ..Pushdown::scan(&plan.element)
                };
                let rows = self.fetch(seq, &push, ctx)?;
                if push_filter {
                    Counters::bump(&self.counters.pushed_filters);
                }
                let counts = SessionCounts { runner: self, ctx };
                let env = EvalEnv::new(ctx, &counts);
                let base = match filter {
                    Some(p) if !push_filter => filter_rows(p, rows, &env)?,
                    _ => rows,
                };
                plan.pipeline.group.eval(base, &env)
            }
        }
    }
}

/// Resolves collection counts through the request's session.
struct SessionCounts<'r, 'a> {
    runner: &'r Runner<'a>,
    ctx: &'r RequestContext,
}

impl CountSource for SessionCounts<'_, '_> {
    fn count(&self, parent: &Record, plan: &CountPlan) -> Result<u64, ExecError> {
        let runner = self.runner;
        let ctx = self.ctx;
        let seq = SequenceRef::Nested {
            parent,
            path: &plan.path,
        };
        let pushable = plan
            .inner
            .as_ref()
            .is_some_and(|p| runner.caps.count || !p.has_counts());
        match count_route(runner.caps, pushable) {
            Route::Native => {
                ctx.checkpoint()?;
                Counters::bump(&runner.counters.native_counts);
                runner
                    .session
                    .count(seq, &plan.element, plan.inner.as_ref(), ctx)
            }
            Route::Fetch { push_filter } => {
                Counters::bump(&runner.counters.fallback_counts);
                #[cfg(feature = "tracing")]
                tracing::trace!(path = %plan.path, push_filter, "count fallback");
                let push = Pushdown {
                    filter: plan.inner.as_ref().filter(|_| push_filter),
                    ..Pushdown::scan(&plan.element)
                };
                let rows = runner.fetch(seq, &push, ctx)?;
                let n = match (&plan.inner, push_filter) {
                    (Some(inner), false) => {
                        filter_rows(inner, rows, &EvalEnv::new(ctx, self))?.len()
                    }
                    _ => rows.len(),
                };
                Ok(n as u64)
            }
        }
    }
}
