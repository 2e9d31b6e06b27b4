//! Human-readable plan rendering (`nestq explain`).

use std::fmt::Write as _;

use nestq_core::query::{Predicate, SortDirection, SortSpec};
use nestq_operators::slice::Window;
use nestq_operators::GroupPlan;

use crate::plan::{AggregationPlan, CollectionPlan, PlanBody, QueryPlan, SelectionPlan};

pub fn explain(plan: &QueryPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "query {} [{}]", plan.source, plan.fingerprint.short());
    match &plan.body {
        PlanBody::Collection(c) => collection(&mut out, c, 1),
        PlanBody::Aggregate(a) => aggregation(&mut out, a, 1),
    }
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    let _ = writeln!(out, "{}{}", "  ".repeat(depth), text);
}

fn collection(out: &mut String, plan: &CollectionPlan, depth: usize) {
    line(out, depth, &format!("collection {}", plan.path));
    if let Some(f) = &plan.op.filter {
        line(out, depth + 1, &format!("where {}", predicate(f.descriptor())));
    }
    if let Some(o) = &plan.op.order {
        line(out, depth + 1, &format!("order {}", sort(o.descriptor())));
    }
    if let Some(w) = &plan.op.window {
        line(out, depth + 1, &format!("slice {}", window(w)));
    }
    for sel in &plan.select {
        match sel {
            SelectionPlan::Field { path, name, .. } => {
                line(out, depth + 1, &format!("field {path} as {name}"));
            }
            SelectionPlan::Collection { name, plan, .. } => {
                line(out, depth + 1, &format!("as {name}:"));
                collection(out, plan, depth + 2);
            }
            SelectionPlan::Aggregate { name, plan, .. } => {
                line(out, depth + 1, &format!("as {name}:"));
                aggregation(out, plan, depth + 2);
            }
        }
    }
    if let Some(f) = &plan.flatten {
        let children: Vec<&str> = f.child_fields().collect();
        line(out, depth + 1, &format!("flatten {}", children.join(" x ")));
    }
}

fn aggregation(out: &mut String, plan: &AggregationPlan, depth: usize) {
    line(out, depth, &format!("aggregate {}", plan.path));
    if let Some(f) = &plan.pipeline.filter {
        line(out, depth + 1, &format!("where {}", predicate(f.descriptor())));
    }
    group(out, &plan.pipeline.group, depth + 1);
}

fn group(out: &mut String, g: &GroupPlan, depth: usize) {
    if !g.keys.is_empty() {
        let keys: Vec<String> = g.keys.iter().map(ToString::to_string).collect();
        line(out, depth, &format!("group by {}", keys.join(", ")));
    }
    for f in &g.functions {
        let target = f.target.as_ref().map(ToString::to_string).unwrap_or_default();
        let mut text = format!("{}({}) as {}", f.kind.name(), target, f.alias);
        if let Some(p) = &f.filter {
            let _ = write!(text, " where {}", predicate(p.descriptor()));
        }
        line(out, depth, &text);
    }
    if let Some(h) = &g.having {
        line(out, depth, &format!("having {}", predicate(h.descriptor())));
    }
    if let Some(o) = &g.order {
        line(out, depth, &format!("order {}", sort(o.descriptor())));
    }
    if let Some(w) = &g.window {
        line(out, depth, &format!("slice {}", window(w)));
    }
}

pub fn predicate(p: &Predicate) -> String {
    match p {
        Predicate::Comparison { path, op, value } => format!("{path} {} {value}", op.symbol()),
        Predicate::And { terms } => join_terms(terms, " and "),
        Predicate::Or { terms } => join_terms(terms, " or "),
        Predicate::Not { term } => format!("not {}", predicate(term)),
        Predicate::CollectionCount {
            path,
            inner,
            op,
            value,
        } => {
            let inner = inner
                .as_ref()
                .map(|i| format!(" where {}", predicate(i)))
                .unwrap_or_default();
            format!("count({path}{inner}) {} {value}", op.symbol())
        }
    }
}

fn join_terms(terms: &[Predicate], sep: &str) -> String {
    let parts: Vec<String> = terms.iter().map(predicate).collect();
    format!("({})", parts.join(sep))
}

fn sort(spec: &SortSpec) -> String {
    let keys: Vec<String> = spec
        .iter()
        .map(|k| match k.direction {
            SortDirection::Asc => format!("{} asc", k.path),
            SortDirection::Desc => format!("{} desc", k.path),
        })
        .collect();
    keys.join(", ")
}

fn window(w: &Window) -> String {
    match w {
        Window::Range { skip, take: Some(n) } => format!("skip {skip} take {n}"),
        Window::Range { skip, take: None } => format!("skip {skip}"),
        Window::Last(n) => format!("last {n}"),
    }
}
