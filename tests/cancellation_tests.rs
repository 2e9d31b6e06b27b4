//! Cancellation, deadlines, and source failures discard the whole result.

mod test_data_gen;

use std::thread;
use std::time::Duration;

use nestq_core::prelude::*;
use nestq_exec::{Engine, EngineError};
use nestq_operators::Capabilities;
use nestq_planner::compile_query;
use test_data_gen::*;

fn nested_query() -> QueryDescriptor {
    QueryDescriptor::collection(
        "accounts",
        CollectionQuery {
            select: vec![
                Selection::field("id"),
                Selection::collection("orders", CollectionQuery::default()),
                Selection::collection("contacts", CollectionQuery::default()),
            ],
            flatten: Some(FlattenSpec::new(&[("orders", "o"), ("contacts", "c")])),
            ..CollectionQuery::default()
        },
    )
}

fn slow_source(delay_ms: u64) -> nestq_io::MemorySource {
    source(Capabilities::NONE).with_delay(Duration::from_millis(delay_ms))
}

#[test]
fn test_pre_cancelled_request_never_opens_a_session() {
    let source = slow_source(0);
    let plan = compile_query(&nested_query(), &catalog()).expect("compile");
    let ctx = RequestContext::new();
    ctx.cancel_token().cancel();
    let err = Engine::default()
        .execute(&plan, &source, &ctx)
        .expect_err("cancelled");
    assert_eq!(err, ExecError::Cancelled);
    assert_eq!(source.calls().sessions, 0);
}

#[test]
fn test_cancel_during_flatten_children() {
    let source = slow_source(20);
    let plan = compile_query(&nested_query(), &catalog()).expect("compile");
    let token = CancelToken::new();
    let ctx = RequestContext::new().with_cancel(token.clone());
    let engine = Engine::new(EngineConfig {
        max_parallel_tasks: 2,
        ..EngineConfig::default()
    });

    let result = thread::scope(|s| {
        let handle = s.spawn(|| engine.execute(&plan, &source, &ctx));
        thread::sleep(Duration::from_millis(50));
        token.cancel();
        handle.join().expect("engine thread")
    });
    assert_eq!(result.expect_err("cancelled mid-flight"), ExecError::Cancelled);
}

#[test]
fn test_deadline_from_config() {
    let source = slow_source(30);
    let engine = Engine::new(EngineConfig {
        timeout_ms: Some(40),
        ..EngineConfig::default()
    });
    let plan = compile_query(&nested_query(), &catalog()).expect("compile");
    let err = engine
        .execute(&plan, &source, &RequestContext::new())
        .expect_err("deadline");
    assert_eq!(err, ExecError::Timeout);
}

#[test]
fn test_caller_deadline() {
    let source = slow_source(30);
    let plan = compile_query(&nested_query(), &catalog()).expect("compile");
    let ctx = RequestContext::new().with_timeout(Duration::from_millis(40));
    let err = Engine::default()
        .execute(&plan, &source, &ctx)
        .expect_err("deadline");
    assert_eq!(err, ExecError::Timeout);
}

#[test]
fn test_source_going_offline_fails_request() {
    let source = slow_source(0);
    source.set_available(false);
    let err = Engine::default()
        .query(&nested_query(), &catalog(), &source, &RequestContext::new())
        .expect_err("offline");
    assert!(matches!(
        err,
        EngineError::Exec(ExecError::SourceUnavailable(_))
    ));
}

#[test]
fn test_generous_deadline_completes() {
    let source = slow_source(1);
    let engine = Engine::new(EngineConfig {
        timeout_ms: Some(10_000),
        max_parallel_tasks: 4,
        ..EngineConfig::default()
    });
    let rows = run_with(&engine, &nested_query(), &source);
    assert_eq!(rows.len(), 3 * 2 + 1);
}
