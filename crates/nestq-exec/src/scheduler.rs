//! Bounded fan-out for sibling branches of one parent element.
//!
//! Branches share a child cancellation token: the first failing branch trips
//! it so the others stop at their next checkpoint. Results come back in input
//! order regardless of completion order.

use std::thread;

use nestq_core::cancel::RequestContext;
use nestq_core::error::ExecError;

/// Run `f` over every item, at most `max_parallel` at a time.
///
/// `max_parallel <= 1` (or a single item) runs on the calling thread.
pub fn run_branches<I, T, F>(
    ctx: &RequestContext,
    max_parallel: usize,
    items: &[I],
    f: F,
) -> Result<Vec<T>, ExecError>
where
    I: Sync,
    T: Send,
    F: Fn(&I, &RequestContext) -> Result<T, ExecError> + Sync,
{
    if max_parallel <= 1 || items.len() <= 1 {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            ctx.checkpoint()?;
            out.push(f(item, ctx)?);
        }
        return Ok(out);
    }

    let group = ctx.branch();
    let mut results: Vec<Result<T, ExecError>> = Vec::with_capacity(items.len());
    for wave in items.chunks(max_parallel) {
        let f = &f;
        let group = &group;
        thread::scope(|s| {
            let handles: Vec<_> = wave
                .iter()
                .map(|item| {
                    s.spawn(move || {
                        group.checkpoint()?;
                        let r = f(item, group);
                        if r.is_err() {
                            group.cancel_token().cancel();
                        }
                        r
                    })
                })
                .collect();
            for h in handles {
                results.push(h.join().unwrap_or_else(|_| {
                    group.cancel_token().cancel();
                    Err(ExecError::SourceUnavailable("branch panicked".into()))
                }));
            }
        });
        if group.cancel_token().is_cancelled() {
            break;
        }
    }

    // Report the failure that caused the cancellation, not the siblings
    // that merely observed it.
    let mut first_err = None;
    let mut out = Vec::with_capacity(results.len());
    for r in results {
        match r {
            Ok(v) => out.push(v),
            Err(ExecError::Cancelled) => {
                first_err.get_or_insert(ExecError::Cancelled);
            }
            Err(e) => {
                if matches!(first_err, None | Some(ExecError::Cancelled)) {
                    first_err = Some(e);
                }
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }
    ctx.checkpoint()?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn results_keep_input_order() {
        let ctx = RequestContext::new();
        let out = run_branches(&ctx, 3, &[30u64, 1, 10, 5], |ms, _| {
            thread::sleep(Duration::from_millis(*ms));
            Ok(*ms)
        })
        .expect("run");
        assert_eq!(out, vec![30, 1, 10, 5]);
    }

    #[test]
    fn first_failure_wins_over_sibling_cancellation() {
        let ctx = RequestContext::new();
        let err = run_branches(&ctx, 2, &[0u8, 1], |i, branch| {
            if *i == 0 {
                return Err(ExecError::SourceUnavailable("boom".into()));
            }
            for _ in 0..100 {
                branch.checkpoint()?;
                thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        })
        .expect_err("branch 0 fails");
        assert_eq!(err, ExecError::SourceUnavailable("boom".into()));
        assert!(!ctx.cancel_token().is_cancelled());
    }

    #[test]
    fn cancelled_parent_stops_sequential_runs() {
        let ctx = RequestContext::new();
        ctx.cancel_token().cancel();
        let err = run_branches(&ctx, 1, &[1, 2], |_, _| Ok(())).expect_err("cancelled");
        assert_eq!(err, ExecError::Cancelled);
    }
}
