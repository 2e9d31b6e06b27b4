//! Capability negotiation between compiled operators and a read session.
//!
//! Collection stages negotiate as a prefix (see `CollectionOp::negotiate`).
//! Counts and aggregations pick a route: the session's native operation when
//! offered, otherwise a fetch (with the filter pushed if the session can)
//! followed by in-memory evaluation.

use nestq_core::config::EngineConfig;
use nestq_operators::{Capabilities, Pushed};

use crate::metrics::Counters;

/// What the engine may ask of a session, given the engine config.
pub fn effective_capabilities(cfg: &EngineConfig, offered: Capabilities) -> Capabilities {
    if cfg.pushdown {
        offered
    } else {
        Capabilities::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Session computes the result itself.
    Native,
    /// Fetch the sequence, then finish in memory.
    Fetch { push_filter: bool },
}

pub fn count_route(caps: Capabilities, has_inner: bool) -> Route {
    if caps.count {
        Route::Native
    } else {
        Route::Fetch {
            push_filter: has_inner && caps.filter,
        }
    }
}

/// `needs_counts` is true when the outer filter or any per-function filter
/// holds a count predicate; such a pipeline only runs natively on a session
/// that also counts.
pub fn aggregate_route(caps: Capabilities, has_filter: bool, needs_counts: bool) -> Route {
    if caps.group_aggregate && (caps.count || !needs_counts) {
        Route::Native
    } else {
        Route::Fetch {
            push_filter: has_filter && caps.filter,
        }
    }
}

pub(crate) fn record_pushed(counters: &Counters, pushed: Pushed) {
    if pushed.filter {
        Counters::bump(&counters.pushed_filters);
    }
    if pushed.order {
        Counters::bump(&counters.pushed_sorts);
    }
    if pushed.window {
        Counters::bump(&counters.pushed_slices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_pushdown_offers_nothing() {
        let cfg = EngineConfig {
            pushdown: false,
            ..EngineConfig::default()
        };
        assert_eq!(
            effective_capabilities(&cfg, Capabilities::ALL),
            Capabilities::NONE
        );
    }

    #[test]
    fn counts_fall_back_to_filtered_fetch() {
        let caps = Capabilities {
            filter: true,
            ..Capabilities::NONE
        };
        assert_eq!(count_route(caps, true), Route::Fetch { push_filter: true });
        assert_eq!(count_route(caps, false), Route::Fetch { push_filter: false });
        assert_eq!(count_route(Capabilities::ALL, true), Route::Native);
    }

    #[test]
    fn aggregates_prefer_native_grouping() {
        assert_eq!(aggregate_route(Capabilities::ALL, true, true), Route::Native);
        assert_eq!(
            aggregate_route(Capabilities::NONE, true, false),
            Route::Fetch { push_filter: false }
        );
    }

    #[test]
    fn count_filters_keep_grouping_off_sessions_without_counts() {
        let caps = Capabilities {
            filter: true,
            group_aggregate: true,
            ..Capabilities::NONE
        };
        assert_eq!(aggregate_route(caps, true, false), Route::Native);
        assert_eq!(
            aggregate_route(caps, false, true),
            Route::Fetch { push_filter: false }
        );
    }
}
