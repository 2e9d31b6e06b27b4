//! Engine configuration that downstream crates can serialize/deserialize.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on sibling operators evaluated concurrently for one parent.
    /// `1` evaluates everything on the calling thread.
    pub max_parallel_tasks: usize,

    /// Default per-request deadline, applied when the caller supplies none.
    pub timeout_ms: Option<u64>,

    /// Offer stages to the adapter's native capabilities. When false every
    /// stage runs in memory after a plain fetch.
    pub pushdown: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 1,
            timeout_ms: None,
            pushdown: true,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `NESTQ_MAX_PARALLEL_TASKS`: sibling evaluation parallelism
    /// - `NESTQ_TIMEOUT_MS`: default request deadline in milliseconds
    /// - `NESTQ_PUSHDOWN`: `false`/`0` forces in-memory evaluation
    ///
    /// Unparsable values are ignored; see `try_from_env` for the strict form.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), false).unwrap_or_default()
    }

    /// Like `from_env`, but an unparsable value is an `Error::Config`.
    pub fn try_from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), true)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>, strict: bool) -> Result<Self> {
        let mut cfg = Self::default();
        let invalid = |key: &str, raw: &str, expected: &str| {
            Error::Config(format!("{key}={raw:?}: expected {expected}"))
        };

        if let Some(s) = lookup(ENV_MAX_PARALLEL) {
            match s.trim().parse::<usize>() {
                Ok(0) if strict => {
                    return Err(invalid(ENV_MAX_PARALLEL, &s, "a positive integer"))
                }
                Ok(v) => cfg.max_parallel_tasks = v.max(1),
                Err(_) if strict => {
                    return Err(invalid(ENV_MAX_PARALLEL, &s, "a positive integer"))
                }
                Err(_) => {}
            }
        }

        if let Some(s) = lookup(ENV_TIMEOUT_MS) {
            match s.trim().parse::<u64>() {
                Ok(v) => cfg.timeout_ms = Some(v),
                Err(_) if strict => return Err(invalid(ENV_TIMEOUT_MS, &s, "milliseconds")),
                Err(_) => {}
            }
        }

        if let Some(s) = lookup(ENV_PUSHDOWN) {
            match parse_flag(&s) {
                Some(v) => cfg.pushdown = v,
                None if strict => return Err(invalid(ENV_PUSHDOWN, &s, "true or false")),
                None => {}
            }
        }

        Ok(cfg)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

const ENV_MAX_PARALLEL: &str = "NESTQ_MAX_PARALLEL_TASKS";
const ENV_TIMEOUT_MS: &str = "NESTQ_TIMEOUT_MS";
const ENV_PUSHDOWN: &str = "NESTQ_PUSHDOWN";

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn env_values_override_defaults() {
        let vars = [
            ("NESTQ_MAX_PARALLEL_TASKS", "4"),
            ("NESTQ_TIMEOUT_MS", "1500"),
            ("NESTQ_PUSHDOWN", "off"),
        ];
        let cfg = EngineConfig::from_lookup(lookup(&vars), true).expect("valid");
        assert_eq!(cfg.max_parallel_tasks, 4);
        assert_eq!(cfg.timeout(), Some(Duration::from_millis(1500)));
        assert!(!cfg.pushdown);
    }

    #[test]
    fn strict_lookup_rejects_bad_values() {
        for vars in [
            [("NESTQ_MAX_PARALLEL_TASKS", "many")],
            [("NESTQ_MAX_PARALLEL_TASKS", "0")],
            [("NESTQ_TIMEOUT_MS", "-5")],
            [("NESTQ_PUSHDOWN", "maybe")],
        ] {
            let err = EngineConfig::from_lookup(lookup(&vars), true).expect_err("invalid");
            assert!(matches!(err, Error::Config(ref msg) if msg.starts_with(vars[0].0)));
        }

        let lenient = EngineConfig::from_lookup(
            lookup(&[("NESTQ_TIMEOUT_MS", "soon"), ("NESTQ_MAX_PARALLEL_TASKS", "0")]),
            false,
        )
        .expect("lenient never fails");
        assert_eq!(lenient.timeout_ms, None);
        assert_eq!(lenient.max_parallel_tasks, 1);
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"timeout_ms": 250}"#).unwrap();
        assert_eq!(cfg.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(cfg.max_parallel_tasks, 1);
        assert!(cfg.pushdown);
    }
}
