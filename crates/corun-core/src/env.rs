//! Environment variable utilities
//!
//! Typed readers for the `CORUN_*` overrides used by the config layer and
//! the logger.
//!
//! # Usage
//!
//! ```ignore
//! use corun_core::env::{env_get, env_get_bool, env_get_opt};
//!
//! let procs: usize = env_get("CORUN_NUM_PROCESSORS", 4);
//! let pin: bool = env_get_bool("CORUN_PIN_THREADS", false);
//! let stack: Option<usize> = env_get_opt("CORUN_THREAD_STACK_SIZE");
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default.
///
/// An unparsable value also yields the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true; any other
/// set value is false. Unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// `Some(T)` if the variable is set and parses, `None` otherwise
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__CORUN_TEST_UNSET_12345__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<usize> = env_get_opt("__CORUN_TEST_UNSET_12345__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__CORUN_TEST_NUM__", " 123 ");
        let val: usize = env_get("__CORUN_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__CORUN_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        let key = "__CORUN_TEST_BOOL__";
        assert!(env_get_bool(key, true));

        for v in ["1", "true", "TRUE", "yes", "on"] {
            std::env::set_var(key, v);
            assert!(env_get_bool(key, false), "{} should be true", v);
        }
        for v in ["0", "false", "garbage"] {
            std::env::set_var(key, v);
            assert!(!env_get_bool(key, true), "{} should be false", v);
        }
        std::env::remove_var(key);
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__CORUN_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__CORUN_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__CORUN_TEST_INVALID__");
    }
}
