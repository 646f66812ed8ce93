//! Shared test utilities for the mantis-mcp crates.
//!
//! Configuration is read from process environment variables, so any test
//! that touches `MANTIS_*` values must serialize against the rest of the
//! suite and restore the environment afterwards. The helpers here keep
//! that boilerplate in one place.

use std::sync::{LazyLock, Mutex, MutexGuard};

/// Serialize tests that mutate process-global state (env vars, cwd, etc).
///
/// Acquire this guard at the start of any test that modifies environment
/// variables to prevent race conditions between parallel tests.
pub fn env_guard() -> MutexGuard<'static, ()> {
    static TEST_SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
    TEST_SERIAL.lock().unwrap_or_else(|e| e.into_inner())
}

/// RAII guard for environment variables - restores original value on drop.
pub struct EnvVarGuard {
    key: &'static str,
    previous: Option<String>,
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(v) = &self.previous {
            std::env::set_var(self.key, v);
        } else {
            std::env::remove_var(self.key);
        }
    }
}

/// Set an environment variable and return a guard that restores the original on drop.
///
/// # Example
/// ```
/// let _guard = mantis_test_utils::set_env_var("MY_VAR", Some("value"));
/// // MY_VAR is set to "value"
/// // When _guard drops, MY_VAR is restored to its original value
/// ```
pub fn set_env_var(key: &'static str, value: Option<&str>) -> EnvVarGuard {
    let previous = std::env::var(key).ok();
    if let Some(val) = value {
        std::env::set_var(key, val);
    } else {
        std::env::remove_var(key);
    }
    EnvVarGuard { key, previous }
}

/// Clear every `MANTIS_*` variable the configuration layer reads and return
/// the guards keeping them clear.
///
/// Call under [`env_guard`]; dropping the returned vector restores whatever
/// the ambient environment had.
pub fn clear_mantis_env() -> Vec<EnvVarGuard> {
    [
        "MANTIS_API_URL",
        "MANTIS_API_TOKEN",
        "MANTIS_CACHE_ENABLED",
        "MANTIS_CACHE_TTL_SECONDS",
    ]
    .into_iter()
    .map(|key| set_env_var(key, None))
    .collect()
}
