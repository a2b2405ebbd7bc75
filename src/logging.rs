//! Process-wide logging setup: a once-init singleton with an injected
//! sink, rather than a global mutable logger. This crate never installs a
//! sink itself outside of tests - the
//! embedder owns that decision, exactly as `autograph-render`'s examples
//! call `pretty_env_logger::init()` once from `main`.

use lazy_static::lazy_static;
use std::sync::Once;

lazy_static! {
    static ref INIT: Once = Once::new();
}

/// Installs a `pretty_env_logger` sink at most once per process; safe to
/// call from every test that wants log output, since only the first call
/// does anything.
#[cfg(test)]
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = pretty_env_logger::try_init();
    });
}
