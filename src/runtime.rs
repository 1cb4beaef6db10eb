//! Runtime abstraction for process-level inputs.
//!
//! Configuration reads the environment through this trait so tests can
//! substitute a `MockRuntime`.

use std::env;

#[cfg_attr(test, mockall::automock)]
pub trait Runtime: Send + Sync {
    fn env_var(&self, key: &str) -> Result<String, env::VarError>;
}

pub struct RealRuntime;

impl Runtime for RealRuntime {
    #[tracing::instrument(skip(self))]
    fn env_var(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }
}
