//! Provider configuration.

use std::time::Duration;

/// Configuration for [`EngineProvider`](crate::EngineProvider).
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Upper bound on how long
    /// [`initialize`](crate::FeatureProvider::initialize) waits for the
    /// engine to report a configuration state. `None` waits indefinitely.
    ///
    /// Defaults to `None`.
    pub ready_timeout: Option<Duration>,
}

impl ProviderOptions {
    /// Create a new `ProviderOptions` using default configuration.
    pub fn new() -> ProviderOptions {
        ProviderOptions::default()
    }

    /// Bound the readiness wait with `timeout`.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> ProviderOptions {
        self.ready_timeout = Some(timeout);
        self
    }
}
