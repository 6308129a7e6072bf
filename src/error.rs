/// Represents a result type for provider lifecycle operations.
///
/// Evaluation calls never fail with [`Error`]; evaluation failures are
/// returned as data on [`ProviderEvaluation`](crate::ProviderEvaluation).
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors surfaced by the provider.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The engine did not report a configuration state within the configured
    /// readiness deadline.
    #[error("timed out waiting for the engine to become ready")]
    ReadyTimeout,
}
