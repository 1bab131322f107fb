use thiserror::Error;

/// Errors crossing the engine's public API.
///
/// Everything else either recovers internally (restarts) or surfaces as
/// the terminal status on the returned transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The engine has shut down and can no longer accept requests or
    /// produce results.
    #[error("transaction engine has shut down")]
    Shutdown,
}
