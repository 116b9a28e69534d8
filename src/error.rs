//! Engine error taxonomy
//!
//! Internal operations return `Result<_, EngineError>` and propagate with `?`.
//! At the command boundary every failure is converted to a boolean result plus
//! a log line; only argument validation surfaces as a structured error.

use thiserror::Error;

/// Failures raised by the wallpaper engine proper.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The desktop shell root (`Progman`) could not be found. Fatal to the
    /// current initialization attempt.
    #[error("desktop shell not found (Progman missing)")]
    ShellNotFound,

    /// OS refused to create the hosting surface. May succeed on retry.
    #[error("failed to create hosting surface: {0}")]
    WindowCreationFailed(String),

    /// WebView2 environment creation failed.
    #[error("WebView2 environment creation failed: {0}")]
    EnvironmentCreationFailed(String),

    /// WebView2 controller creation failed.
    #[error("WebView2 controller creation failed: {0}")]
    ControllerCreationFailed(String),

    /// The rendering engine rejected a navigation request.
    #[error("navigation failed for '{url}': {reason}")]
    NavigationFailed { url: String, reason: String },

    /// The URL was rejected by the content policy. Distinct from a
    /// navigation failure so the offending URL is always logged.
    #[error("URL rejected by content policy: {0}")]
    UrlRejected(String),
}

/// Errors surfaced by the command dispatch boundary.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Missing or malformed arguments.
    #[error("INVALID_ARGS: {0}")]
    InvalidArgs(String),

    /// Unknown operation name.
    #[error("method not implemented: {0}")]
    NotImplemented(String),
}
