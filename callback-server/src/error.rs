//! Error types for the callback server

use thiserror::Error;

/// Errors that can occur while running the callback server
#[derive(Debug, Error)]
pub enum CallbackServerError {
    /// Every port in the configured range is taken
    #[error("No available port found in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },

    /// The HTTP server task failed to come up
    #[error("Server failed to start: {0}")]
    Startup(String),

    /// The HTTP server task did not stop cleanly
    #[error("Server shutdown failed: {0}")]
    Shutdown(String),
}
