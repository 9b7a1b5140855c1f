//! Error types for the `twissandra` binary.

/// Top-level error for the command line.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that command handlers can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: twissandra_core::config::ConfigError,
    },

    /// Opening the store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: twissandra_db::DbError,
    },

    /// The engine rejected or failed the command.
    #[error(transparent)]
    Core {
        /// The underlying engine error.
        #[from]
        source: twissandra_core::CoreError,
    },

    /// Rendering the result as JSON failed.
    #[error("output error: {source}")]
    Output {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
