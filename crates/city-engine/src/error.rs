//! Top-level errors for the City server binary.

/// Errors that can occur while assembling the server at startup.
#[derive(Debug, thiserror::Error)]
pub enum EngineSetupError {
    /// Configuration could not be read or parsed.
    #[error("config error: {message}")]
    Config {
        /// What went wrong.
        message: String,
    },

    /// Map loading or validation failed.
    #[error("map error: {message}")]
    Map {
        /// What went wrong.
        message: String,
    },

    /// The database could not be reached or migrated.
    #[error("database error: {message}")]
    Database {
        /// What went wrong.
        message: String,
    },

    /// The gateway could not bind.
    #[error("gateway error: {message}")]
    Gateway {
        /// What went wrong.
        message: String,
    },
}
