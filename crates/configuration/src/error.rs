use thiserror::Error;

/// Why the client's configuration could not be used.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file or the `TBOT__*` environment could not be read or deserialized.
    #[error("could not load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The values loaded but do not describe a usable session.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
