use crate::error::ConfigError;

// Declare the modules that make up this crate.
#[cfg(feature = "clap")]
pub mod cli;
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
#[cfg(feature = "clap")]
pub use cli::SessionOverrides;
pub use logging::init_tracing;
pub use settings::{Config, LoggingConfig, ServerConfig, SessionConfig};

/// The file read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Prefix of the environment variables that override file settings,
/// e.g. `TBOT__SERVER__BASE_URL`.
pub const ENV_PREFIX: &str = "TBOT";

/// Loads the application configuration.
///
/// Sources are layered: built-in defaults, then the TOML file (`config.toml`
/// unless `path` is given; a missing default file is not an error), then
/// `TBOT__SECTION__KEY` environment variables. The result is validated
/// before it is returned.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => config::File::with_name(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let builder = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Rejects settings the client cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.server.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "server.base_url must be an http(s) URL, got '{}'",
                self.server.base_url
            )));
        }
        if self.server.page_host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.page_host must not be empty".to_string(),
            ));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.idle_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "session.idle_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.session.event_buffer == 0 {
            return Err(ConfigError::Validation(
                "session.event_buffer must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::{RunMode, WireProtocol};
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.session.max_consecutive_malformed, 3);
        assert_eq!(config.session.protocol, WireProtocol::Auto);
    }

    #[test]
    fn file_overrides_defaults_per_key() {
        let file = write_config(
            r#"
            [server]
            base_url = "http://backtest.local:9000"

            [session]
            mode = "ZIPLINE_MODE"
            protocol = "bare_text"
            start_date = "2021-06-01"
            idle_timeout_secs = 5
            "#,
        );
        let config = load_config(file.path().to_str()).unwrap();

        assert_eq!(config.server.base_url, "http://backtest.local:9000");
        // Untouched keys keep their defaults.
        assert_eq!(config.server.page_host, "localhost");
        assert_eq!(config.session.mode, RunMode::Zipline);
        assert_eq!(config.session.protocol, WireProtocol::BareText);
        assert_eq!(
            config.session.start_date,
            NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
        );
        assert_eq!(config.session.idle_timeout().as_secs(), 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let file = write_config(
            r#"
            [server]
            base_url = "ftp://nowhere"
            "#,
        );
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Validation(_))
        ));

        let mut config = Config::default();
        config.session.idle_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(matches!(
            load_config(Some("/definitely/not/here.toml")),
            Err(ConfigError::Load(_))
        ));
    }
}
