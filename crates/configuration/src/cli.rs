use crate::settings::Config;
use chrono::NaiveDate;
use core_types::{RunMode, WireProtocol};

/// Command-line overrides for the session settings.
///
/// Every flag is optional; an absent flag leaves the loaded value alone.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct SessionOverrides {
    /// Execution engine: GENERATOR or ZIPLINE.
    #[arg(long)]
    pub mode: Option<RunMode>,

    /// Wire dialect to expect: auto, structured or bare-text.
    #[arg(long)]
    pub protocol: Option<WireProtocol>,

    /// Date of the first point for streams that carry no dates (format: YYYY-MM-DD).
    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    /// Fail the run after this many seconds without a frame.
    #[arg(long)]
    pub idle_timeout_secs: Option<u64>,

    /// Base URL of the backtest server, e.g. http://localhost:8888.
    #[arg(long)]
    pub base_url: Option<String>,
}

impl Config {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&mut self, overrides: &SessionOverrides) {
        if let Some(mode) = overrides.mode {
            self.session.mode = mode;
        }
        if let Some(protocol) = overrides.protocol {
            self.session.protocol = protocol;
        }
        if let Some(start_date) = overrides.start_date {
            self.session.start_date = start_date;
        }
        if let Some(idle) = overrides.idle_timeout_secs {
            self.session.idle_timeout_secs = idle;
        }
        if let Some(base_url) = &overrides.base_url {
            self.server.base_url = base_url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_flags_keep_loaded_values() {
        let mut config = Config::default();
        let before = config.clone();
        config.apply_overrides(&SessionOverrides::default());
        assert_eq!(config, before);
    }

    #[test]
    fn present_flags_replace_values() {
        let mut config = Config::default();
        config.apply_overrides(&SessionOverrides {
            mode: Some(RunMode::Zipline),
            protocol: Some(WireProtocol::Structured),
            start_date: NaiveDate::from_ymd_opt(2021, 6, 1),
            idle_timeout_secs: Some(2),
            base_url: Some("http://example.test".to_string()),
        });
        assert_eq!(config.session.mode, RunMode::Zipline);
        assert_eq!(config.session.protocol, WireProtocol::Structured);
        assert_eq!(config.session.idle_timeout_secs, 2);
        assert_eq!(config.server.base_url, "http://example.test");
    }
}
