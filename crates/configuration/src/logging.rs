use crate::settings::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.level`. Console output always goes to stderr
/// so it does not interleave with data printed on stdout. When
/// `config.directory` is set, a second layer writes plain-text logs to a
/// daily rolling file there.
///
/// The returned guard must be held for the life of the program, otherwise
/// buffered file output is lost. Calling this twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "tbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer().with_writer(writer).with_ansi(false);
            if let Err(e) = tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .with(file)
                .try_init()
            {
                eprintln!("Tracing was already initialised: {}", e);
            }
            Some(guard)
        }
        None => {
            if let Err(e) = tracing_subscriber::registry()
                .with(filter)
                .with(console)
                .try_init()
            {
                eprintln!("Tracing was already initialised: {}", e);
            }
            None
        }
    }
}
