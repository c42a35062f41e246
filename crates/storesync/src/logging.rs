use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Per-message traffic (dispatch ids, syncs) is logged at debug and
    /// below; module targets only help at that depth.
    fn shows_traffic(self) -> bool {
        self.as_filter() >= LevelFilter::DEBUG
    }
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
///
/// `long_running` commands (`host`, `watch`) keep timestamps so session
/// open/close lines can be correlated; one-shot commands drop them. JSON
/// records always carry the target (`storesync_peer::host`, ...) for
/// filtering downstream.
pub fn init_logging(format: LogFormat, level: LogLevel, long_running: bool) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false);

    let _ = match (format, long_running) {
        (LogFormat::Json, _) => builder.json().with_target(true).try_init(),
        (LogFormat::Text, true) => builder.with_target(level.shows_traffic()).try_init(),
        (LogFormat::Text, false) => builder
            .with_target(level.shows_traffic())
            .without_time()
            .try_init(),
    };
}
