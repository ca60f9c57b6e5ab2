use std::path::PathBuf;

use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    filter::ParseError,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to initialize default log filter"))]
    DefaultFilter { source: ParseError },

    #[snafu(display("failed to initialize rolling file appender in {directory:?}"))]
    FileAppender {
        source: InitError,
        directory: PathBuf,
    },

    #[snafu(display("failed to install global tracing subscriber"))]
    InstallSubscriber { source: TryInitError },
}

/// Initializes `tracing` logging with the filter from the environment variable `env`. If the
/// variable is not set, the maximum log level is INFO.
///
/// Log output is additionally written as JSON to an hourly rotated file when `{env}_DIRECTORY`
/// points to a directory.
pub fn initialize_logging(env: &str, app_name: &str) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_env(env) {
        Ok(env_filter) => env_filter,
        Err(_) => {
            EnvFilter::try_new(tracing::Level::INFO.to_string()).context(DefaultFilterSnafu)?
        }
    };

    let file_appender_directory = std::env::var_os(format!("{env}_DIRECTORY")).map(PathBuf::from);
    let file_appender = match file_appender_directory.as_deref() {
        Some(directory) => Some(
            RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_suffix(format!("{app_name}.log"))
                .max_log_files(6)
                .build(directory)
                .context(FileAppenderSnafu { directory })?,
        ),
        None => None,
    };

    subscriber(filter, file_appender)
        .try_init()
        .context(InstallSubscriberSnafu)?;

    // only possible once the subscriber is installed
    match file_appender_directory {
        Some(dir) => tracing::info!(directory = %dir.display(), "file logging enabled"),
        None => tracing::debug!("file logging disabled, because no log directory set"),
    }

    Ok(())
}

/// Human readable output on stdout, JSON lines in `file_appender` if given.
fn subscriber(
    filter: EnvFilter,
    file_appender: Option<RollingFileAppender>,
) -> impl Subscriber + Send + Sync {
    let file_layer = file_appender.map(|appender| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(appender)
    });

    Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
}
