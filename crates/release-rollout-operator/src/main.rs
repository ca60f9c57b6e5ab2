use clap::Parser;
use jiff::tz::TimeZone;
use kube::CustomResourceExt;
use release_rollout::{channel::ReleaseChannel, settings::UpdateSettings};
use snafu::{ResultExt, Snafu, ensure};

use crate::{
    cli::{Command, Opts, RunArguments},
    controller::{Controller, ControllerOptions},
    crd::DeckhouseRelease,
    signal::SignalWatcher,
};

mod adapter;
mod apply;
mod cli;
mod controller;
mod crd;
mod requirements;
mod signal;
mod telemetry;

pub const APP_NAME: &str = "release-rollout-operator";
pub const LOG_ENV: &str = "RELEASE_ROLLOUT_LOG";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to serialize CRD"))]
    SerializeCrd { source: serde_yaml::Error },

    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: telemetry::Error },

    #[snafu(display("failed to load update settings"))]
    LoadSettings {
        source: release_rollout::settings::Error,
    },

    #[snafu(display(
        "release channel {channel} is configured, but only release records are supported"
    ))]
    ReleaseChannelUnsupported { channel: ReleaseChannel },

    #[snafu(display("unknown time zone {name:?}"))]
    UnknownTimeZone { source: jiff::Error, name: String },

    #[snafu(display("cycle interval must be positive, got {interval}"))]
    InvalidInterval { interval: jiff::SignedDuration },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("failed to watch for SIGTERM"))]
    WatchSignal { source: signal::SignalError },
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();

    match opts.command {
        Command::Crd => {
            let crd = serde_yaml::to_string(&DeckhouseRelease::crd()).context(SerializeCrdSnafu)?;
            print!("{crd}");
        }
        Command::Run(arguments) => {
            telemetry::initialize_logging(LOG_ENV, APP_NAME).context(InitializeLoggingSnafu)?;
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                "starting {APP_NAME}"
            );

            let options = controller_options(arguments)?;
            let client = kube::Client::try_default()
                .await
                .context(CreateClientSnafu)?;
            let sigterm = SignalWatcher::sigterm().context(WatchSignalSnafu)?;

            tokio::select! {
                () = Controller::new(client, options).run() => {},
                () = sigterm.handle() => tracing::info!("received SIGTERM, shutting down"),
            }
        }
    }

    Ok(())
}

/// Merges the settings file with the overrides given on the command line.
fn controller_options(arguments: RunArguments) -> Result<ControllerOptions, Error> {
    let RunArguments {
        update_settings,
        update_mode,
        disruption_approval_mode,
        time_zone,
        cluster_bootstrapping,
        workload,
    } = arguments;

    let mut settings = match update_settings {
        Some(path) => UpdateSettings::from_file(path).context(LoadSettingsSnafu)?,
        None => UpdateSettings::default(),
    };
    if let Some(mode) = disruption_approval_mode {
        settings.disruption_approval_mode = mode;
    }
    check_settings(&settings)?;

    let time_zone = TimeZone::get(&time_zone).context(UnknownTimeZoneSnafu { name: time_zone })?;

    ensure!(
        workload.interval.is_positive(),
        InvalidIntervalSnafu {
            interval: workload.interval
        }
    );

    Ok(ControllerOptions {
        mode: update_mode,
        settings,
        time_zone,
        bootstrapping: cluster_bootstrapping,
        workload_namespace: workload.namespace,
        workload_name: workload.name,
        interval: workload.interval.unsigned_abs(),
    })
}

/// Rejects settings the rollout loop cannot act on.
fn check_settings(settings: &UpdateSettings) -> Result<(), Error> {
    if let Some(channel) = settings.release_channel {
        return ReleaseChannelUnsupportedSnafu { channel }.fail();
    }

    Ok(())
}
