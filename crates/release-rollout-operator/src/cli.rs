use std::path::PathBuf;

use clap::{Args, Parser};
use jiff::SignedDuration;
use release_rollout::settings::{DisruptionApprovalMode, UpdateMode};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(author, version, about = "Drives platform self-updates from DeckhouseRelease objects")]
pub struct Opts {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Eq, Parser)]
pub enum Command {
    /// Print CRD objects.
    Crd,

    /// Run the operator.
    Run(RunArguments),
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(long_about = "")]
pub struct RunArguments {
    /// Path to the YAML file containing the update settings. Without it, releases are deployed
    /// automatically at any time.
    #[arg(long, value_name = "FILE", env)]
    pub update_settings: Option<PathBuf>,

    /// How releases are approved.
    #[arg(long, env, default_value_t = UpdateMode::default(), value_enum)]
    pub update_mode: UpdateMode,

    /// Overrides the disruption approval mode of the settings file.
    #[arg(long, env, value_enum)]
    pub disruption_approval_mode: Option<DisruptionApprovalMode>,

    /// Time zone the update windows are evaluated in.
    #[arg(long, env, default_value = "UTC")]
    pub time_zone: String,

    /// Whether the cluster is still being bootstrapped. Releases are then deployed without any
    /// checks.
    #[arg(long, env)]
    pub cluster_bootstrapping: bool,

    #[command(flatten)]
    pub workload: WorkloadOptions,
}

#[derive(Debug, PartialEq, Eq, Args)]
#[command(next_help_heading = "Workload Options")]
pub struct WorkloadOptions {
    /// Namespace of the platform Deployment.
    #[arg(long = "workload-namespace", env = "WORKLOAD_NAMESPACE", default_value = "d8-system")]
    pub namespace: String,

    /// Name of the platform Deployment.
    #[arg(long = "workload-name", env = "WORKLOAD_NAME", default_value = "deckhouse")]
    pub name: String,

    /// The interval in which rollout cycles run.
    #[arg(long = "cycle-interval", env = "CYCLE_INTERVAL", default_value = "15s")]
    pub interval: SignedDuration,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let opts = Opts::parse_from(["release-rollout-operator", "run"]);

        let Command::Run(arguments) = opts.command else {
            panic!("expected the run command");
        };
        assert_eq!(arguments.update_mode, UpdateMode::Auto);
        assert_eq!(arguments.time_zone, "UTC");
        assert_eq!(arguments.workload.namespace, "d8-system");
        assert_eq!(arguments.workload.name, "deckhouse");
        assert_eq!(arguments.workload.interval, SignedDuration::from_secs(15));
    }

    #[test]
    fn run_overrides() {
        let opts = Opts::parse_from([
            "release-rollout-operator",
            "run",
            "--update-mode",
            "manual",
            "--disruption-approval-mode",
            "manual",
            "--cycle-interval",
            "1m",
            "--cluster-bootstrapping",
        ]);

        let Command::Run(arguments) = opts.command else {
            panic!("expected the run command");
        };
        assert_eq!(arguments.update_mode, UpdateMode::Manual);
        assert_eq!(
            arguments.disruption_approval_mode,
            Some(DisruptionApprovalMode::Manual)
        );
        assert_eq!(arguments.workload.interval, SignedDuration::from_mins(1));
        assert!(arguments.cluster_bootstrapping);
    }
}
