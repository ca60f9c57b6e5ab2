//! The rollout loop: observe the cluster, run a rollout cycle, apply the outcome.

use std::time::Duration;

use jiff::tz::TimeZone;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{Api, Client, api::ListParams};
use release_rollout::{
    checks::Checks,
    clock::SystemClock,
    cycle::{CycleOutcome, run_cycle},
    release::ReleaseSnapshot,
    settings::{UpdateMode, UpdateSettings},
    sink::PatchCollector,
};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    adapter::to_release,
    apply::{self, PatchApplier},
    crd::DeckhouseRelease,
    requirements::{KubernetesVersion, ParseVersionError, cluster_checks},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to list releases"))]
    ListReleases { source: kube::Error },

    #[snafu(display("failed to get platform workload {name:?}"))]
    GetWorkload { source: kube::Error, name: String },

    #[snafu(display("failed to determine the Kubernetes version of the cluster"))]
    DetermineKubernetesVersion { source: kube::Error },

    #[snafu(display("failed to parse the Kubernetes version of the cluster"))]
    ParseKubernetesVersion { source: ParseVersionError },

    #[snafu(display("failed to apply the rollout changes"))]
    ApplyChanges { source: apply::Error },
}

pub struct ControllerOptions {
    pub mode: UpdateMode,
    pub settings: UpdateSettings,
    pub time_zone: TimeZone,
    pub bootstrapping: bool,
    pub workload_namespace: String,
    pub workload_name: String,
    pub interval: Duration,
}

pub struct Controller {
    client: Client,
    releases: Api<DeckhouseRelease>,
    deployments: Api<Deployment>,
    applier: PatchApplier,
    options: ControllerOptions,
}

impl Controller {
    pub fn new(client: Client, options: ControllerOptions) -> Self {
        let releases = Api::<DeckhouseRelease>::all(client.clone());
        let deployments =
            Api::<Deployment>::namespaced(client.clone(), &options.workload_namespace);
        let applier = PatchApplier::new(
            releases.clone(),
            deployments.clone(),
            &options.workload_name,
        );

        Self {
            client,
            releases,
            deployments,
            applier,
            options,
        }
    }

    /// Runs a rollout cycle in every interval. Failed cycles are logged and retried in the
    /// next interval.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.options.interval);

        loop {
            // The first tick completes immediately.
            interval.tick().await;

            if let Err(error) = self.reconcile().await {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "rollout cycle failed"
                );
            }
        }
    }

    #[instrument(skip(self))]
    async fn reconcile(&self) -> Result<(), Error> {
        let objects = self
            .releases
            .list(&ListParams::default())
            .await
            .context(ListReleasesSnafu)?;

        let name = &self.options.workload_name;
        let workload = self
            .deployments
            .get_opt(name)
            .await
            .context(GetWorkloadSnafu { name })?;
        let pod_ready = workload.as_ref().is_some_and(workload_available);

        let version = self
            .client
            .apiserver_version()
            .await
            .context(DetermineKubernetesVersionSnafu)?;
        let version =
            KubernetesVersion::from_info(&version).context(ParseKubernetesVersionSnafu)?;
        let checks = cluster_checks(version);

        let snapshot = ReleaseSnapshot {
            releases: objects.items.iter().map(to_release).collect(),
            mode: self.options.mode,
            pod_ready,
            bootstrapping: self.options.bootstrapping,
        };

        let mut collector = PatchCollector::new();
        let outcome = run_cycle(
            &SystemClock,
            &self.options.time_zone,
            snapshot,
            &self.options.settings,
            Checks::from_registry(&checks),
            &mut collector,
        );
        log_outcome(&outcome);

        self.applier
            .apply_all(collector.patches())
            .await
            .context(ApplyChangesSnafu)
    }
}

/// The workload counts as ready if all requested replicas are available, and there is at least
/// one.
fn workload_available(deployment: &Deployment) -> bool {
    let requested_replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or_default();
    let available_replicas = deployment
        .status
        .as_ref()
        .and_then(|status| status.available_replicas)
        .unwrap_or_default();

    requested_replicas == available_replicas && requested_replicas != 0
}

fn log_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::NoReleases | CycleOutcome::UpToDate | CycleOutcome::NothingToDeploy => {
            tracing::debug!(?outcome, "nothing to deploy");
        }
        CycleOutcome::Forced(release) | CycleOutcome::Deployed(release) => {
            tracing::info!(
                release.name = %release.name,
                release.version = release.version.raw(),
                "release deployed"
            );
        }
        CycleOutcome::WaitingForWindow {
            release,
            next_allowed,
        } => {
            tracing::info!(
                release.name = %release,
                %next_allowed,
                "release is waiting for the update window"
            );
        }
        CycleOutcome::Blocked { release, reason } => {
            tracing::info!(release.name = %release, %reason, "release is blocked");
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use rstest::rstest;

    use super::*;

    fn deployment(requested: i32, available: i32) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(requested),
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(available),
                ..DeploymentStatus::default()
            }),
            ..Deployment::default()
        }
    }

    #[rstest]
    #[case::available(deployment(1, 1), true)]
    #[case::missing_replicas(deployment(2, 1), false)]
    #[case::scaled_down(deployment(0, 0), false)]
    #[case::no_status(Deployment::default(), false)]
    fn availability(#[case] deployment: Deployment, #[case] available: bool) {
        assert_eq!(workload_available(&deployment), available);
    }
}
