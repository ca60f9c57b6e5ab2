//! Applies the changes requested during a rollout cycle to the cluster.

use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    Api,
    api::{Patch, PatchParams},
};
use release_rollout::{
    channel::{ImageRef, ParseImageRefError},
    sink::ReleasePatch,
};
use serde_json::{Value, json};
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::instrument;

use crate::{
    adapter::marker_annotation,
    crd::{DeckhouseRelease, DeckhouseReleaseStatus},
};

pub const FIELD_MANAGER: &str = "release-rollout-operator";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to patch status of release {release:?}"))]
    PatchStatus { source: kube::Error, release: String },

    #[snafu(display("failed to remove annotation {annotation:?} from release {release:?}"))]
    RemoveAnnotation {
        source: kube::Error,
        release: String,
        annotation: String,
    },

    #[snafu(display("failed to get platform workload {name:?}"))]
    GetWorkload { source: kube::Error, name: String },

    #[snafu(display("platform workload {name:?} has no containers"))]
    MissingContainer { name: String },

    #[snafu(display("failed to parse image of container {container:?}"))]
    ParseImage {
        source: ParseImageRefError,
        container: String,
    },

    #[snafu(display("failed to change image of platform workload {name:?}"))]
    PatchWorkload { source: kube::Error, name: String },
}

/// Applies [`ReleasePatch`]es using the Kubernetes API.
pub struct PatchApplier {
    releases: Api<DeckhouseRelease>,
    deployments: Api<Deployment>,
    workload_name: String,
}

impl PatchApplier {
    pub fn new(
        releases: Api<DeckhouseRelease>,
        deployments: Api<Deployment>,
        workload_name: impl Into<String>,
    ) -> Self {
        Self {
            releases,
            deployments,
            workload_name: workload_name.into(),
        }
    }

    /// Applies all `patches` in order, stopping at the first failure.
    pub async fn apply_all(&self, patches: &[ReleasePatch]) -> Result<(), Error> {
        for patch in patches {
            self.apply(patch).await?;
        }

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn apply(&self, patch: &ReleasePatch) -> Result<(), Error> {
        let params = PatchParams::apply(FIELD_MANAGER);

        match patch {
            ReleasePatch::Status { release, status } => {
                let status = json!({ "status": DeckhouseReleaseStatus::from(status) });
                self.releases
                    .patch_status(release, &params, &Patch::Merge(status))
                    .await
                    .context(PatchStatusSnafu { release })?;
            }
            ReleasePatch::ClearMarker { release, marker } => {
                let annotation = marker_annotation(*marker);
                let patch = json!({ "metadata": { "annotations": { annotation: null } } });
                self.releases
                    .patch(release, &params, &Patch::Merge(patch))
                    .await
                    .context(RemoveAnnotationSnafu {
                        release,
                        annotation,
                    })?;
            }
            ReleasePatch::WorkloadImage { version } => {
                let name = self.workload_name.as_str();
                let deployment = self
                    .deployments
                    .get(name)
                    .await
                    .context(GetWorkloadSnafu { name })?;

                let patch = image_patch(&deployment, name, version)?;
                self.deployments
                    .patch(name, &params, &Patch::Strategic(patch))
                    .await
                    .context(PatchWorkloadSnafu { name })?;

                tracing::info!(workload.name = name, %version, "changed platform image");
            }
        }

        Ok(())
    }
}

/// Builds a strategic merge patch which changes the tag of the first container of `deployment`
/// to `version`, keeping its repository.
fn image_patch(deployment: &Deployment, name: &str, version: &str) -> Result<Value, Error> {
    let container = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .and_then(|pod| pod.containers.first())
        .context(MissingContainerSnafu { name })?;

    let image = container
        .image
        .as_deref()
        .unwrap_or_default()
        .parse::<ImageRef>()
        .context(ParseImageSnafu {
            container: &container.name,
        })?
        .with_tag(version);

    Ok(json!({
        "spec": {
            "template": {
                "spec": {
                    "containers": [{ "name": container.name, "image": image.to_string() }]
                }
            }
        }
    }))
}
