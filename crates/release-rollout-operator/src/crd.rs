use std::collections::BTreeMap;

use kube::CustomResource;
use release_rollout::release::ReleaseStatus;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single declared version of the platform.
///
/// Releases are created by whatever watches the release channel. Which release is deployed and
/// the lifecycle of every release is tracked in its status by this operator.
#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[kube(
    group = "deckhouse.io",
    version = "v1alpha1",
    kind = "DeckhouseRelease",
    plural = "deckhousereleases",
    shortname = "dr",
    status = "DeckhouseReleaseStatus",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    crates(
        kube_core = "kube::core",
        k8s_openapi = "k8s_openapi",
        schemars = "schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct DeckhouseReleaseSpec {
    /// The platform version, e.g. `v1.25.3`.
    pub version: String,

    /// Canary delay. The release is not deployed before this point in time (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_after: Option<String>,

    /// Requirement keys mapped to the value the cluster has to satisfy, e.g. `k8s: "1.27"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requirements: BTreeMap<String, String>,

    /// Manual approval of the release. The `release.deckhouse.io/approved` annotation takes
    /// precedence if it is set.
    #[serde(default)]
    pub approved: bool,

    /// Disruptions this release causes. Depending on the disruption approval mode, they have to
    /// be approved before the release is deployed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disruptions: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckhouseReleaseStatus {
    #[serde(default)]
    pub phase: String,

    #[serde(default)]
    pub approved: bool,

    #[serde(default)]
    pub message: String,

    /// When the status last changed (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_time: Option<String>,
}

impl From<&ReleaseStatus> for DeckhouseReleaseStatus {
    fn from(status: &ReleaseStatus) -> Self {
        Self {
            phase: status.phase.to_string(),
            approved: status.approved,
            message: status.message.clone(),
            transition_time: status.transition_time.map(|time| time.to_string()),
        }
    }
}
