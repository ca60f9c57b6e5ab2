//! Release requirements checked against the running cluster.

use std::{fmt::Display, num::ParseIntError, str::FromStr};

use k8s_openapi::apimachinery::pkg::version::Info;
use release_rollout::checks::CheckRegistry;
use snafu::{OptionExt, ResultExt, Snafu};

/// Requires a minimal Kubernetes version, e.g. `k8s: "1.27"`.
pub const KUBERNETES_REQUIREMENT: &str = "k8s";

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseVersionError {
    #[snafu(display("version {input:?} is missing the minor component"))]
    MissingMinor { input: String },

    #[snafu(display("failed to parse version component of {input:?}"))]
    ParseComponent {
        source: ParseIntError,
        input: String,
    },
}

/// A Kubernetes version, precise to the minor component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KubernetesVersion {
    major: u64,
    minor: u64,
}

impl KubernetesVersion {
    /// Reads the version reported by the API server. Some distributions append a `+` to the
    /// minor version.
    pub fn from_info(info: &Info) -> Result<Self, ParseVersionError> {
        format!("{}.{}", info.major, info.minor.trim_end_matches('+')).parse()
    }
}

impl FromStr for KubernetesVersion {
    type Err = ParseVersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut components = input.trim_start_matches('v').split('.');

        let major = components.next().unwrap_or_default();
        let minor = components.next().context(MissingMinorSnafu { input })?;

        Ok(Self {
            major: major.parse().context(ParseComponentSnafu { input })?,
            minor: minor.parse().context(ParseComponentSnafu { input })?,
        })
    }
}

impl Display for KubernetesVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Builds the checks available on a cluster running Kubernetes `cluster_version`.
pub fn cluster_checks(cluster_version: KubernetesVersion) -> CheckRegistry {
    let mut registry = CheckRegistry::new();

    registry.register_requirement(KUBERNETES_REQUIREMENT, move |required| {
        let required = required
            .parse::<KubernetesVersion>()
            .map_err(|error| error.to_string())?;

        if cluster_version >= required {
            Ok(())
        } else {
            Err(format!(
                "cluster runs Kubernetes {cluster_version}, at least {required} is required"
            ))
        }
    });

    registry
}
