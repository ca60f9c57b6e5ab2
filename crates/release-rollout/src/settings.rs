//! Update settings, usually loaded from a YAML file or provided via CLI arguments.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use strum::{Display, EnumString};

use crate::{channel::ReleaseChannel, window::UpdateWindow};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read update settings from {path:?}"))]
    ReadSettingsFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to deserialize update settings"))]
    DeserializeSettings { source: serde_yaml::Error },
}

/// How releases are approved.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(
    Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
pub enum UpdateMode {
    /// Releases are approved automatically.
    #[default]
    Auto,

    /// Every non-patch release has to be approved manually.
    Manual,
}

/// How disruptive releases are approved.
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(
    Clone, Copy, Debug, Default, Hash, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
pub enum DisruptionApprovalMode {
    /// Disruptions never block a release.
    #[default]
    Auto,

    /// Every disruption has to be approved explicitly on the release.
    Manual,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettings {
    #[serde(default)]
    pub disruption_approval_mode: DisruptionApprovalMode,

    /// Windows in which non-patch releases may be deployed. No windows means always.
    #[serde(default)]
    pub windows: Vec<UpdateWindow>,

    /// When set, the platform follows this channel instead of release records. Stepping towards
    /// it is done by [`next_channel_step`](crate::channel::next_channel_step), the release record
    /// cycle does not support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_channel: Option<ReleaseChannel>,
}

impl UpdateSettings {
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context(DeserializeSettingsSnafu)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(ReadSettingsFileSnafu { path })?;

        Self::from_yaml_str(&contents)
    }
}
