//! The write side of the controller.
//!
//! The controller only describes *what* has to change. Persisting status changes, removing
//! markers and changing the workload image is up to a [`StatusSink`]. The [`PatchCollector`]
//! records every requested change so it can be applied (or inspected) after a cycle finished.

use strum::{AsRefStr, Display};

use crate::release::ReleaseStatus;

/// Markers on a release which the controller consumes and then requests to be removed.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Marker {
    Suspend,
    Force,
}

pub trait StatusSink {
    /// Persists the new `status` of the release named `release_name`.
    fn set_status(&mut self, release_name: &str, status: &ReleaseStatus);

    /// Changes the image of the platform workload to `version`.
    fn set_workload_image(&mut self, version: &str);

    /// Removes the `marker` from the release named `release_name`.
    fn clear_marker(&mut self, release_name: &str, marker: Marker);
}

/// A single change requested by the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReleasePatch {
    Status {
        release: String,
        status: ReleaseStatus,
    },
    WorkloadImage {
        version: String,
    },
    ClearMarker {
        release: String,
        marker: Marker,
    },
}

/// A [`StatusSink`] which collects all requested changes in order.
#[derive(Clone, Debug, Default)]
pub struct PatchCollector {
    patches: Vec<ReleasePatch>,
}

impl PatchCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patches(&self) -> &[ReleasePatch] {
        &self.patches
    }

    pub fn into_patches(self) -> Vec<ReleasePatch> {
        self.patches
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Returns the last status requested for the release named `release_name`.
    pub fn last_status(&self, release_name: &str) -> Option<&ReleaseStatus> {
        self.patches.iter().rev().find_map(|patch| match patch {
            ReleasePatch::Status { release, status } if release == release_name => Some(status),
            _ => None,
        })
    }

    /// Returns the last requested workload image version.
    pub fn workload_image(&self) -> Option<&str> {
        self.patches.iter().rev().find_map(|patch| match patch {
            ReleasePatch::WorkloadImage { version } => Some(version.as_str()),
            _ => None,
        })
    }

    /// Returns whether removing `marker` was requested for the release named `release_name`.
    pub fn marker_cleared(&self, release_name: &str, marker: Marker) -> bool {
        self.patches.iter().any(|patch| {
            matches!(
                patch,
                ReleasePatch::ClearMarker { release, marker: cleared }
                    if release == release_name && *cleared == marker
            )
        })
    }
}

impl StatusSink for PatchCollector {
    fn set_status(&mut self, release_name: &str, status: &ReleaseStatus) {
        self.patches.push(ReleasePatch::Status {
            release: release_name.to_owned(),
            status: status.clone(),
        });
    }

    fn set_workload_image(&mut self, version: &str) {
        self.patches.push(ReleasePatch::WorkloadImage {
            version: version.to_owned(),
        });
    }

    fn clear_marker(&mut self, release_name: &str, marker: Marker) {
        self.patches.push(ReleasePatch::ClearMarker {
            release: release_name.to_owned(),
            marker,
        });
    }
}
