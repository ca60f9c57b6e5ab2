//! The release records the rollout controller operates on.
//!
//! A [`Release`] is a plain, already translated record. Whatever produced it (usually the
//! Kubernetes adapter in the operator binary) is responsible for turning annotations and other
//! markers into the boolean fields found here. The controller never looks at raw objects.

use std::{cmp::Ordering, collections::BTreeMap, fmt::Display};

use jiff::Timestamp;
use semver::Version;
use strum::{Display as StrumDisplay, EnumString};

use crate::settings::UpdateMode;

/// The lifecycle phase of a [`Release`].
///
/// Freshly created releases carry no phase at all, which is modelled by [`Phase::Unset`] and
/// rendered as an empty string.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum Phase {
    #[default]
    #[strum(serialize = "")]
    Unset,
    Pending,
    Deployed,
    Outdated,
    Suspended,
}

/// A release version as it was declared, plus its parsed semantic version if it could be parsed.
///
/// Versions are accepted with or without a leading `v`, e.g. `v1.25.0` and `1.25.0` are equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseVersion {
    raw: String,
    parsed: Option<Version>,
}

impl ReleaseVersion {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let parsed = Version::parse(raw.strip_prefix('v').unwrap_or(&raw)).ok();

        Self { raw, parsed }
    }

    /// The version exactly as it was declared.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn semver(&self) -> Option<&Version> {
        self.parsed.as_ref()
    }

    /// The parsed version without any prefix, or the raw version if it cannot be parsed.
    pub fn normalized(&self) -> String {
        self.parsed
            .as_ref()
            .map_or_else(|| self.raw.clone(), ToString::to_string)
    }

    pub fn is_parsable(&self) -> bool {
        self.parsed.is_some()
    }

    /// Returns `true` if both versions parse and share the same major and minor component.
    pub fn same_minor(&self, other: &Self) -> bool {
        match (&self.parsed, &other.parsed) {
            (Some(this), Some(other)) => this.major == other.major && this.minor == other.minor,
            _ => false,
        }
    }

    /// Compares two versions.
    ///
    /// If either of the versions cannot be parsed, neither is considered less than the other and
    /// [`Ordering::Equal`] is returned. This is *not* a total order: an unparsable version is
    /// "equal" to every other version, while those versions might not be equal to each other.
    /// See [`sort_by_version`] for how sorting deals with that.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (&self.parsed, &other.parsed) {
            (Some(this), Some(other)) => this.cmp(other),
            _ => Ordering::Equal,
        }
    }
}

impl Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The status part of a [`Release`] which is written back through the
/// [`StatusSink`](crate::sink::StatusSink).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseStatus {
    pub phase: Phase,
    pub approved: bool,
    pub message: String,
    pub transition_time: Option<Timestamp>,
}

/// One declared version of the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    /// Stable, unique name of the release, e.g. `v1-25-0`.
    pub name: String,
    pub version: ReleaseVersion,
    pub status: ReleaseStatus,

    /// Set if the release was approved by a human (or process) while running in
    /// [`UpdateMode::Manual`].
    pub manually_approved: bool,

    /// Set if the release is requested to be suspended.
    pub suspend_requested: bool,

    /// Set if the release is requested to be deployed immediately, bypassing every check.
    pub force_requested: bool,

    /// Set if the disruptions of this release were explicitly approved.
    pub disruption_approved: bool,

    /// Requirement keys mapped to the value each requirement is checked against.
    pub requirements: BTreeMap<String, String>,

    /// Disruption keys which need an explicit approval before the release can be deployed.
    pub disruptions: Vec<String>,

    /// Canary delay, the release must not be deployed before this point in time.
    pub apply_after: Option<Timestamp>,

    /// Like [`Release::apply_after`], but only enforced for non-patch releases.
    pub cooldown_until: Option<Timestamp>,
}

impl Release {
    /// Creates a new, freshly observed release without any phase.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: ReleaseVersion::new(version),
            status: ReleaseStatus::default(),
            manually_approved: false,
            suspend_requested: false,
            force_requested: false,
            disruption_approved: false,
            requirements: BTreeMap::new(),
            disruptions: Vec::new(),
            apply_after: None,
            cooldown_until: None,
        }
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.status.phase = phase;
        self
    }

    pub fn with_approved(mut self, approved: bool) -> Self {
        self.status.approved = approved;
        self
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }
}

/// Everything the controller gets to see during a single cycle.
#[derive(Clone, Debug, Default)]
pub struct ReleaseSnapshot {
    pub releases: Vec<Release>,
    pub mode: UpdateMode,

    /// Whether the currently running platform workload reports ready.
    pub pod_ready: bool,

    /// Whether the cluster is still being bootstrapped.
    pub bootstrapping: bool,
}

/// Sorts releases ascending by version.
///
/// Because [`ReleaseVersion::compare`] is not a total order for unparsable versions, the
/// standard library sorts must not be used here (they are allowed to panic on inconsistent
/// orderings). This is a stable insertion sort which only moves a release in front of another
/// one if it is strictly less. Where unparsable versions end up therefore depends on the input
/// order.
pub fn sort_by_version(releases: &mut [Release]) {
    for unsorted in 1..releases.len() {
        let mut index = unsorted;
        while index > 0
            && releases[index]
                .version
                .compare(&releases[index - 1].version)
                .is_lt()
        {
            releases.swap(index, index - 1);
            index -= 1;
        }
    }
}
