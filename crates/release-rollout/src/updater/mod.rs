//! The release rollout session.
//!
//! An [`Updater`] lives for exactly one cycle. It takes ownership of the observed releases,
//! normalizes their status ([`Updater::prepare_releases`]), orders them and predicts which one
//! to deploy next ([`Updater::predict_next_release`]) and finally either deploys a forced release
//! ([`Updater::apply_forced_release`]) or gates and deploys the predicted one
//! ([`Updater::apply_predicted_release`]).
//!
//! Every change is written through the [`StatusSink`] and mirrored onto the in-session releases,
//! so decisions made later in the same cycle see the updated state.

use jiff::{Timestamp, Zoned};

use crate::{
    checks::Checks,
    release::{Phase, Release, ReleaseSnapshot, ReleaseStatus, ReleaseVersion},
    settings::{DisruptionApprovalMode, UpdateMode, UpdateSettings},
    sink::StatusSink,
};

mod deploy;
mod gate;
mod normalize;

#[cfg(test)]
mod fixtures;

pub use gate::{ApplyError, GateError};

/// Operational signals which stay the same for the whole session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub mode: UpdateMode,
    pub disruption_approval_mode: DisruptionApprovalMode,
    pub pod_ready: bool,
    pub bootstrapping: bool,
}

impl SessionOptions {
    pub fn new(snapshot: &ReleaseSnapshot, settings: &UpdateSettings) -> Self {
        Self {
            mode: snapshot.mode,
            disruption_approval_mode: settings.disruption_approval_mode,
            pod_ready: snapshot.pod_ready,
            bootstrapping: snapshot.bootstrapping,
        }
    }
}

/// The outcome of [`Updater::predict_next_release`]. All indices point into
/// [`Updater::releases`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseOrder {
    pub predicted: Option<usize>,
    pub deployed: Option<usize>,
    pub forced: Option<usize>,
    pub skipped_patches: Vec<usize>,
}

/// A release which was deployed during the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployedRelease {
    pub name: String,
    pub version: ReleaseVersion,
}

pub struct Updater<'a> {
    now: Timestamp,
    in_manual_mode: bool,
    disruption_approval_mode: DisruptionApprovalMode,
    pod_ready: bool,
    bootstrapping: bool,

    checks: Checks<'a>,
    sink: &'a mut dyn StatusSink,

    // Sorted by version after `prepare_releases`, every index below relies on that order.
    releases: Vec<Release>,
    total_pending_manual_releases: usize,

    predicted: Option<usize>,
    deployed: Option<usize>,
    forced: Option<usize>,
    skipped_patches: Vec<usize>,
}

impl<'a> Updater<'a> {
    pub fn new(
        now: Timestamp,
        options: SessionOptions,
        checks: Checks<'a>,
        sink: &'a mut dyn StatusSink,
    ) -> Self {
        Self {
            now,
            in_manual_mode: options.mode == UpdateMode::Manual,
            disruption_approval_mode: options.disruption_approval_mode,
            pod_ready: options.pod_ready,
            bootstrapping: options.bootstrapping,
            checks,
            sink,
            releases: Vec::new(),
            total_pending_manual_releases: 0,
            predicted: None,
            deployed: None,
            forced: None,
            skipped_patches: Vec::new(),
        }
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn in_manual_mode(&self) -> bool {
        self.in_manual_mode
    }

    /// Number of pending releases still waiting for a manual approval.
    pub fn total_pending_manual_releases(&self) -> usize {
        self.total_pending_manual_releases
    }

    pub fn predicted_release(&self) -> Option<&Release> {
        self.predicted.map(|index| &self.releases[index])
    }

    pub fn deployed_release(&self) -> Option<&Release> {
        self.deployed.map(|index| &self.releases[index])
    }

    /// Walks the sorted releases and decides which release should be deployed next.
    ///
    /// Only the newest patch of the lowest pending minor version is predicted, older patches of
    /// the same minor are collected as skipped. Pending releases older than the deployed one are
    /// skipped as well. The last release requested to be forced wins, whatever its phase.
    pub fn predict_next_release(&mut self) -> ReleaseOrder {
        self.predicted = None;
        self.forced = None;
        self.skipped_patches.clear();

        // The latest deployed release wins if, for whatever reason, there are multiple.
        self.deployed = self
            .releases
            .iter()
            .rposition(|release| release.phase() == Phase::Deployed);

        for index in 0..self.releases.len() {
            match self.releases[index].phase() {
                Phase::Pending => self.process_pending_release(index),
                Phase::Unset | Phase::Deployed | Phase::Outdated | Phase::Suspended => {}
            }

            if self.releases[index].force_requested {
                self.forced = Some(index);
            }
        }

        tracing::debug!(
            predicted = ?self.predicted_release().map(|release| &release.name),
            deployed = ?self.deployed_release().map(|release| &release.name),
            skipped_patches = self.skipped_patches.len(),
            "predicted next release"
        );

        self.order()
    }

    fn process_pending_release(&mut self, index: usize) {
        let version = &self.releases[index].version;

        if let Some(deployed) = self.deployed
            && self.releases[deployed].version.compare(version).is_gt()
        {
            tracing::debug!(
                release.name = %self.releases[index].name,
                "pending release is older than the deployed one"
            );
            self.skipped_patches.push(index);
            return;
        }

        if let Some(predicted) = self.predicted {
            if !self.releases[predicted].version.same_minor(version) {
                return;
            }

            // A newer patch of the already predicted release replaces it.
            self.skipped_patches.push(predicted);
        }

        self.predicted = Some(index);
    }

    pub fn order(&self) -> ReleaseOrder {
        ReleaseOrder {
            predicted: self.predicted,
            deployed: self.deployed,
            forced: self.forced,
            skipped_patches: self.skipped_patches.clone(),
        }
    }

    /// Returns `true` if the predicted release only differs from the deployed one in its patch
    /// version. Patches bypass update windows, manual approval, cooldown and pod readiness.
    pub fn predicted_release_is_patch(&self) -> bool {
        match (self.predicted, self.deployed) {
            (Some(predicted), Some(deployed)) => self.releases[deployed]
                .version
                .same_minor(&self.releases[predicted].version),
            _ => false,
        }
    }

    /// Returns `true` if the newest known release is the deployed one.
    pub fn last_release_deployed(&self) -> bool {
        self.deployed
            .is_some_and(|deployed| deployed + 1 == self.releases.len())
    }

    /// Returns `true` if the cluster is bootstrapping and the only known release is predicted.
    /// Such a release is deployed without any gate or update window.
    pub fn bootstrap_deploy_pending(&self) -> bool {
        self.bootstrapping && self.predicted.is_some() && self.releases.len() == 1
    }

    pub fn has_forced_release(&self) -> bool {
        self.forced.is_some()
    }

    /// Marks the predicted release as waiting for the next update window starting at
    /// `next_allowed`. Returns the name of the postponed release.
    pub fn postpone_for_window(&mut self, next_allowed: &Zoned) -> Option<String> {
        let index = self.predicted?;
        let message = format!(
            "Release is waiting for the update window: {}",
            next_allowed.timestamp()
        );

        tracing::info!(
            release.name = %self.releases[index].name,
            next_allowed = %next_allowed,
            "release is postponed until the next update window"
        );
        self.update_status(index, Phase::Pending, message, None);

        Some(self.releases[index].name.clone())
    }

    /// Writes a new status for the release at `index` and mirrors it onto the in-session
    /// release. Nothing is written if phase, message and approval did not change.
    ///
    /// `approved` keeps the current approval if set to [`None`]. Returns whether a status was
    /// written.
    fn update_status(
        &mut self,
        index: usize,
        phase: Phase,
        message: impl Into<String>,
        approved: Option<bool>,
    ) -> bool {
        let message = message.into();
        let status = &mut self.releases[index].status;
        let approved = approved.unwrap_or(status.approved);

        if status.phase == phase && status.message == message && status.approved == approved {
            return false;
        }

        *status = ReleaseStatus {
            phase,
            approved,
            message,
            transition_time: Some(self.now),
        };

        let release = &self.releases[index];
        tracing::debug!(
            release.name = %release.name,
            release.phase = %phase,
            release.approved = approved,
            "updating release status"
        );
        self.sink.set_status(&release.name, &release.status);

        true
    }
}
