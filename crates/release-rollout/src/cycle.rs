//! A single rollout cycle, from the observed releases to at most one deployed release.

use jiff::{Zoned, tz::TimeZone};
use tracing::instrument;

use crate::{
    checks::Checks,
    clock::Clock,
    release::ReleaseSnapshot,
    settings::UpdateSettings,
    sink::StatusSink,
    updater::{ApplyError, DeployedRelease, GateError, SessionOptions, Updater},
    window::{is_window_open, next_allowed_time},
};

/// What happened during a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// There are no releases at all.
    NoReleases,

    /// The newest release is already deployed.
    UpToDate,

    /// A forced release was deployed without any checks.
    Forced(DeployedRelease),

    /// The predicted release passed every gate and was deployed.
    Deployed(DeployedRelease),

    /// The predicted release waits for the next update window.
    WaitingForWindow { release: String, next_allowed: Zoned },

    /// The predicted release did not pass a gate.
    Blocked { release: String, reason: GateError },

    /// No release qualifies for a deployment.
    NothingToDeploy,
}

/// Runs one rollout cycle over the releases in `snapshot`.
///
/// Patch releases, forced releases and the first release of a bootstrapping cluster are never
/// held back by update windows. Update windows are not consulted in manual mode either, since
/// every release is approved explicitly anyway.
#[instrument(skip_all, fields(releases = snapshot.releases.len(), mode = %snapshot.mode))]
pub fn run_cycle(
    clock: &dyn Clock,
    time_zone: &TimeZone,
    snapshot: ReleaseSnapshot,
    settings: &UpdateSettings,
    checks: Checks<'_>,
    sink: &mut dyn StatusSink,
) -> CycleOutcome {
    let options = SessionOptions::new(&snapshot, settings);
    let now = clock.now();
    let mut updater = Updater::new(now, options, checks, sink);

    updater.prepare_releases(snapshot.releases);
    if updater.releases().is_empty() {
        tracing::debug!("no releases found");
        return CycleOutcome::NoReleases;
    }

    updater.predict_next_release();
    if updater.last_release_deployed() {
        tracing::debug!("latest release is already deployed");
        return CycleOutcome::UpToDate;
    }

    if let Some(deployed) = updater.apply_forced_release() {
        return CycleOutcome::Forced(deployed);
    }

    let bypasses_windows = updater.predicted_release_is_patch()
        || updater.in_manual_mode()
        || updater.bootstrap_deploy_pending();

    if !bypasses_windows {
        let now = now.to_zoned(time_zone.clone());

        if !is_window_open(&now, &settings.windows) {
            let next_allowed = next_allowed_time(&now, &settings.windows);

            if let Some(release) = updater.postpone_for_window(&next_allowed) {
                return CycleOutcome::WaitingForWindow {
                    release,
                    next_allowed,
                };
            }
        }
    }

    match updater.apply_predicted_release() {
        Ok(deployed) => CycleOutcome::Deployed(deployed),
        Err(ApplyError::Blocked { release, source }) => CycleOutcome::Blocked {
            release,
            reason: source,
        },
        Err(ApplyError::NoPredictedRelease) => CycleOutcome::NothingToDeploy,
    }
}
