use super::Updater;
use crate::{
    release::{Phase, Release, sort_by_version},
    sink::Marker,
};

impl Updater<'_> {
    /// Takes over the releases observed in this cycle and normalizes their status:
    ///
    /// - freshly created releases become `Pending`
    /// - releases requested to be suspended become `Suspended` and the request is consumed
    /// - pending releases are approved, unless a manual approval is required and missing
    ///
    /// Afterwards the releases are sorted by version. Running this twice on the same releases
    /// writes nothing the second time.
    pub fn prepare_releases(&mut self, releases: Vec<Release>) {
        self.releases = releases;
        self.total_pending_manual_releases = 0;
        self.predicted = None;
        self.deployed = None;
        self.forced = None;
        self.skipped_patches.clear();

        for index in 0..self.releases.len() {
            self.patch_initial_status(index);
            self.patch_suspended_status(index);
            self.patch_manual_release(index);
        }

        for release in self.releases.iter().filter(|release| !release.version.is_parsable()) {
            tracing::warn!(
                release.name = %release.name,
                release.version = %release.version,
                "release version is not a valid semantic version"
            );
        }

        sort_by_version(&mut self.releases);
    }

    fn patch_initial_status(&mut self, index: usize) {
        if self.releases[index].phase() == Phase::Unset {
            self.update_status(index, Phase::Pending, "", None);
        }
    }

    fn patch_suspended_status(&mut self, index: usize) {
        if !self.releases[index].suspend_requested {
            return;
        }

        if self.update_status(index, Phase::Suspended, "Release is suspended", Some(false)) {
            let release = &mut self.releases[index];
            self.sink.clear_marker(&release.name, Marker::Suspend);
            release.suspend_requested = false;
        }
    }

    fn patch_manual_release(&mut self, index: usize) {
        let release = &self.releases[index];
        if release.phase() != Phase::Pending {
            return;
        }

        if self.in_manual_mode && !release.manually_approved {
            self.total_pending_manual_releases += 1;

            if release.status.approved {
                self.update_status(
                    index,
                    Phase::Pending,
                    "Release is waiting for manual approval",
                    Some(false),
                );
            }
        } else if !release.status.approved {
            let message = release.status.message.clone();
            self.update_status(index, Phase::Pending, message, Some(true));
        }
    }
}
