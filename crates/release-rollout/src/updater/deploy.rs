use super::{DeployedRelease, Updater};
use crate::{release::Phase, sink::Marker};

impl Updater<'_> {
    /// Deploys the forced release, bypassing every gate and update window.
    ///
    /// All releases older than the forced one are marked as `Outdated` afterwards. Returns
    /// [`None`] if no release is forced.
    pub fn apply_forced_release(&mut self) -> Option<DeployedRelease> {
        let index = self.forced?;

        tracing::warn!(release.name = %self.releases[index].name, "forcing release");
        let deployed = self.run_release_deploy(index);

        self.sink.clear_marker(&self.releases[index].name, Marker::Force);
        self.releases[index].force_requested = false;
        self.forced = None;

        let older: Vec<_> = (0..index)
            .filter(|older| self.releases[*older].phase() != Phase::Outdated)
            .collect();
        for older in older {
            self.update_status(older, Phase::Outdated, "", Some(true));
        }

        Some(deployed)
    }

    /// Changes the workload image to the release at `index`, marks it as deployed and retires
    /// the previously deployed release and all skipped patches.
    pub(super) fn run_release_deploy(&mut self, index: usize) -> DeployedRelease {
        let release = &self.releases[index];
        tracing::info!(
            release.name = %release.name,
            release.version = %release.version,
            "applying release"
        );

        let deployed = DeployedRelease {
            name: release.name.clone(),
            version: release.version.clone(),
        };
        self.sink.set_workload_image(release.version.raw());

        self.update_status(index, Phase::Deployed, "", Some(true));

        if let Some(previous) = self.deployed.filter(|previous| *previous != index) {
            self.update_status(
                previous,
                Phase::Outdated,
                "Last Deployed release outdated",
                None,
            );
        }

        for skipped in std::mem::take(&mut self.skipped_patches) {
            if skipped != index {
                self.update_status(
                    skipped,
                    Phase::Outdated,
                    "Skipped because of new patches",
                    Some(true),
                );
            }
        }

        self.deployed = Some(index);
        self.predicted = None;

        deployed
    }
}
