use jiff::Timestamp;
use snafu::{OptionExt, ResultExt, Snafu, ensure};

use super::{DeployedRelease, Updater};
use crate::{
    checks::RequirementError,
    release::{Phase, Release},
    settings::DisruptionApprovalMode,
};

/// A reason why the predicted release cannot be deployed (yet).
///
/// The [`Display`](std::fmt::Display) output is written as the status message of the release.
#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum GateError {
    #[snafu(display("Release is in cooldown until: {until}"))]
    Cooldown { until: Timestamp },

    #[snafu(display("Waiting for Deckhouse pod to be ready"))]
    PodNotReady,

    #[snafu(display("Waiting for canary apply time: {apply_after}"))]
    CanaryDelay { apply_after: Timestamp },

    #[snafu(display("Waiting for manual approval"))]
    ManualApproval,

    #[snafu(display("{key:?} requirement for DeckhouseRelease {version:?} not met: {reason}"))]
    RequirementNotMet {
        key: String,
        version: String,
        reason: String,
    },

    #[snafu(display("{key:?} requirement not registered"))]
    RequirementNotRegistered { key: String },

    #[snafu(display(
        "Release requires disruption approval (`kubectl annotate DeckhouseRelease {release} release.deckhouse.io/disruption-approved=true`): {reason}"
    ))]
    DisruptionApprovalRequired { release: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Snafu)]
pub enum ApplyError {
    #[snafu(display("there is no predicted release to apply"))]
    NoPredictedRelease,

    #[snafu(display("release {release:?} cannot be deployed"))]
    Blocked { source: GateError, release: String },
}

impl Updater<'_> {
    /// Deploys the predicted release if it passes every gate.
    ///
    /// Gates are evaluated in order, the first failing one is recorded as a `Pending` status
    /// message on the release:
    ///
    /// 1. cooldown (not for patches)
    /// 2. platform pod readiness (not for patches)
    /// 3. canary apply time
    /// 4. approval (not for patches)
    /// 5. requirements
    /// 6. disruptions (only if disruptions need to be approved manually)
    ///
    /// While the cluster is bootstrapping and only a single release exists, it is deployed right
    /// away.
    pub fn apply_predicted_release(&mut self) -> Result<DeployedRelease, ApplyError> {
        let index = self.predicted.context(NoPredictedReleaseSnafu)?;

        if self.bootstrap_deploy_pending() {
            tracing::info!(
                release.name = %self.releases[index].name,
                "cluster is bootstrapping, deploying the first release"
            );
            return Ok(self.run_release_deploy(index));
        }

        if let Err(gate) = self.check_release_conditions(&self.releases[index]) {
            tracing::info!(
                release.name = %self.releases[index].name,
                reason = %gate,
                "release is not ready to be deployed"
            );

            self.update_status(index, Phase::Pending, gate.to_string(), None);

            let release = self.releases[index].name.clone();
            return Err(gate).context(BlockedSnafu { release });
        }

        Ok(self.run_release_deploy(index))
    }

    fn check_release_conditions(&self, release: &Release) -> Result<(), GateError> {
        let is_patch = self.predicted_release_is_patch();

        if !is_patch {
            if let Some(until) = release.cooldown_until {
                ensure!(self.now >= until, CooldownSnafu { until });
            }

            ensure!(self.pod_ready, PodNotReadySnafu);
        }

        if let Some(apply_after) = release.apply_after {
            ensure!(self.now >= apply_after, CanaryDelaySnafu { apply_after });
        }

        if !is_patch && !release.status.approved {
            tracing::info!(
                release.name = %release.name,
                pending_manual_releases = self.total_pending_manual_releases,
                "release is waiting for manual approval"
            );
            return ManualApprovalSnafu.fail();
        }

        self.check_requirements(release)?;
        self.check_disruptions(release)
    }

    fn check_requirements(&self, release: &Release) -> Result<(), GateError> {
        for (key, value) in &release.requirements {
            match self.checks.requirements.check(key, value) {
                Ok(()) => {}
                Err(RequirementError::NotRegistered { key }) => {
                    tracing::error!(
                        release.name = %release.name,
                        requirement = %key,
                        "release requirement is not registered"
                    );
                    return RequirementNotRegisteredSnafu { key }.fail();
                }
                Err(RequirementError::NotMet { reason }) => {
                    return RequirementNotMetSnafu {
                        key,
                        version: release.version.normalized(),
                        reason,
                    }
                    .fail();
                }
            }
        }

        Ok(())
    }

    fn check_disruptions(&self, release: &Release) -> Result<(), GateError> {
        if self.disruption_approval_mode == DisruptionApprovalMode::Auto {
            return Ok(());
        }

        for key in &release.disruptions {
            let (has_disruption, reason) = self.checks.disruptions.has_disruption(key);

            ensure!(
                !has_disruption || release.disruption_approved,
                DisruptionApprovalRequiredSnafu {
                    release: &release.name,
                    reason,
                }
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        checks::{CheckRegistry, Checks},
        settings::UpdateMode,
        sink::PatchCollector,
        updater::{SessionOptions, fixtures::*},
    };

    fn minor_update() -> Vec<Release> {
        vec![
            release("v1.25.0", Phase::Deployed),
            release("v1.26.0", Phase::Pending),
        ]
    }

    fn patch_update() -> Vec<Release> {
        vec![
            release("v1.25.0", Phase::Deployed),
            release("v1.25.1", Phase::Pending),
        ]
    }

    fn apply(
        options: SessionOptions,
        registry: &CheckRegistry,
        releases: Vec<Release>,
    ) -> (Result<DeployedRelease, ApplyError>, PatchCollector) {
        let mut sink = PatchCollector::new();
        let mut updater = Updater::new(now(), options, Checks::from_registry(registry), &mut sink);

        updater.prepare_releases(releases);
        updater.predict_next_release();
        let result = updater.apply_predicted_release();

        (result, sink)
    }

    fn blocked_reason(result: Result<DeployedRelease, ApplyError>) -> GateError {
        match result {
            Err(ApplyError::Blocked { source, .. }) => source,
            other => panic!("expected the release to be blocked, got {other:?}"),
        }
    }

    #[test]
    fn no_prediction_writes_nothing() {
        let (result, sink) = apply(
            ready(),
            &registry(),
            vec![release("v1.25.0", Phase::Deployed)],
        );

        assert_eq!(result, Err(ApplyError::NoPredictedRelease));
        assert!(sink.is_empty());
    }

    #[test]
    fn all_gates_pass() {
        let (result, sink) = apply(ready(), &registry(), minor_update());

        let deployed = result.expect("release must be deployed");
        assert_eq!(deployed.name, "v1-26-0");
        assert_eq!(sink.workload_image(), Some("v1.26.0"));
    }

    #[test]
    fn cooldown_blocks_minor_but_not_patch() {
        let cooldown = |mut releases: Vec<Release>| {
            releases[1].cooldown_until = Some(now() + jiff::SignedDuration::from_hours(1));
            releases
        };

        let (result, sink) = apply(ready(), &registry(), cooldown(minor_update()));
        let reason = blocked_reason(result);
        assert!(matches!(reason, GateError::Cooldown { .. }));
        assert_eq!(
            sink.last_status("v1-26-0").map(|status| status.message.as_str()),
            Some("Release is in cooldown until: 2024-01-01T13:00:00Z")
        );

        let (result, _) = apply(ready(), &registry(), cooldown(patch_update()));
        assert!(result.is_ok());
    }

    #[rstest]
    #[case::minor(minor_update(), false)]
    #[case::patch(patch_update(), true)]
    fn pod_readiness(#[case] releases: Vec<Release>, #[case] deployed: bool) {
        let (result, _) = apply(SessionOptions::default(), &registry(), releases);

        if deployed {
            assert!(result.is_ok());
        } else {
            assert_eq!(blocked_reason(result), GateError::PodNotReady);
        }
    }

    #[rstest]
    #[case::minor(minor_update())]
    #[case::patch(patch_update())]
    fn canary_blocks_every_release(#[case] mut releases: Vec<Release>) {
        let apply_after = now() + jiff::SignedDuration::from_mins(30);
        releases[1].apply_after = Some(apply_after);

        let (result, sink) = apply(ready(), &registry(), releases);

        assert_eq!(
            blocked_reason(result),
            GateError::CanaryDelay { apply_after }
        );
        assert_eq!(sink.workload_image(), None);
    }

    #[test]
    fn manual_mode_requires_approval_for_minor_releases() {
        let manual = SessionOptions {
            mode: UpdateMode::Manual,
            ..ready()
        };

        let (result, sink) = apply(manual, &registry(), minor_update());
        assert_eq!(blocked_reason(result), GateError::ManualApproval);
        assert_eq!(
            sink.last_status("v1-26-0").map(|status| status.message.as_str()),
            Some("Waiting for manual approval")
        );

        let (result, _) = apply(manual, &registry(), patch_update());
        assert!(result.is_ok());

        let mut approved = minor_update();
        approved[1].manually_approved = true;
        let (result, _) = apply(manual, &registry(), approved);
        assert!(result.is_ok());
    }

    #[test]
    fn unmet_requirement_blocks_and_keeps_approval() {
        let mut registry = registry();
        registry.register_requirement("k8s", |_| Err("min k8s version failed".to_owned()));

        let mut releases = minor_update();
        releases[1].status.approved = true;
        releases[1].version = crate::release::ReleaseVersion::new("v1.30.0");
        releases[1]
            .requirements
            .insert("k8s".to_owned(), "1.29".to_owned());

        let (result, sink) = apply(ready(), &registry, releases);

        assert!(matches!(
            blocked_reason(result),
            GateError::RequirementNotMet { .. }
        ));
        let status = sink.last_status("v1-26-0").expect("status must be written");
        assert_eq!(
            status.message,
            r#""k8s" requirement for DeckhouseRelease "1.30.0" not met: min k8s version failed"#
        );
        assert!(status.approved);
    }

    #[test]
    fn unregistered_requirement_blocks() {
        let mut releases = minor_update();
        releases[1]
            .requirements
            .insert("ingressNginx".to_owned(), "1.10".to_owned());

        let (result, sink) = apply(ready(), &registry(), releases);

        assert_eq!(
            blocked_reason(result),
            GateError::RequirementNotRegistered {
                key: "ingressNginx".to_owned()
            }
        );
        assert_eq!(
            sink.last_status("v1-26-0").map(|status| status.message.as_str()),
            Some(r#""ingressNginx" requirement not registered"#)
        );
    }

    #[rstest]
    #[case::auto_mode(DisruptionApprovalMode::Auto, false, true)]
    #[case::manual_mode(DisruptionApprovalMode::Manual, false, false)]
    #[case::manual_mode_approved(DisruptionApprovalMode::Manual, true, true)]
    fn disruptions(
        #[case] disruption_approval_mode: DisruptionApprovalMode,
        #[case] disruption_approved: bool,
        #[case] deployed: bool,
    ) {
        let mut registry = registry();
        registry.register_disruption("ingressNginx", || {
            (true, "ingress controllers will restart".to_owned())
        });

        let mut releases = minor_update();
        releases[1].disruptions = vec!["ingressNginx".to_owned()];
        releases[1].disruption_approved = disruption_approved;

        let options = SessionOptions {
            disruption_approval_mode,
            ..ready()
        };
        let (result, sink) = apply(options, &registry, releases);

        if deployed {
            assert!(result.is_ok());
        } else {
            assert!(matches!(
                blocked_reason(result),
                GateError::DisruptionApprovalRequired { .. }
            ));
            assert_eq!(
                sink.last_status("v1-26-0").map(|status| status.message.as_str()),
                Some(
                    "Release requires disruption approval (`kubectl annotate DeckhouseRelease v1-26-0 release.deckhouse.io/disruption-approved=true`): ingress controllers will restart"
                )
            );
        }
    }

    #[test]
    fn bootstrap_deploys_the_only_release() {
        let options = SessionOptions {
            bootstrapping: true,
            ..SessionOptions::default()
        };
        let mut only = release("v1.26.0", Phase::Pending);
        only.apply_after = Some(now() + jiff::SignedDuration::from_hours(24));

        let (result, sink) = apply(options, &registry(), vec![only]);

        assert!(result.is_ok());
        assert_eq!(sink.workload_image(), Some("v1.26.0"));
    }
}
