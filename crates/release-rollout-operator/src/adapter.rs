//! Translates [`DeckhouseRelease`] objects into the plain releases the rollout controller works
//! with. This is the only place which knows about annotations.

use const_format::concatcp;
use jiff::Timestamp;
use kube::ResourceExt;
use release_rollout::{
    release::{Phase, Release, ReleaseStatus},
    sink::Marker,
};

use crate::crd::DeckhouseRelease;

const ANNOTATION_PREFIX: &str = "release.deckhouse.io/";

pub const SUSPEND_ANNOTATION: &str = concatcp!(ANNOTATION_PREFIX, "suspended");
pub const FORCE_ANNOTATION: &str = concatcp!(ANNOTATION_PREFIX, "force");
pub const DISRUPTION_APPROVED_ANNOTATION: &str =
    concatcp!(ANNOTATION_PREFIX, "disruption-approved");
pub const COOLDOWN_ANNOTATION: &str = concatcp!(ANNOTATION_PREFIX, "cooldown");
pub const APPROVED_ANNOTATION: &str = concatcp!(ANNOTATION_PREFIX, "approved");

/// The annotation which carries the given marker.
pub fn marker_annotation(marker: Marker) -> &'static str {
    match marker {
        Marker::Suspend => SUSPEND_ANNOTATION,
        Marker::Force => FORCE_ANNOTATION,
    }
}

pub fn to_release(object: &DeckhouseRelease) -> Release {
    let name = object.name_any();
    let annotations = object.annotations();
    let flag = |key: &str| annotations.get(key).is_some_and(|value| value == "true");

    let status = object.status.as_ref().map(|status| ReleaseStatus {
        phase: status.phase.parse().unwrap_or_else(|_| {
            tracing::warn!(release.name = %name, phase = %status.phase, "unknown release phase");
            Phase::Unset
        }),
        approved: status.approved,
        message: status.message.clone(),
        transition_time: parse_timestamp(
            &name,
            "status.transitionTime",
            status.transition_time.as_deref(),
        ),
    });

    let mut release = Release::new(&name, &object.spec.version);
    release.status = status.unwrap_or_default();
    release.manually_approved = match annotations.get(APPROVED_ANNOTATION) {
        Some(value) => value == "true",
        None => object.spec.approved,
    };
    release.suspend_requested = flag(SUSPEND_ANNOTATION);
    release.force_requested = flag(FORCE_ANNOTATION);
    release.disruption_approved = flag(DISRUPTION_APPROVED_ANNOTATION);
    release.requirements = object.spec.requirements.clone();
    release.disruptions = object.spec.disruptions.clone();
    release.apply_after = parse_timestamp(
        &name,
        "spec.applyAfter",
        object.spec.apply_after.as_deref(),
    );
    release.cooldown_until = parse_timestamp(
        &name,
        COOLDOWN_ANNOTATION,
        annotations.get(COOLDOWN_ANNOTATION).map(String::as_str),
    );

    release
}

/// Invalid timestamps are ignored, the corresponding gate is not enforced then.
fn parse_timestamp(release: &str, field: &str, value: Option<&str>) -> Option<Timestamp> {
    let value = value?;

    match value.parse() {
        Ok(timestamp) => Some(timestamp),
        Err(error) => {
            tracing::warn!(
                release.name = release,
                field,
                value,
                error = &error as &dyn std::error::Error,
                "ignoring invalid timestamp"
            );
            None
        }
    }
}
