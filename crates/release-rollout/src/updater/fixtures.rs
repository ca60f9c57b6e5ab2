use jiff::Timestamp;

use super::SessionOptions;
use crate::{
    checks::CheckRegistry,
    release::{Phase, Release},
};

pub(super) fn now() -> Timestamp {
    "2024-01-01T12:00:00Z"
        .parse()
        .expect("test timestamp must be valid")
}

/// A session with a ready platform pod in automatic mode.
pub(super) fn ready() -> SessionOptions {
    SessionOptions {
        pod_ready: true,
        ..SessionOptions::default()
    }
}

pub(super) fn registry() -> CheckRegistry {
    CheckRegistry::new()
}

/// A release named after its version, e.g. `v1-25-0` for `v1.25.0`.
pub(super) fn release(version: &str, phase: Phase) -> Release {
    Release::new(version.replace('.', "-"), version).with_phase(phase)
}
