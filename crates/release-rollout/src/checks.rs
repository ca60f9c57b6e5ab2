//! Requirement and disruption checks a release has to pass before it can be deployed.
//!
//! The checks themselves live outside of the controller. They are handed to the
//! [`Updater`](crate::updater::Updater) as trait objects via [`Checks`]. [`CheckRegistry`] is a
//! small in-memory implementation of both traits, keyed by check name.

use std::{collections::BTreeMap, fmt::Debug};

use snafu::Snafu;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum RequirementError {
    /// No check is registered for the requirement key. This is a configuration problem rather
    /// than a release which is not ready yet.
    #[snafu(display("requirement {key:?} is not registered"))]
    NotRegistered { key: String },

    #[snafu(display("{reason}"))]
    NotMet { reason: String },
}

/// Checks release requirements, e.g. a minimal Kubernetes version.
pub trait RequirementRegistry {
    /// Checks the requirement `key` against the `value` the release requires.
    fn check(&self, key: &str, value: &str) -> Result<(), RequirementError>;
}

/// Reports whether a release would cause a disruption of a given kind.
pub trait DisruptionRegistry {
    /// Returns whether the disruption `key` applies to the cluster, alongside a human-readable
    /// reason. Unknown keys never cause a disruption.
    fn has_disruption(&self, key: &str) -> (bool, String);
}

/// The set of checks used by a single [`Updater`](crate::updater::Updater).
#[derive(Clone, Copy)]
pub struct Checks<'a> {
    pub requirements: &'a dyn RequirementRegistry,
    pub disruptions: &'a dyn DisruptionRegistry,
}

impl<'a> Checks<'a> {
    pub fn new(
        requirements: &'a dyn RequirementRegistry,
        disruptions: &'a dyn DisruptionRegistry,
    ) -> Self {
        Self {
            requirements,
            disruptions,
        }
    }

    /// Uses one registry for both requirement and disruption checks.
    pub fn from_registry<R>(registry: &'a R) -> Self
    where
        R: RequirementRegistry + DisruptionRegistry,
    {
        Self::new(registry, registry)
    }
}

type RequirementCheck = Box<dyn Fn(&str) -> Result<(), String> + Send + Sync>;
type DisruptionCheck = Box<dyn Fn() -> (bool, String) + Send + Sync>;

/// An in-memory registry of requirement and disruption checks.
///
/// ```
/// use release_rollout::checks::{CheckRegistry, RequirementRegistry};
///
/// let mut registry = CheckRegistry::new();
/// registry.register_requirement("k8s", |value| match value {
///     "1.29" => Ok(()),
///     other => Err(format!("cluster runs 1.29, {other} is required")),
/// });
///
/// assert!(registry.check("k8s", "1.29").is_ok());
/// assert!(registry.check("k8s", "1.31").is_err());
/// assert!(registry.check("ingress", "1.10").is_err());
/// ```
#[derive(Default)]
pub struct CheckRegistry {
    requirements: BTreeMap<String, RequirementCheck>,
    disruptions: BTreeMap<String, DisruptionCheck>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_requirement<F>(&mut self, key: impl Into<String>, check: F) -> &mut Self
    where
        F: Fn(&str) -> Result<(), String> + Send + Sync + 'static,
    {
        self.requirements.insert(key.into(), Box::new(check));
        self
    }

    pub fn register_disruption<F>(&mut self, key: impl Into<String>, check: F) -> &mut Self
    where
        F: Fn() -> (bool, String) + Send + Sync + 'static,
    {
        self.disruptions.insert(key.into(), Box::new(check));
        self
    }
}

impl Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("requirements", &self.requirements.keys().collect::<Vec<_>>())
            .field("disruptions", &self.disruptions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RequirementRegistry for CheckRegistry {
    fn check(&self, key: &str, value: &str) -> Result<(), RequirementError> {
        let check = self
            .requirements
            .get(key)
            .ok_or_else(|| RequirementError::NotRegistered {
                key: key.to_owned(),
            })?;

        check(value).map_err(|reason| RequirementError::NotMet { reason })
    }
}

impl DisruptionRegistry for CheckRegistry {
    fn has_disruption(&self, key: &str) -> (bool, String) {
        self.disruptions
            .get(key)
            .map_or_else(|| (false, String::new()), |check| check())
    }
}
