//! Release channel tracking.
//!
//! When the platform follows a named [`ReleaseChannel`] instead of release records, the running
//! image tag *is* the channel name. Moving to another channel happens one step per cycle with
//! [`next_channel_step`], using image digests to skip channels which carry identical images.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};

/// A stability tier. Channels are ordered from least to most stable.
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    AsRefStr,
    StrumDisplay,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseChannel {
    #[strum(to_string = "alpha")]
    #[serde(alias = "Alpha")]
    Alpha,

    #[strum(to_string = "beta")]
    #[serde(alias = "Beta")]
    Beta,

    #[strum(to_string = "early-access", serialize = "EarlyAccess")]
    #[serde(alias = "EarlyAccess")]
    EarlyAccess,

    #[strum(to_string = "stable")]
    #[serde(alias = "Stable")]
    Stable,

    #[strum(to_string = "rock-solid", serialize = "RockSolid")]
    #[serde(alias = "RockSolid")]
    RockSolid,
}

impl ReleaseChannel {
    /// All channels, ordered from least to most stable.
    pub const ALL: [Self; 5] = [
        Self::Alpha,
        Self::Beta,
        Self::EarlyAccess,
        Self::Stable,
        Self::RockSolid,
    ];

    fn position(self) -> usize {
        self as usize
    }

    /// Returns the channels passed when moving from `self` to `desired`, excluding `self` and
    /// including `desired`, in walking order.
    pub fn path_to(self, desired: Self) -> Vec<Self> {
        let (from, to) = (self.position(), desired.position());

        if from < to {
            Self::ALL[from + 1..=to].to_vec()
        } else {
            Self::ALL[to..from].iter().rev().copied().collect()
        }
    }
}

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum ParseImageRefError {
    #[snafu(display("image reference {input:?} has no repository"))]
    MissingRepository { input: String },

    #[snafu(display("image reference {input:?} has an empty tag"))]
    EmptyTag { input: String },
}

/// A `repository:tag` image reference.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ImageRef {
    repository: String,
    tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the same repository with a different tag.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self::new(self.repository.clone(), tag)
    }
}

impl FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // The last colon only separates the tag if it is not part of a registry host:port.
        let (repository, tag) = match input.rsplit_once(':') {
            Some((repository, tag)) if !tag.contains('/') => (repository, tag),
            _ => (input, "latest"),
        };

        ensure!(!repository.is_empty(), MissingRepositorySnafu { input });
        ensure!(!tag.is_empty(), EmptyTagSnafu { input });

        Ok(Self::new(repository, tag))
    }
}

impl Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Looks up image digests by tag, within a single repository.
pub trait ImageRegistry {
    type Error: std::error::Error + 'static;

    fn digest(&self, tag: &str) -> Result<String, Self::Error>;
}

#[derive(Debug, Snafu)]
pub enum StepError<E: std::error::Error + 'static> {
    #[snafu(display("failed to fetch the digest of tag {tag:?}"))]
    FetchDigest { source: E, tag: String },
}

/// Computes the image to move to next when following the `desired` channel.
///
/// Returns `Ok(None)` if the current tag is not a channel name or the desired channel is
/// already running. Otherwise the channels between the current and the desired one are walked
/// one by one:
///
/// - When upgrading (towards a more stable channel), the walk stops at the first channel whose
///   digest differs from the running one, or at the desired channel. Channels carrying the very
///   same image are skipped.
/// - When downgrading, the walk stops at the last channel which still carries the running
///   image. Content never changes in a downgrade step, so if the very next channel differs,
///   nothing moves.
///
/// Any registry error aborts the whole step.
pub fn next_channel_step<R>(
    current: &ImageRef,
    desired: ReleaseChannel,
    registry: &R,
) -> Result<Option<ImageRef>, StepError<R::Error>>
where
    R: ImageRegistry,
{
    let Ok(current_channel) = current.tag().parse::<ReleaseChannel>() else {
        tracing::debug!(image.tag = current.tag(), "running tag is not a release channel");
        return Ok(None);
    };

    if current_channel == desired {
        return Ok(None);
    }

    let fetch_digest = |tag: &str| {
        registry
            .digest(tag)
            .map(|digest| digest.trim().to_owned())
            .context(FetchDigestSnafu { tag })
    };

    let current_digest = fetch_digest(current.tag())?;
    let upgrading = desired > current_channel;

    let mut target = None;
    for channel in current_channel.path_to(desired) {
        let same_image = fetch_digest(channel.as_ref())? == current_digest;

        if upgrading {
            target = Some(channel);
            if !same_image {
                break;
            }
        } else {
            if !same_image {
                break;
            }
            target = Some(channel);
        }
    }

    if let Some(target) = target {
        tracing::info!(
            release.channel.current = %current_channel,
            release.channel.desired = %desired,
            release.channel.next = %target,
            "moving to the next release channel"
        );
    }

    Ok(target.map(|channel| current.with_tag(channel.as_ref())))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rstest::rstest;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("tag {tag:?} not found"))]
    struct TagNotFound {
        tag: String,
    }

    struct FakeRegistry(BTreeMap<&'static str, &'static str>);

    impl FakeRegistry {
        fn new(digests: impl IntoIterator<Item = (&'static str, &'static str)>) -> Self {
            Self(digests.into_iter().collect())
        }
    }

    impl ImageRegistry for FakeRegistry {
        type Error = TagNotFound;

        fn digest(&self, tag: &str) -> Result<String, Self::Error> {
            self.0
                .get(tag)
                .map(|digest| (*digest).to_owned())
                .ok_or_else(|| TagNotFound {
                    tag: tag.to_owned(),
                })
        }
    }

    fn image(tag: &str) -> ImageRef {
        ImageRef::new("registry.example.com/platform", tag)
    }

    #[rstest]
    #[case("alpha", ReleaseChannel::Alpha)]
    #[case("early-access", ReleaseChannel::EarlyAccess)]
    #[case("EarlyAccess", ReleaseChannel::EarlyAccess)]
    #[case("RockSolid", ReleaseChannel::RockSolid)]
    #[case("Stable", ReleaseChannel::Stable)]
    fn parse_channel(#[case] input: &str, #[case] expected: ReleaseChannel) {
        assert_eq!(input.parse::<ReleaseChannel>(), Ok(expected));
    }

    #[test]
    fn channel_order_and_names() {
        assert!(ReleaseChannel::Alpha < ReleaseChannel::Beta);
        assert!(ReleaseChannel::Stable < ReleaseChannel::RockSolid);
        assert_eq!(ReleaseChannel::EarlyAccess.to_string(), "early-access");
        assert_eq!(ReleaseChannel::RockSolid.as_ref(), "rock-solid");
    }

    #[test]
    fn path_between_channels() {
        type C = ReleaseChannel;

        assert_eq!(C::Alpha.path_to(C::Stable), [C::Beta, C::EarlyAccess, C::Stable]);
        assert_eq!(C::RockSolid.path_to(C::Beta), [C::Stable, C::EarlyAccess, C::Beta]);
        assert_eq!(C::Beta.path_to(C::Alpha), [C::Alpha]);
        assert!(C::Stable.path_to(C::Stable).is_empty());
    }

    #[rstest]
    #[case::plain(
        "registry.example.com/platform:stable",
        "registry.example.com/platform",
        "stable"
    )]
    #[case::port(
        "registry.example.com:5000/platform:alpha",
        "registry.example.com:5000/platform",
        "alpha"
    )]
    #[case::port_without_tag(
        "registry.example.com:5000/platform",
        "registry.example.com:5000/platform",
        "latest"
    )]
    fn parse_image_ref(#[case] input: &str, #[case] repository: &str, #[case] tag: &str) {
        let image = input.parse::<ImageRef>().expect("image must parse");

        assert_eq!(image.repository(), repository);
        assert_eq!(image.tag(), tag);
        assert_eq!(image.to_string(), format!("{repository}:{tag}"));
    }

    #[test]
    fn not_a_channel_tag() {
        let registry = FakeRegistry::new([]);

        let next = next_channel_step(&image("v1.25.0"), ReleaseChannel::Stable, &registry)
            .expect("step must not fail");
        assert_eq!(next, None);
    }

    #[test]
    fn already_on_desired_channel() {
        let registry = FakeRegistry::new([]);

        let next = next_channel_step(&image("stable"), ReleaseChannel::Stable, &registry)
            .expect("step must not fail");
        assert_eq!(next, None);
    }

    #[rstest]
    #[case::skips_identical(
        [("alpha", "a"), ("beta", "a"), ("early-access", "a"), ("stable", "b")],
        Some("stable")
    )]
    #[case::stops_at_first_difference(
        [("alpha", "a"), ("beta", "b"), ("early-access", "c"), ("stable", "d")],
        Some("beta")
    )]
    #[case::all_identical(
        [("alpha", "a"), ("beta", "a"), ("early-access", "a"), ("stable", "a")],
        Some("stable")
    )]
    fn upgrade(
        #[case] digests: [(&'static str, &'static str); 4],
        #[case] expected: Option<&str>,
    ) {
        let registry = FakeRegistry::new(digests);

        let next = next_channel_step(&image("alpha"), ReleaseChannel::Stable, &registry)
            .expect("step must not fail");
        assert_eq!(next, expected.map(image));
    }

    #[rstest]
    #[case::stops_before_difference(
        [("rock-solid", "a"), ("stable", "a"), ("early-access", "a"), ("beta", "b")],
        Some("early-access")
    )]
    #[case::refuses_changed_content(
        [("rock-solid", "a"), ("stable", "b"), ("early-access", "b"), ("beta", "b")],
        None
    )]
    #[case::all_identical(
        [("rock-solid", "a"), ("stable", "a"), ("early-access", "a"), ("beta", "a")],
        Some("beta")
    )]
    fn downgrade(
        #[case] digests: [(&'static str, &'static str); 4],
        #[case] expected: Option<&str>,
    ) {
        let registry = FakeRegistry::new(digests);

        let next = next_channel_step(&image("rock-solid"), ReleaseChannel::Beta, &registry)
            .expect("step must not fail");
        assert_eq!(next, expected.map(image));
    }

    #[test]
    fn registry_error_aborts_step() {
        let registry = FakeRegistry::new([("alpha", "a"), ("beta", "a")]);

        let error = next_channel_step(&image("alpha"), ReleaseChannel::Stable, &registry)
            .expect_err("missing tag must fail the step");
        assert!(matches!(error, StepError::FetchDigest { ref tag, .. } if tag == "early-access"));
    }
}
