//! Tag-following mode, used when the platform neither follows release records nor a release
//! channel. Whenever the registry serves a new image for the running tag, the platform workload
//! is restarted to pull it.

use snafu::{OptionExt, ResultExt, Snafu, ensure};

use crate::channel::{ImageRef, ImageRegistry, ParseImageRefError};

/// The image a single platform pod is running, as reported by its container status.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunningImage {
    /// The image reference, e.g. `registry.example.com/platform:main`.
    pub image: Option<String>,

    /// The resolved image, e.g. `registry.example.com/platform@sha256:...`.
    pub image_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagUpdate {
    /// At least one pod did not report its image yet, e.g. because it is restarting.
    NotReady,
    UpToDate,

    /// The registry serves a different image for the running tag.
    Restart { digest: String },
}

#[derive(Debug, Snafu)]
pub enum TagError<E: std::error::Error + 'static> {
    #[snafu(display("platform pods run different images"))]
    DifferentImages,

    #[snafu(display("image hash not found in {image_id:?}"))]
    MissingImageHash { image_id: String },

    #[snafu(display("failed to parse the running image"))]
    ParseImage { source: ParseImageRefError },

    #[snafu(display("failed to fetch the digest of tag {tag:?}"))]
    FetchDigest { source: E, tag: String },
}

/// Compares the digest of the image running in all `pods` against the digest the registry
/// serves for the same tag.
pub fn check_tag_update<R>(
    pods: &[RunningImage],
    registry: &R,
) -> Result<TagUpdate, TagError<R::Error>>
where
    R: ImageRegistry,
{
    let mut running = None;
    for pod in pods {
        let (Some(image), Some(image_id)) = (pod.image.as_deref(), pod.image_id.as_deref()) else {
            tracing::debug!("platform pod did not report its image yet, trying again later");
            return Ok(TagUpdate::NotReady);
        };

        match running {
            None => running = Some((image, image_id)),
            Some(first) => ensure!(first == (image, image_id), DifferentImagesSnafu),
        }
    }

    let Some((image, image_id)) = running else {
        return Ok(TagUpdate::NotReady);
    };

    let (_, running_digest) = image_id
        .rsplit_once('@')
        .context(MissingImageHashSnafu { image_id })?;
    let image = image.parse::<ImageRef>().context(ParseImageSnafu)?;

    let digest = registry
        .digest(image.tag())
        .context(FetchDigestSnafu { tag: image.tag() })?;
    let digest = digest.trim();

    if digest == running_digest.trim() {
        return Ok(TagUpdate::UpToDate);
    }

    tracing::info!(%image, digest, "new platform image found, restarting");
    Ok(TagUpdate::Restart {
        digest: digest.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[derive(Debug, Snafu)]
    #[snafu(display("tag {tag:?} not found"))]
    struct Unavailable {
        tag: String,
    }

    struct SingleTag(&'static str, &'static str);

    impl ImageRegistry for SingleTag {
        type Error = Unavailable;

        fn digest(&self, tag: &str) -> Result<String, Self::Error> {
            if tag == self.0 {
                Ok(format!("{}\n", self.1))
            } else {
                Err(Unavailable {
                    tag: tag.to_owned(),
                })
            }
        }
    }

    fn pod(image: &str, digest: &str) -> RunningImage {
        RunningImage {
            image: Some(image.to_owned()),
            image_id: Some(format!("registry.example.com/platform@{digest}")),
        }
    }

    #[rstest]
    #[case::same_digest("sha256:aaa", TagUpdate::UpToDate)]
    #[case::new_digest("sha256:bbb", TagUpdate::Restart { digest: "sha256:bbb".to_owned() })]
    fn compares_digests(#[case] served: &'static str, #[case] expected: TagUpdate) {
        let registry = SingleTag("main", served);
        let pods = [
            pod("registry.example.com/platform:main", "sha256:aaa"),
            pod("registry.example.com/platform:main", "sha256:aaa"),
        ];

        let update = check_tag_update(&pods, &registry).expect("check must not fail");
        assert_eq!(update, expected);
    }

    #[rstest]
    #[case::no_pods(vec![])]
    #[case::restarting(vec![RunningImage::default()])]
    #[case::missing_image_id(vec![RunningImage {
        image: Some("registry.example.com/platform:main".to_owned()),
        image_id: None,
    }])]
    fn not_ready(#[case] pods: Vec<RunningImage>) {
        let registry = SingleTag("main", "sha256:aaa");

        let update = check_tag_update(&pods, &registry).expect("check must not fail");
        assert_eq!(update, TagUpdate::NotReady);
    }

    #[test]
    fn pods_with_different_images() {
        let registry = SingleTag("main", "sha256:aaa");
        let pods = [
            pod("registry.example.com/platform:main", "sha256:aaa"),
            pod("registry.example.com/platform:main", "sha256:bbb"),
        ];

        assert!(matches!(
            check_tag_update(&pods, &registry),
            Err(TagError::DifferentImages)
        ));
    }

    #[test]
    fn missing_image_hash() {
        let registry = SingleTag("main", "sha256:aaa");
        let pods = [RunningImage {
            image: Some("registry.example.com/platform:main".to_owned()),
            image_id: Some("sha256:aaa".to_owned()),
        }];

        assert!(matches!(
            check_tag_update(&pods, &registry),
            Err(TagError::MissingImageHash { .. })
        ));
    }

    #[test]
    fn registry_error() {
        let registry = SingleTag("stable", "sha256:aaa");
        let pods = [pod("registry.example.com/platform:main", "sha256:aaa")];

        assert!(matches!(
            check_tag_update(&pods, &registry),
            Err(TagError::FetchDigest { .. })
        ));
    }
}
