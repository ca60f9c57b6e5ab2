//! Release rollout controller for platform self-updates.
//!
//! Given the declared releases of the platform and a few operational signals, a rollout cycle
//! selects at most one release to deploy, keeps the lifecycle phase of every release up to date
//! and changes the image of the platform workload. Everything cluster-specific (reading release
//! objects, applying status patches, talking to an image registry) is injected, see
//! [`checks`], [`sink`] and [`channel::ImageRegistry`].
//!
//! The entry point is [`cycle::run_cycle`]. Platforms following a release channel instead of
//! release records use [`channel::next_channel_step`], development setups which just track an
//! image tag use [`tag::check_tag_update`].
//!
//! ## Crate Features
//!
//! - `clap` (default) derives `clap::ValueEnum` for the settings enums, so they can be used
//!   as CLI arguments.

pub mod channel;
pub mod checks;
pub mod clock;
pub mod cycle;
pub mod release;
pub mod settings;
pub mod sink;
pub mod tag;
pub mod updater;
pub mod window;
