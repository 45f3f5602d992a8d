//! Skywave Core - control plane for a 24/7 automated radio station.
//!
//! An external audio engine and streaming server actually emit audio; this
//! crate is everything around them: deciding what plays when, generating
//! spoken breaks on schedule, recording what played, and pushing
//! "now playing" state to listeners — while guaranteeing the stream never
//! goes silent under partial failure.
//!
//! # Architecture
//!
//! - [`store`]: SQLite persistence — assets, play history, scheduler state
//! - [`engine`]: line-protocol client to the audio engine's control socket
//! - [`providers`]: multi-provider chains for script and speech synthesis
//! - [`content`]: the break generation pipeline with atomic publication
//! - [`scheduler`]: wall-clock-aligned idempotent tasks and their supervisor
//! - [`recorder`]: the engine's on_track callback handler
//! - [`now_playing`]: snapshot composition and export
//! - [`fanout`] / [`api`]: SSE push of snapshot broadcasts
//! - [`drops`]: operator drop-in control surfaces
//! - [`bootstrap`]: the composition root both binaries build from

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod content;
pub mod drops;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod now_playing;
pub mod providers;
pub mod recorder;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types at the crate root
pub use bootstrap::{bootstrap_recorder, bootstrap_services, BootstrappedServices};
pub use config::RadioConfig;
pub use error::{ErrorCode, RadioError, RadioResult};

pub use api::{start_server, AppState, ServerError};
pub use engine::{EngineClient, EngineError, EngineQueue};
pub use fanout::Broadcaster;
pub use now_playing::{NowPlayingSnapshot, SystemStatus};
pub use recorder::Recorder;
pub use store::{Asset, AssetKind, PlaySource, Store};
