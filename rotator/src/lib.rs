//! Keeps a 24/7 YouTube live stream going past the 12 hour broadcast limit.
//!
//! Each run completes and unbinds the broadcast currently bound to a long-lived
//! ingestion stream, then schedules a fresh broadcast and binds the stream to
//! it. Scheduling runs every 12 hours is left to cron or a container scheduler.

pub mod config;
pub mod credentials;
pub mod error;
pub mod oauth;
pub mod restreamer;
pub mod retry;
pub mod rotation;
pub mod youtube_api;

pub use error::RotationError;
pub use retry::RetryPolicy;
pub use rotation::{LiveApi, RotationConfig, RotationOutcome, Rotator};
