//! The slice of the YouTube Data API v3 that broadcast rotation touches.
//!
//! # Broadcasts vs Streams
//!
//! - A [`streams::LiveStream`] is the ingestion endpoint (RTMP/SRT) the camera
//!   feeds around the clock. It is created once, by hand, and identified here
//!   by its stream key.
//! - A [`broadcasts::LiveBroadcast`] is the event viewers see, and the video
//!   that remains afterwards. It receives media only while bound to a stream.
//!
//! One stream powers a succession of broadcasts: each rotation completes and
//! unbinds the current broadcast, then schedules and binds the next one.

pub mod broadcasts;
pub mod client;
pub mod streams;
pub mod types;

pub use client::{BroadcastScope, DEFAULT_API_BASE, YouTubeClient};
pub use types::PagedStream;

pub use broadcasts::{
    BroadcastLifeCycleStatus, BroadcastPrivacyStatus, BroadcastStatus, LiveBroadcast,
    LiveBroadcastInsertRequest,
};
pub use streams::LiveStream;
