//! YouTube Live Broadcasts API types.
//!
//! A [`LiveBroadcast`] is the viewer-facing event: title, schedule, privacy and
//! the video that ends up on the channel. It only carries media while it is
//! bound to a [`LiveStream`](super::streams::LiveStream), and each rotation
//! replaces the bound broadcast with a fresh one.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `liveBroadcast` resource.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#resource>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcast {
    /// The ID that YouTube assigns to uniquely identify the broadcast.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<LiveBroadcastSnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LiveBroadcastStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_details: Option<LiveBroadcastContentDetails>,
}

impl LiveBroadcast {
    /// The ID of the stream this broadcast is bound to, if any.
    pub fn bound_stream_id(&self) -> Option<&str> {
        self.content_details
            .as_ref()?
            .bound_stream_id
            .as_deref()
    }

    pub fn life_cycle_status(&self) -> Option<BroadcastLifeCycleStatus> {
        self.status.as_ref().map(|s| s.life_cycle_status)
    }
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#snippet>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_start_time: Option<Timestamp>,
    /// Unset means the broadcast is scheduled to continue indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_end_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_time: Option<Timestamp>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#status>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastStatus {
    pub life_cycle_status: BroadcastLifeCycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_status: Option<BroadcastPrivacyStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub made_for_kids: Option<bool>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#contentDetails>
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastContentDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_stream_id: Option<String>,
    #[serde(default)]
    pub enable_auto_start: bool,
    #[serde(default)]
    pub enable_auto_stop: bool,
    #[serde(default)]
    pub enable_dvr: bool,
    #[serde(default)]
    pub record_from_start: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_preference: Option<LatencyPreference>,
}

/// The broadcast's current lifecycle status.
///
/// `ready → testing → live → complete`, with `revoked` as the other terminal state.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#status.lifeCycleStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastLifeCycleStatus {
    /// The broadcast was created but its settings are incomplete.
    Created,
    /// The broadcast is ready to be activated but has not yet been activated.
    Ready,
    /// The broadcast is transitioning to `testing`.
    TestStarting,
    /// Only visible to the owner.
    Testing,
    /// The broadcast is transitioning to `live`.
    LiveStarting,
    /// The broadcast is active and visible to anyone who has access to the URL.
    Live,
    /// The broadcast has finished.
    Complete,
    /// The broadcast was removed by an admin action.
    Revoked,
}

impl fmt::Display for BroadcastLifeCycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Ready => write!(f, "ready"),
            Self::TestStarting => write!(f, "testStarting"),
            Self::Testing => write!(f, "testing"),
            Self::LiveStarting => write!(f, "liveStarting"),
            Self::Live => write!(f, "live"),
            Self::Complete => write!(f, "complete"),
            Self::Revoked => write!(f, "revoked"),
        }
    }
}

/// The broadcast's privacy status.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#status.privacyStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastPrivacyStatus {
    Public,
    Unlisted,
    Private,
}

impl fmt::Display for BroadcastPrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Unlisted => write!(f, "unlisted"),
            Self::Private => write!(f, "private"),
        }
    }
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts#contentDetails.latencyPreference>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LatencyPreference {
    Normal,
    Low,
    UltraLow,
}

/// Target states of `liveBroadcasts.transition` that a rotation asks for.
///
/// The API also accepts `testing` and `live`, but auto-start takes care of those.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/transition>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastStatus {
    Complete,
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// Request body for `liveBroadcasts.insert`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/insert>
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveBroadcastInsertRequest {
    pub snippet: InsertSnippet,
    pub content_details: InsertContentDetails,
    pub status: InsertStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertSnippet {
    pub title: String,
    pub description: String,
    pub scheduled_start_time: Timestamp,
    pub scheduled_end_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertContentDetails {
    pub enable_auto_start: bool,
    pub enable_auto_stop: bool,
    pub enable_dvr: bool,
    pub record_from_start: bool,
    pub latency_preference: LatencyPreference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertStatus {
    pub privacy_status: BroadcastPrivacyStatus,
}
