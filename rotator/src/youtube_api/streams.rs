//! YouTube Live Streams API types.
//!
//! A [`LiveStream`] is the ingestion endpoint the camera feeds continuously. The
//! rotator never creates or changes streams; it only needs to find the one whose
//! ingestion stream name matches the configured stream key.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A `liveStream` resource.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#resource>
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStream {
    /// The ID that YouTube assigns to uniquely identify the stream.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<LiveStreamSnippet>,
    /// Ingestion settings, including the stream key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LiveStreamStatus>,
}

impl LiveStream {
    /// The stream key encoders use to push to this stream, if YouTube reported one.
    pub fn stream_name(&self) -> Option<&str> {
        self.cdn
            .as_ref()?
            .ingestion_info
            .as_ref()
            .map(|info| info.stream_name.as_str())
    }
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#snippet>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnSettings {
    /// `rtmp`, `hls`, `dash` or `webrtc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_info: Option<IngestionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<String>,
}

/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn.ingestionInfo>
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionInfo {
    /// The stream key, as configured in the encoder.
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ingestion_address: Option<String>,
}

/// The status of a live stream.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#status>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamStatus {
    /// The stream is receiving data.
    Active,
    /// The stream exists but lacks valid CDN settings.
    Created,
    /// An error condition exists on the stream.
    Error,
    /// The stream is not receiving data.
    Inactive,
    /// The stream has valid CDN settings.
    Ready,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamStatus {
    pub stream_status: StreamStatus,
}
