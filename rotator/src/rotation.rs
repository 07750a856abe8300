//! One broadcast rotation, start to finish.
//!
//! ```text
//! resolve stream → resolve bound broadcast → check lifecycle
//!   → pause egress → complete (if live) + unbind → insert → bind → resume egress
//! ```
//!
//! Every external call goes through the [`RetryPolicy`] on its own. A failure
//! that survives its retries ends the run; nothing is rolled back, and the next
//! scheduled run starts over from the top.

use crate::error::RotationError;
use crate::restreamer::{EgressCommand, EgressControl};
use crate::retry::RetryPolicy;
use crate::youtube_api::broadcasts::{
    BroadcastLifeCycleStatus, BroadcastPrivacyStatus, BroadcastStatus, InsertContentDetails,
    InsertSnippet, InsertStatus, LatencyPreference, LiveBroadcast, LiveBroadcastInsertRequest,
};
use crate::youtube_api::streams::LiveStream;
use crate::youtube_api::{BroadcastScope, YouTubeClient};
use eyre::Context;
use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp, Zoned};
use tokio_stream::StreamExt;

/// Scheduled length of every broadcast: just under YouTube's 12 hour cap, with
/// a minute of slack for scheduler jitter.
pub const BROADCAST_LENGTH: SignedDuration = SignedDuration::from_mins(11 * 60 + 59);

/// The YouTube calls a rotation makes.
///
/// [`YouTubeClient`] is the real implementation.
#[allow(async_fn_in_trait)]
pub trait LiveApi {
    async fn list_streams(&self) -> eyre::Result<Vec<LiveStream>>;
    async fn list_broadcasts(&self, scope: BroadcastScope) -> eyre::Result<Vec<LiveBroadcast>>;
    async fn broadcast_status(&self, broadcast_id: &str)
    -> eyre::Result<BroadcastLifeCycleStatus>;
    async fn transition(&self, broadcast_id: &str, status: BroadcastStatus) -> eyre::Result<()>;
    /// Binds to `stream_id`, or unbinds when it is `None`.
    async fn bind(&self, broadcast_id: &str, stream_id: Option<&str>) -> eyre::Result<()>;
    /// Returns the ID of the new broadcast.
    async fn insert(&self, request: &LiveBroadcastInsertRequest) -> eyre::Result<String>;
}

impl LiveApi for YouTubeClient {
    async fn list_streams(&self) -> eyre::Result<Vec<LiveStream>> {
        self.list_my_live_streams().collect().await
    }

    async fn list_broadcasts(&self, scope: BroadcastScope) -> eyre::Result<Vec<LiveBroadcast>> {
        self.list_live_broadcasts(scope).collect().await
    }

    async fn broadcast_status(
        &self,
        broadcast_id: &str,
    ) -> eyre::Result<BroadcastLifeCycleStatus> {
        self.get_live_broadcast(broadcast_id)
            .await?
            .life_cycle_status()
            .ok_or_else(|| eyre::eyre!("broadcast {broadcast_id} has no lifecycle status"))
    }

    async fn transition(&self, broadcast_id: &str, status: BroadcastStatus) -> eyre::Result<()> {
        self.transition_live_broadcast(broadcast_id, status).await?;
        Ok(())
    }

    async fn bind(&self, broadcast_id: &str, stream_id: Option<&str>) -> eyre::Result<()> {
        self.bind_live_broadcast(broadcast_id, stream_id).await?;
        Ok(())
    }

    async fn insert(&self, request: &LiveBroadcastInsertRequest) -> eyre::Result<String> {
        Ok(self.insert_live_broadcast(request).await?.id)
    }
}

/// The ID of the stream whose ingestion key is `stream_key`.
pub fn find_stream_id<'s>(streams: &'s [LiveStream], stream_key: &str) -> eyre::Result<&'s str> {
    streams
        .iter()
        .find(|s| s.stream_name() == Some(stream_key))
        .map(|s| s.id.as_str())
        .ok_or_else(|| {
            RotationError::StreamNotFound {
                stream_key: stream_key.to_string(),
            }
            .into()
        })
}

/// The broadcast currently bound to `stream_id`, if there is one.
pub fn find_bound_broadcast<'b>(
    broadcasts: &'b [LiveBroadcast],
    stream_id: &str,
) -> Option<&'b LiveBroadcast> {
    broadcasts
        .iter()
        .find(|b| b.bound_stream_id() == Some(stream_id))
}

/// When the next broadcast starts and ends, in the configured time zone.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastWindow {
    pub start: Zoned,
    pub end: Zoned,
}

impl BroadcastWindow {
    /// Computed on absolute time, so a DST change inside the window does not
    /// change its length.
    pub fn starting_at(now: Timestamp, time_zone: &TimeZone) -> eyre::Result<Self> {
        let end = now
            .checked_add(BROADCAST_LENGTH)
            .context("compute scheduled end time")?;
        Ok(Self {
            start: now.to_zoned(time_zone.clone()),
            end: end.to_zoned(time_zone.clone()),
        })
    }

    /// `"{base}: 01-05-2024 15:00 to 02:59"`
    pub fn title(&self, base: &str) -> String {
        format!(
            "{base}: {} to {}",
            self.start.strftime("%d-%m-%Y %H:%M"),
            self.end.strftime("%H:%M")
        )
    }
}

/// Everything about a rotation that is fixed at deployment time.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Ingestion key of the managed stream.
    pub stream_key: String,
    pub title: String,
    pub description: String,
    pub time_zone: TimeZone,
    pub privacy: BroadcastPrivacyStatus,
    /// Off by default so that the next rotation, not YouTube, ends each broadcast.
    pub auto_stop: bool,
    pub scope: BroadcastScope,
    /// Only read; log what would have been changed.
    pub dry_run: bool,
}

impl RotationConfig {
    pub fn insert_request(&self, window: &BroadcastWindow) -> LiveBroadcastInsertRequest {
        LiveBroadcastInsertRequest {
            snippet: InsertSnippet {
                title: window.title(&self.title),
                description: self.description.clone(),
                scheduled_start_time: window.start.timestamp(),
                scheduled_end_time: window.end.timestamp(),
            },
            content_details: InsertContentDetails {
                enable_auto_start: true,
                enable_auto_stop: self.auto_stop,
                enable_dvr: true,
                record_from_start: true,
                latency_preference: LatencyPreference::Normal,
            },
            status: InsertStatus {
                privacy_status: self.privacy,
            },
        }
    }
}

/// The broadcast that was bound to the stream when the run started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousBroadcast {
    pub id: String,
    pub status: BroadcastLifeCycleStatus,
}

/// What a run found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub stream_id: String,
    pub previous: Option<PreviousBroadcast>,
    /// `None` after a dry run.
    pub new_broadcast_id: Option<String>,
}

pub struct Rotator<A, E> {
    api: A,
    egress: Option<E>,
    config: RotationConfig,
    retry: RetryPolicy,
}

impl<A, E> Rotator<A, E>
where
    A: LiveApi,
    E: EgressControl,
{
    pub fn new(api: A, egress: Option<E>, config: RotationConfig, retry: RetryPolicy) -> Self {
        Self {
            api,
            egress,
            config,
            retry,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Runs one rotation as of `now`.
    pub async fn rotate(&self, now: Timestamp) -> eyre::Result<RotationOutcome> {
        let dry_run = self.config.dry_run;
        if dry_run {
            tracing::info!("dry run: no broadcast or restreamer state will be changed");
        }

        let stream_id = self.resolve_stream().await?;
        let previous = self.resolve_previous(&stream_id).await?;

        let window = BroadcastWindow::starting_at(now, &self.config.time_zone)?;
        let request = self.config.insert_request(&window);

        if dry_run {
            self.report_intent(&stream_id, previous.as_ref(), &request);
            return Ok(RotationOutcome {
                stream_id,
                previous,
                new_broadcast_id: None,
            });
        }

        self.pause_egress().await;
        if let Some(previous) = &previous {
            self.retire(previous).await?;
        }

        tracing::info!(
            title = %request.snippet.title,
            privacy = %request.status.privacy_status,
            "creating new broadcast"
        );
        let new_id = self
            .retry
            .run("create broadcast", || self.api.insert(&request))
            .await?;
        tracing::info!(broadcast_id = %new_id, "created broadcast");

        self.retry
            .run("bind broadcast", || self.api.bind(&new_id, Some(&stream_id)))
            .await
            .map_err(|e| {
                e.wrap_err(RotationError::PartialRotation {
                    broadcast_id: new_id.clone(),
                    stream_id: stream_id.clone(),
                })
            })?;
        tracing::info!(broadcast_id = %new_id, %stream_id, "bound stream to new broadcast");

        self.resume_egress().await?;

        Ok(RotationOutcome {
            stream_id,
            previous,
            new_broadcast_id: Some(new_id),
        })
    }

    async fn resolve_stream(&self) -> eyre::Result<String> {
        let stream_key = &self.config.stream_key;
        tracing::info!(%stream_key, "finding stream ID by stream key");
        let streams = self
            .retry
            .run("list streams", || self.api.list_streams())
            .await?;
        let stream_id = find_stream_id(&streams, stream_key)?.to_string();
        tracing::info!(%stream_id, "found stream");
        Ok(stream_id)
    }

    async fn resolve_previous(&self, stream_id: &str) -> eyre::Result<Option<PreviousBroadcast>> {
        let scope = self.config.scope;
        let broadcasts = self
            .retry
            .run("list broadcasts", || self.api.list_broadcasts(scope))
            .await?;
        let Some(bound) = find_bound_broadcast(&broadcasts, stream_id) else {
            tracing::info!(%stream_id, "no broadcast bound to stream");
            return Ok(None);
        };

        let id = bound.id.clone();
        let status = self
            .retry
            .run("check broadcast lifecycle", || self.api.broadcast_status(&id))
            .await?;
        tracing::info!(broadcast_id = %id, %status, "found bound broadcast");
        Ok(Some(PreviousBroadcast { id, status }))
    }

    /// Completes the old broadcast if it is live, then unbinds it either way.
    async fn retire(&self, previous: &PreviousBroadcast) -> eyre::Result<()> {
        let id = previous.id.as_str();
        if previous.status == BroadcastLifeCycleStatus::Live {
            tracing::info!(broadcast_id = %id, "broadcast is live, completing it");
            self.retry
                .run("complete broadcast", || {
                    self.api.transition(id, BroadcastStatus::Complete)
                })
                .await?;
        }
        tracing::info!(broadcast_id = %id, "unbinding stream from broadcast");
        self.retry
            .run("unbind broadcast", || self.api.bind(id, None))
            .await
    }

    /// A failed stop is not fatal: the rotation itself matters more than the
    /// few seconds of media sent to a broadcast that is about to end.
    async fn pause_egress(&self) {
        let Some(egress) = &self.egress else {
            return;
        };
        if let Err(e) = self
            .retry
            .run("stop restreamer egress", || egress.send(EgressCommand::Stop))
            .await
        {
            tracing::warn!(error = %e, "could not stop restreamer egress, continuing");
        }
    }

    async fn resume_egress(&self) -> eyre::Result<()> {
        let Some(egress) = &self.egress else {
            return Ok(());
        };
        self.retry
            .run("start restreamer egress", || egress.send(EgressCommand::Start))
            .await
            .context("new broadcast is bound but restreamer egress did not start")
    }

    fn report_intent(
        &self,
        stream_id: &str,
        previous: Option<&PreviousBroadcast>,
        request: &LiveBroadcastInsertRequest,
    ) {
        if self.egress.is_some() {
            tracing::info!(dry_run = true, "would stop restreamer egress");
        }
        match previous {
            Some(p) if p.status == BroadcastLifeCycleStatus::Live => tracing::info!(
                dry_run = true,
                broadcast_id = %p.id,
                "broadcast is live, would complete and unbind it"
            ),
            Some(p) => tracing::info!(
                dry_run = true,
                broadcast_id = %p.id,
                status = %p.status,
                "broadcast is not live, would unbind it"
            ),
            None => {}
        }
        tracing::info!(
            dry_run = true,
            %stream_id,
            title = %request.snippet.title,
            start = %request.snippet.scheduled_start_time,
            end = %request.snippet.scheduled_end_time,
            "would create and bind new broadcast"
        );
        if self.egress.is_some() {
            tracing::info!(dry_run = true, "would start restreamer egress");
        }
    }
}
