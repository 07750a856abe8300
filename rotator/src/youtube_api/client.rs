//! Authenticated access to the YouTube Data API v3.

use crate::credentials::TimeBoundAccessToken;
use crate::error::RotationError;
use crate::oauth::OAuthManager;
use crate::youtube_api::{
    broadcasts::{BroadcastStatus, LiveBroadcast, LiveBroadcastInsertRequest},
    streams::LiveStream,
    types::{ListResponse, PagedStream},
};
use eyre::Context;
use http::Method;
use jiff::Timestamp;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_stream::Stream;
use tracing::instrument;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `maxResults` for list calls; 50 is the API maximum.
const PAGE_SIZE: &str = "50";

/// Which broadcasts `liveBroadcasts.list` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BroadcastScope {
    /// `broadcastStatus=active`: only broadcasts that are currently live.
    Active,
    /// `mine=true`: every broadcast on the channel, newest first.
    All,
}

/// Client for the handful of YouTube Live endpoints a rotation needs.
///
/// Access tokens are refreshed transparently when they expire, which matters
/// when a long retry chain outlives the token the run started with.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    token: Arc<Mutex<TimeBoundAccessToken>>,
    oauth: Arc<OAuthManager>,
    client: reqwest::Client,
    api_base: String,
}

impl YouTubeClient {
    pub fn new(
        token: TimeBoundAccessToken,
        oauth: OAuthManager,
        api_base: impl Into<String>,
    ) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build YouTube HTTP client")?;
        Ok(Self {
            token: Arc::new(Mutex::new(token)),
            oauth: Arc::new(oauth),
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// The token currently in use, including any refresh done during the run.
    pub async fn token(&self) -> TimeBoundAccessToken {
        self.token.lock().await.clone()
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.api_base, resource)
    }

    #[instrument(skip(self), level = tracing::Level::TRACE)]
    async fn fresh_access_token(&self) -> eyre::Result<String> {
        let mut token = self.token.lock().await;
        if token.is_expired_at(Timestamp::now()) {
            tracing::debug!("access token expired, attempting refresh");
            if !token.refresh(&self.oauth).await? {
                tracing::error!("access token refresh failed, client is unusable");
                return Err(RotationError::CredentialUnavailable {
                    path: None,
                    reason: "access token expired and could not be refreshed; \
                             run `broadcast-rotator authorize`"
                        .to_string(),
                }
                .into());
            }
            tracing::debug!("access token successfully refreshed");
        }
        Ok(token.access_token().to_string())
    }

    /// Sends one authenticated request and turns non-2xx responses into errors
    /// carrying the response body, which is where YouTube explains itself.
    #[instrument(skip(self, json_body), level = tracing::Level::TRACE)]
    async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
    ) -> eyre::Result<reqwest::Response> {
        let access_token = self.fresh_access_token().await?;

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(access_token)
            .query(query_params);
        if let Some(body) = json_body {
            request = request.json(body);
        } else if method == Method::POST {
            // Google front-ends reject body-less POSTs without a length.
            request = request.header(http::header::CONTENT_LENGTH, 0);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("send {method} request to YouTube API: {url}"))?;

        let status_code = response.status();
        if !status_code.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            eyre::bail!("YouTube API {method} {url} failed with status {status_code}: {error_text}");
        }
        Ok(response)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        resource: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
    ) -> eyre::Result<T> {
        let url = self.url(resource);
        self.make_authenticated_request(method, &url, query_params, json_body)
            .await?
            .json()
            .await
            .with_context(|| format!("parse YouTube API {resource} response as JSON"))
    }

    /// All live streams owned by the authenticated channel.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/list>
    #[instrument(skip(self))]
    pub fn list_my_live_streams(&self) -> impl Stream<Item = eyre::Result<LiveStream>> + use<'_> {
        PagedStream::new(move |page_token: Option<String>| async move {
            let mut query = vec![
                ("part", "id,snippet,cdn,status"),
                ("mine", "true"),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let response: ListResponse<LiveStream> = self
                .request_json(Method::GET, "liveStreams", &query, None::<&()>)
                .await?;
            tracing::debug!(
                total_results = response.page_info.total_results,
                returned_items = response.items.len(),
                "fetched live streams"
            );
            Ok(response.into_page())
        })
    }

    /// Broadcasts of the authenticated channel, filtered by `scope`.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/list>
    #[instrument(skip(self))]
    pub fn list_live_broadcasts(
        &self,
        scope: BroadcastScope,
    ) -> impl Stream<Item = eyre::Result<LiveBroadcast>> + use<'_> {
        PagedStream::new(move |page_token: Option<String>| async move {
            let mut query = vec![
                ("part", "id,snippet,status,contentDetails"),
                ("maxResults", PAGE_SIZE),
            ];
            // `mine` and `broadcastStatus` are mutually exclusive filters.
            match scope {
                BroadcastScope::Active => {
                    query.push(("broadcastStatus", "active"));
                    query.push(("broadcastType", "all"));
                }
                BroadcastScope::All => query.push(("mine", "true")),
            }
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let response: ListResponse<LiveBroadcast> = self
                .request_json(Method::GET, "liveBroadcasts", &query, None::<&()>)
                .await?;
            tracing::debug!(
                ?scope,
                total_results = response.page_info.total_results,
                returned_items = response.items.len(),
                "fetched live broadcasts"
            );
            Ok(response.into_page())
        })
    }

    /// A single broadcast by ID.
    #[instrument(skip(self))]
    pub async fn get_live_broadcast(&self, broadcast_id: &str) -> eyre::Result<LiveBroadcast> {
        let response: ListResponse<LiveBroadcast> = self
            .request_json(
                Method::GET,
                "liveBroadcasts",
                &[("part", "id,snippet,status,contentDetails"), ("id", broadcast_id)],
                None::<&()>,
            )
            .await?;
        response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| eyre::eyre!("broadcast not found: {broadcast_id}"))
    }

    /// Moves a broadcast to a new lifecycle state.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/transition>
    #[instrument(skip(self))]
    pub async fn transition_live_broadcast(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
    ) -> eyre::Result<LiveBroadcast> {
        let status = status.to_string();
        let broadcast: LiveBroadcast = self
            .request_json(
                Method::POST,
                "liveBroadcasts/transition",
                &[
                    ("part", "id,status"),
                    ("id", broadcast_id),
                    ("broadcastStatus", &status),
                ],
                None::<&()>,
            )
            .await?;
        tracing::debug!(broadcast_id, %status, "transitioned broadcast");
        Ok(broadcast)
    }

    /// Binds a broadcast to a stream, or unbinds it when `stream_id` is `None`.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/bind>
    #[instrument(skip(self))]
    pub async fn bind_live_broadcast(
        &self,
        broadcast_id: &str,
        stream_id: Option<&str>,
    ) -> eyre::Result<LiveBroadcast> {
        let mut query = vec![("part", "id,contentDetails"), ("id", broadcast_id)];
        if let Some(stream_id) = stream_id {
            query.push(("streamId", stream_id));
        }
        let broadcast: LiveBroadcast = self
            .request_json(Method::POST, "liveBroadcasts/bind", &query, None::<&()>)
            .await?;
        tracing::debug!(
            broadcast_id,
            bound_stream_id = broadcast.bound_stream_id(),
            "updated broadcast binding"
        );
        Ok(broadcast)
    }

    /// Schedules a new broadcast.
    ///
    /// See: <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/insert>
    #[instrument(skip(self, request), fields(title = %request.snippet.title))]
    pub async fn insert_live_broadcast(
        &self,
        request: &LiveBroadcastInsertRequest,
    ) -> eyre::Result<LiveBroadcast> {
        let broadcast: LiveBroadcast = self
            .request_json(
                Method::POST,
                "liveBroadcasts",
                &[("part", "id,snippet,status,contentDetails")],
                Some(request),
            )
            .await?;
        tracing::debug!(broadcast_id = broadcast.id, "inserted broadcast");
        Ok(broadcast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::ClientSecrets;
    use crate::youtube_api::broadcasts::{
        BroadcastLifeCycleStatus, BroadcastPrivacyStatus, InsertContentDetails, InsertSnippet,
        InsertStatus, LatencyPreference,
    };
    use http_body_util::{BodyExt, Full};
    use hyper::body::{Bytes, Incoming};
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use oauth2::basic::BasicTokenResponse;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;
    use tokio_stream::StreamExt;

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        method: String,
        path: String,
        query: Vec<(String, String)>,
        authorization: Option<String>,
        body: serde_json::Value,
    }

    impl Seen {
        fn param(&self, key: &str) -> Option<&str> {
            self.query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        }
    }

    fn reply(method: &str, path: &str, page_token: Option<&str>) -> (StatusCode, serde_json::Value) {
        match (method, path.strip_prefix("/youtube/v3/")) {
            ("GET", Some("liveStreams")) => match page_token {
                None => (
                    StatusCode::OK,
                    serde_json::json!({
                        "kind": "youtube#liveStreamListResponse",
                        "items": [{"id": "S1", "cdn": {"ingestionInfo": {"streamName": "abc123"}}}],
                        "pageInfo": {"totalResults": 2, "resultsPerPage": 1},
                        "nextPageToken": "p2"
                    }),
                ),
                Some(_) => (
                    StatusCode::OK,
                    serde_json::json!({"items": [{"id": "S2"}]}),
                ),
            },
            ("GET", Some("liveBroadcasts")) => (
                StatusCode::OK,
                serde_json::json!({"items": [{
                    "id": "B1",
                    "status": {"lifeCycleStatus": "live"},
                    "contentDetails": {"boundStreamId": "S1"}
                }]}),
            ),
            ("POST", Some("liveBroadcasts/transition" | "liveBroadcasts/bind")) => {
                (StatusCode::OK, serde_json::json!({"id": "B1"}))
            }
            ("POST", Some("liveBroadcasts")) => (StatusCode::OK, serde_json::json!({"id": "B2"})),
            _ => (
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": {"code": 404, "message": "Not Found"}}),
            ),
        }
    }

    /// Serves a fake YouTube Data API under `/youtube/v3` on a random loopback port.
    async fn fake_youtube() -> (u16, Arc<StdMutex<Vec<Seen>>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((conn, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                let service = service_fn(move |req: Request<Incoming>| {
                    let log = Arc::clone(&log);
                    async move {
                        let method = req.method().to_string();
                        let path = req.uri().path().to_string();
                        let query: Vec<(String, String)> =
                            form_urlencoded::parse(req.uri().query().unwrap_or("").as_bytes())
                                .into_owned()
                                .collect();
                        let authorization = req
                            .headers()
                            .get(http::header::AUTHORIZATION)
                            .map(|v| v.to_str().unwrap().to_string());
                        let body = req.into_body().collect().await?.to_bytes();
                        let body = serde_json::from_slice(&body).unwrap_or_default();
                        let seen = Seen {
                            method,
                            path,
                            query,
                            authorization,
                            body,
                        };

                        let (status, json) =
                            reply(&seen.method, &seen.path, seen.param("pageToken"));
                        log.lock().unwrap().push(seen);

                        let mut response =
                            Response::new(Full::new(Bytes::from(json.to_string())));
                        *response.status_mut() = status;
                        Ok::<_, hyper::Error>(response)
                    }
                });
                tokio::spawn(async move {
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(hyper_util::rt::TokioIo::new(conn), service)
                        .await;
                });
            }
        });
        (port, seen)
    }

    fn oauth() -> OAuthManager {
        OAuthManager::new(
            ClientSecrets::from_json(r#"{"installed": {"client_id": "a", "client_secret": "b"}}"#)
                .unwrap(),
        )
        .unwrap()
    }

    fn token(json: &str) -> BasicTokenResponse {
        serde_json::from_str(json).unwrap()
    }

    fn client(api_base: String) -> YouTubeClient {
        let token = TimeBoundAccessToken::new(token(
            r#"{"access_token": "ya29.test", "token_type": "bearer", "expires_in": 3599}"#,
        ));
        YouTubeClient::new(token, oauth(), api_base).unwrap()
    }

    fn base(port: u16) -> String {
        format!("http://127.0.0.1:{port}/youtube/v3")
    }

    fn taken(seen: &Arc<StdMutex<Vec<Seen>>>) -> Vec<Seen> {
        std::mem::take(&mut *seen.lock().unwrap())
    }

    #[tokio::test]
    async fn test_list_streams_follows_page_tokens() {
        let (port, seen) = fake_youtube().await;
        let yt = client(base(port));

        let streams = yt
            .list_my_live_streams()
            .collect::<eyre::Result<Vec<_>>>()
            .await
            .unwrap();
        let ids: Vec<_> = streams.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
        assert_eq!(streams[0].stream_name(), Some("abc123"));

        let seen = taken(&seen);
        assert_eq!(seen.len(), 2);
        for request in &seen {
            assert_eq!(request.method, "GET");
            assert_eq!(request.path, "/youtube/v3/liveStreams");
            assert_eq!(request.authorization.as_deref(), Some("Bearer ya29.test"));
            assert_eq!(request.param("part"), Some("id,snippet,cdn,status"));
            assert_eq!(request.param("mine"), Some("true"));
            assert_eq!(request.param("maxResults"), Some("50"));
        }
        assert_eq!(seen[0].param("pageToken"), None);
        assert_eq!(seen[1].param("pageToken"), Some("p2"));
    }

    #[tokio::test]
    async fn test_broadcast_scope_selects_filter() {
        let (port, seen) = fake_youtube().await;
        let yt = client(base(port));

        let active = yt
            .list_live_broadcasts(BroadcastScope::Active)
            .collect::<eyre::Result<Vec<_>>>()
            .await
            .unwrap();
        assert_eq!(active[0].bound_stream_id(), Some("S1"));
        let request = taken(&seen).remove(0);
        assert_eq!(request.path, "/youtube/v3/liveBroadcasts");
        assert_eq!(request.param("broadcastStatus"), Some("active"));
        assert_eq!(request.param("broadcastType"), Some("all"));
        assert_eq!(request.param("mine"), None);

        yt.list_live_broadcasts(BroadcastScope::All)
            .collect::<eyre::Result<Vec<_>>>()
            .await
            .unwrap();
        let request = taken(&seen).remove(0);
        assert_eq!(request.param("mine"), Some("true"));
        assert_eq!(request.param("broadcastStatus"), None);
    }

    #[tokio::test]
    async fn test_get_broadcast_by_id() {
        let (port, seen) = fake_youtube().await;
        let yt = client(base(port));

        let broadcast = yt.get_live_broadcast("B1").await.unwrap();
        assert_eq!(
            broadcast.life_cycle_status(),
            Some(BroadcastLifeCycleStatus::Live)
        );
        let request = taken(&seen).remove(0);
        assert_eq!(request.param("id"), Some("B1"));
        assert_eq!(request.param("part"), Some("id,snippet,status,contentDetails"));
    }

    #[tokio::test]
    async fn test_transition_to_complete() {
        let (port, seen) = fake_youtube().await;
        let yt = client(base(port));

        yt.transition_live_broadcast("B1", BroadcastStatus::Complete)
            .await
            .unwrap();

        let request = taken(&seen).remove(0);
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/youtube/v3/liveBroadcasts/transition");
        assert_eq!(request.param("id"), Some("B1"));
        assert_eq!(request.param("broadcastStatus"), Some("complete"));
    }

    #[tokio::test]
    async fn test_bind_sends_stream_id_and_unbind_omits_it() {
        let (port, seen) = fake_youtube().await;
        let yt = client(base(port));

        yt.bind_live_broadcast("B2", Some("S1")).await.unwrap();
        yt.bind_live_broadcast("B1", None).await.unwrap();

        let seen = taken(&seen);
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.method == "POST"));
        assert!(seen.iter().all(|r| r.path == "/youtube/v3/liveBroadcasts/bind"));
        assert_eq!(seen[0].param("id"), Some("B2"));
        assert_eq!(seen[0].param("streamId"), Some("S1"));
        assert_eq!(seen[1].param("id"), Some("B1"));
        assert_eq!(seen[1].param("streamId"), None);
    }

    #[tokio::test]
    async fn test_insert_posts_request_body() {
        let (port, seen) = fake_youtube().await;
        // A trailing slash on the configured base is tolerated.
        let yt = client(format!("{}/", base(port)));
        let request = LiveBroadcastInsertRequest {
            snippet: InsertSnippet {
                title: "Cam: 01-05-2024 15:00 to 02:59".into(),
                description: String::new(),
                scheduled_start_time: "2024-05-01T03:00:00Z".parse().unwrap(),
                scheduled_end_time: "2024-05-01T14:59:00Z".parse().unwrap(),
            },
            content_details: InsertContentDetails {
                enable_auto_start: true,
                enable_auto_stop: false,
                enable_dvr: true,
                record_from_start: true,
                latency_preference: LatencyPreference::Normal,
            },
            status: InsertStatus {
                privacy_status: BroadcastPrivacyStatus::Public,
            },
        };

        let broadcast = yt.insert_live_broadcast(&request).await.unwrap();
        assert_eq!(broadcast.id, "B2");

        let seen = taken(&seen).remove(0);
        assert_eq!(seen.method, "POST");
        assert_eq!(seen.path, "/youtube/v3/liveBroadcasts");
        assert_eq!(seen.param("part"), Some("id,snippet,status,contentDetails"));
        assert_eq!(seen.body, serde_json::to_value(&request).unwrap());
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let (port, _) = fake_youtube().await;
        let yt = client(format!("http://127.0.0.1:{port}/elsewhere"));

        let err = yt.get_live_broadcast("B1").await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"), "{message}");
        assert!(message.contains("Not Found"), "{message}");
    }

    #[tokio::test]
    async fn test_refused_refresh_is_credential_unavailable() {
        let (port, seen) = fake_youtube().await;
        let expired = TimeBoundAccessToken::expired(token(
            r#"{"access_token": "old", "token_type": "bearer"}"#,
        ));
        let yt = YouTubeClient::new(expired, oauth(), base(port)).unwrap();

        let err = yt.get_live_broadcast("B1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RotationError>(),
            Some(RotationError::CredentialUnavailable { path: None, .. })
        ));
        assert!(!crate::error::is_retryable(&err));
        assert!(taken(&seen).is_empty());
    }
}
