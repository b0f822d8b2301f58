use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tatsahay_core::{
    IncidentStore, InvalidationBus, Moderation, ProjectionCache, SqliteIncidentStore,
    SubmissionHandle, SubmissionPipeline, SubmissionState, ViewSnapshot,
};
use tatsahay_shared::{
    ImageInput, MapPoint, Report, ReportCandidate, ReportId, User, VerificationState,
};
use tatsahay_store::Database;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::media_store::{content_type_for, DiskMediaStore};
use crate::session::{LoginDetails, SessionRegistry};
use crate::submissions::SubmissionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IncidentStore>,
    pub media: Arc<DiskMediaStore>,
    pub bus: InvalidationBus,
    pub pipeline: SubmissionPipeline,
    pub cache: ProjectionCache,
    pub moderation: Moderation,
    pub sessions: Arc<SessionRegistry>,
    pub submissions: Arc<SubmissionRegistry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Wire the core services together over `db` and `media`.
    pub fn new(config: ServerConfig, db: Database, media: DiskMediaStore) -> Self {
        let store: Arc<dyn IncidentStore> = Arc::new(SqliteIncidentStore::new(db));
        let media = Arc::new(media);
        let bus = InvalidationBus::new();

        let pipeline = SubmissionPipeline::new(
            Arc::clone(&store),
            media.clone(),
            bus.clone(),
            config.pipeline(),
        );
        let cache = ProjectionCache::new(
            Arc::clone(&store),
            bus.clone(),
            config.projection_policy(),
        );
        let moderation = Moderation::new(Arc::clone(&store), bus.clone());

        Self {
            store,
            media,
            bus,
            pipeline,
            cache,
            moderation,
            sessions: Arc::new(SessionRegistry::new(config.session_ttl)),
            submissions: Arc::new(SubmissionRegistry::new(config.submission_retention)),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    // Multipart framing and text fields on top of the photo itself.
    let body_limit = state.config.max_media_size + 1024 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/reports", post(submit_report).get(list_reports))
        .route("/reports/:id", get(get_report))
        .route(
            "/submissions/:id",
            get(get_submission).delete(cancel_submission),
        )
        .route("/profile/reports", get(profile_reports))
        .route("/map", get(map_points))
        .route("/events", get(event_stream))
        .route("/admin/reports/:id/verification", put(set_verification))
        .route("/media/:id", get(media_download))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    feed_includes_unverified: bool,
    max_media_size: usize,
    admin_enabled: bool,
    report_count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    full_name: Option<String>,
    city: Option<String>,
    state: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

#[derive(Serialize)]
struct FailureBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
    retryable: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmissionResponse {
    submission_id: Uuid,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<FailureBody>,
}

impl SubmissionResponse {
    fn new(id: Uuid, state: SubmissionState) -> Self {
        let name = state.name();
        let (report, error) = match state {
            SubmissionState::Succeeded(report) => (Some(report), None),
            SubmissionState::Failed(reason) => {
                let field = match &reason {
                    tatsahay_core::FailureReason::Validation(e) => Some(e.field()),
                    _ => None,
                };
                let body = FailureBody {
                    code: reason.code(),
                    message: reason.to_string(),
                    field,
                    retryable: reason.is_retryable(),
                };
                (None, Some(body))
            }
            _ => (None, None),
        };
        Self {
            submission_id: id,
            state: name,
            report,
            error,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewResponse<T> {
    items: Vec<T>,
    generation: u64,
    stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl<T: Clone> From<ViewSnapshot<T>> for ViewResponse<T> {
    fn from(view: ViewSnapshot<T>) -> Self {
        Self {
            items: view.items.as_ref().clone(),
            generation: view.generation,
            stale: view.stale,
            error: view.error,
            refreshed_at: view.refreshed_at,
        }
    }
}

#[derive(Deserialize, Default)]
struct ViewQuery {
    #[serde(default)]
    fresh: bool,
}

#[derive(Deserialize)]
struct VerificationRequest {
    state: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidationEvent {
    seq: u64,
    scopes: Vec<String>,
    report_id: ReportId,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(
    State(state): State<AppState>,
) -> Result<Json<ServerInfoResponse>, ServerError> {
    let report_count = state.store.count().await?;
    Ok(Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        feed_includes_unverified: state.cache.policy().feed_includes_unverified,
        max_media_size: state.config.max_media_size,
        admin_enabled: state.config.admin_token.is_some(),
        report_count,
    }))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ServerError> {
    let (token, user) = state
        .sessions
        .login(LoginDetails {
            email: req.email,
            full_name: req.full_name,
            city: req.city,
            state: req.state,
        })
        .await?;
    Ok(Json(LoginResponse { token, user }))
}

async fn me(headers: HeaderMap, State(state): State<AppState>) -> Result<Json<User>, ServerError> {
    let session = state.sessions.session(&headers).await?;
    Ok(Json(session.user().clone()))
}

/// Collect the report form. Unknown fields are ignored; a file in `image`
/// takes precedence over an `imageRef`.
async fn read_candidate(mut multipart: Multipart) -> Result<ReportCandidate, ServerError> {
    let mut candidate = ReportCandidate::default();
    let mut image_ref = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "image" {
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read image: {e}")))?;
            if !data.is_empty() {
                candidate.image = Some(ImageInput::Upload { data, content_type });
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Failed to read field {name}: {e}")))?;
        match name.as_str() {
            "disasterType" => candidate.disaster_type = Some(text),
            "location" => candidate.location = Some(text),
            "description" => candidate.description = Some(text),
            "severity" => candidate.severity = Some(text).filter(|s| !s.trim().is_empty()),
            "latitude" => candidate.latitude = Some(text),
            "longitude" => candidate.longitude = Some(text),
            "imageRef" => image_ref = Some(text.trim().to_string()).filter(|r| !r.is_empty()),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    if candidate.image.is_none() {
        candidate.image = image_ref.map(ImageInput::Stored);
    }
    Ok(candidate)
}

async fn submit_report(
    headers: HeaderMap,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let session = state.sessions.session(&headers).await?;
    let candidate = read_candidate(multipart).await?;

    let handle = state.pipeline.submit(&session, candidate);
    let id = handle.id();
    let current = handle.state();
    state.submissions.insert(handle);

    info!(
        submission = %id,
        author = %session.user_id(),
        tracked = state.submissions.len(),
        "Report submission accepted"
    );
    Ok((StatusCode::ACCEPTED, Json(SubmissionResponse::new(id, current))))
}

/// A submission visible to the caller. Other users' submissions are
/// indistinguishable from unknown ids.
async fn owned_submission(
    state: &AppState,
    headers: &HeaderMap,
    id: Uuid,
) -> Result<SubmissionHandle, ServerError> {
    let session = state.sessions.session(headers).await?;
    state
        .submissions
        .get(id)
        .filter(|handle| handle.author() == session.user_id())
        .ok_or_else(|| ServerError::NotFound(format!("Submission {id}")))
}

async fn get_submission(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionResponse>, ServerError> {
    let handle = owned_submission(&state, &headers, id).await?;
    Ok(Json(SubmissionResponse::new(id, handle.state())))
}

async fn cancel_submission(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubmissionResponse>, ServerError> {
    let handle = owned_submission(&state, &headers, id).await?;
    if !handle.cancel() {
        return Err(ServerError::Conflict(format!(
            "Submission {id} can no longer be cancelled"
        )));
    }
    let settled = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .unwrap_or_else(|_| handle.state());
    Ok(Json(SubmissionResponse::new(id, settled)))
}

async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Json<ViewResponse<Report>> {
    let view = if query.fresh {
        state.cache.all_reports_view_fresh().await
    } else {
        state.cache.all_reports_view().await
    };
    Json(view.into())
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>, ServerError> {
    let report = state.store.get_by_id(ReportId(id)).await?;
    Ok(Json(report))
}

async fn profile_reports(
    headers: HeaderMap,
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Result<Json<ViewResponse<Report>>, ServerError> {
    let session = state.sessions.session(&headers).await?;
    let view = if query.fresh {
        state.cache.user_reports_view_fresh(session.user_id()).await
    } else {
        state.cache.user_reports_view(session.user_id()).await
    };
    Ok(Json(view.into()))
}

async fn map_points(
    State(state): State<AppState>,
    Query(query): Query<ViewQuery>,
) -> Json<ViewResponse<MapPoint>> {
    let view = if query.fresh {
        state.cache.map_points_view_fresh().await
    } else {
        state.cache.map_points_view().await
    };
    Json(view.into())
}

/// GET /events - invalidation notifications as server-sent events
async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.bus.subscribe();
    debug!(
        subscribers = state.bus.subscriber_count(),
        "New SSE client connected"
    );

    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(signal) => {
                let payload = InvalidationEvent {
                    seq: signal.seq,
                    scopes: signal.scopes.iter().map(ToString::to_string).collect(),
                    report_id: signal.report.id,
                };
                match serde_json::to_string(&payload) {
                    Ok(json) => Some(Ok(Event::default().event("invalidation").data(json))),
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize invalidation");
                        None
                    }
                }
            }
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                // The client missed signals; tell it to refetch everything.
                warn!(missed, "SSE client lagged");
                Some(Ok(Event::default().event("resync").data("{}")))
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn verify_admin_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.admin_token else {
        return Err(ServerError::Forbidden(
            "Admin API is disabled (no ADMIN_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid admin token".into()));
    }

    Ok(())
}

async fn set_verification(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerificationRequest>,
) -> Result<Json<Report>, ServerError> {
    verify_admin_token(&headers, &state.config)?;

    let target: VerificationState = req.state.parse()?;
    let report = state.moderation.apply(ReportId(id), target).await?;

    info!(report = %report.id, state = target.as_str(), "Admin changed verification");
    Ok(Json(report))
}

async fn media_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let data = state.media.get(&id).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&id))], data))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bytes::Bytes;
    use serde_json::Value;
    use tatsahay_core::MediaStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;

    const BOUNDARY: &str = "tatsahay-test-boundary";

    struct TestApp {
        router: Router,
        /// A photo uploaded before the test, usable as `imageRef`.
        photo: String,
        _media_dir: TempDir,
    }

    async fn test_app(admin_token: Option<&str>) -> TestApp {
        let media_dir = TempDir::new().unwrap();
        let config = ServerConfig {
            media_storage_path: media_dir.path().to_path_buf(),
            admin_token: admin_token.map(str::to_string),
            ..ServerConfig::default()
        };
        let media = DiskMediaStore::new(config.media_storage_path.clone(), config.max_media_size)
            .await
            .unwrap();
        let photo = media
            .store(Bytes::from_static(b"\x89PNG\r\n\x1a\nearlier"), "image/png")
            .await
            .unwrap();
        let state = AppState::new(config, Database::open_in_memory().unwrap(), media);
        TestApp {
            router: build_router(state),
            photo,
            _media_dir: media_dir,
        }
    }

    impl TestApp {
        async fn send(&self, req: Request<Body>) -> (StatusCode, Value, Vec<u8>) {
            let response = self.router.clone().oneshot(req).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json, bytes.to_vec())
        }

        async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
            let mut req = Request::builder().uri(uri);
            if let Some(token) = token {
                req = req.header("authorization", format!("Bearer {token}"));
            }
            let (status, json, _) = self.send(req.body(Body::empty()).unwrap()).await;
            (status, json)
        }

        async fn login(&self, email: &str) -> (String, Value) {
            let req = Request::builder()
                .method("POST")
                .uri("/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": email, "fullName": "Hardik Gupta" }).to_string(),
                ))
                .unwrap();
            let (status, json, _) = self.send(req).await;
            assert_eq!(status, StatusCode::OK);
            (json["token"].as_str().unwrap().to_string(), json["user"].clone())
        }

        async fn submit(&self, token: &str, body: Vec<u8>) -> (StatusCode, Value) {
            let req = Request::builder()
                .method("POST")
                .uri("/reports")
                .header("authorization", format!("Bearer {token}"))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap();
            let (status, json, _) = self.send(req).await;
            (status, json)
        }

        /// Poll a submission until it reaches a terminal state.
        async fn settle(&self, token: &str, submission_id: &str) -> Value {
            for _ in 0..500 {
                let (status, json) = self
                    .get(&format!("/submissions/{submission_id}"), Some(token))
                    .await;
                assert_eq!(status, StatusCode::OK);
                if ["succeeded", "failed", "cancelled"].contains(&json["state"].as_str().unwrap()) {
                    return json;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("submission {submission_id} never settled");
        }
    }

    fn form(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((content_type, data)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"photo\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = test_app(None).await;
        let (status, json) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn profile_requires_a_session() {
        let app = test_app(None).await;
        let (status, json) = app.get("/profile/reports", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let app = test_app(None).await;
        let (status, json) = app.get("/reports", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["items"], serde_json::json!([]));
        assert_eq!(json["stale"], false);
    }

    #[tokio::test]
    async fn submitted_report_reaches_profile_and_feed() {
        let app = test_app(None).await;
        let (token, user) = app.login("hardik@example.org").await;

        let (status, json) = app
            .submit(
                &token,
                form(
                    &[
                        ("disasterType", "Flood"),
                        ("location", " Mumbai "),
                        ("description", "Street flooded"),
                        ("imageRef", app.photo.as_str()),
                    ],
                    None,
                ),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let submission_id = json["submissionId"].as_str().unwrap().to_string();

        let settled = app.settle(&token, &submission_id).await;
        assert_eq!(settled["state"], "succeeded");
        let report = &settled["report"];
        assert_eq!(report["location"], "Mumbai");
        assert_eq!(report["authorId"], user["id"]);
        assert_eq!(report["verificationState"], "Unverified");

        let (_, profile) = app.get("/profile/reports?fresh=true", Some(&token)).await;
        assert_eq!(profile["items"].as_array().unwrap().len(), 1);
        assert_eq!(profile["items"][0]["id"], report["id"]);

        let (status, fetched) = app
            .get(&format!("/reports/{}", report["id"].as_str().unwrap()), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["description"], "Street flooded");

        let (_, info) = app.get("/info", None).await;
        assert_eq!(info["reportCount"], 1);
        assert_eq!(info["adminEnabled"], false);
        assert_eq!(info["feedIncludesUnverified"], true);
    }

    #[tokio::test]
    async fn missing_description_fails_validation() {
        let app = test_app(None).await;
        let (token, _) = app.login("a@example.org").await;

        let (_, json) = app
            .submit(
                &token,
                form(
                    &[
                        ("disasterType", "Storm"),
                        ("location", "Kolkata"),
                        ("imageRef", app.photo.as_str()),
                    ],
                    None,
                ),
            )
            .await;
        let settled = app
            .settle(&token, json["submissionId"].as_str().unwrap())
            .await;
        assert_eq!(settled["state"], "failed");
        assert_eq!(settled["error"]["code"], "validation");
        assert_eq!(settled["error"]["field"], "description");
        assert_eq!(settled["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn unknown_image_ref_fails_as_media_upload() {
        let app = test_app(None).await;
        let (token, _) = app.login("a@example.org").await;
        let unknown = format!("{}.png", Uuid::new_v4());

        let (status, json) = app
            .submit(
                &token,
                form(
                    &[
                        ("disasterType", "Flood"),
                        ("location", "Mumbai"),
                        ("description", "Street flooded"),
                        ("imageRef", unknown.as_str()),
                    ],
                    None,
                ),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let settled = app
            .settle(&token, json["submissionId"].as_str().unwrap())
            .await;
        assert_eq!(settled["state"], "failed");
        assert_eq!(settled["error"]["code"], "media_upload");
        assert_eq!(settled["error"]["retryable"], true);

        let (_, info) = app.get("/info", None).await;
        assert_eq!(info["reportCount"], 0);
    }

    #[tokio::test]
    async fn malformed_latitude_fails_in_the_pipeline() {
        let app = test_app(None).await;
        let (token, _) = app.login("a@example.org").await;

        let (status, json) = app
            .submit(
                &token,
                form(
                    &[
                        ("disasterType", "Cyclone"),
                        ("location", "Puri"),
                        ("description", "Roof blown off"),
                        ("latitude", "19.8N"),
                        ("longitude", "85.8"),
                        ("imageRef", app.photo.as_str()),
                    ],
                    None,
                ),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let settled = app
            .settle(&token, json["submissionId"].as_str().unwrap())
            .await;
        assert_eq!(settled["state"], "failed");
        assert_eq!(settled["error"]["code"], "validation");
        assert_eq!(settled["error"]["field"], "latitude");
    }

    #[tokio::test]
    async fn submissions_are_private_to_their_author() {
        let app = test_app(None).await;
        let (owner, _) = app.login("owner@example.org").await;
        let (other, _) = app.login("other@example.org").await;

        let (_, json) = app
            .submit(&owner, form(&[("disasterType", "Flood")], None))
            .await;
        let id = json["submissionId"].as_str().unwrap();

        let (status, _) = app.get(&format!("/submissions/{id}"), Some(&other)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn uploaded_photo_is_served_back() {
        let app = test_app(None).await;
        let (token, _) = app.login("photo@example.org").await;
        let photo: &[u8] = b"\x89PNG\r\n\x1a\nfake";

        let (_, json) = app
            .submit(
                &token,
                form(
                    &[
                        ("disasterType", "Landslide"),
                        ("location", "Shimla"),
                        ("description", "Road blocked"),
                    ],
                    Some(("image/png", photo)),
                ),
            )
            .await;
        let settled = app
            .settle(&token, json["submissionId"].as_str().unwrap())
            .await;
        assert_eq!(settled["state"], "succeeded");
        let image_ref = settled["report"]["imageRef"].as_str().unwrap();

        let req = Request::builder()
            .uri(format!("/media/{image_ref}"))
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], photo);
    }

    #[tokio::test]
    async fn unknown_report_is_404() {
        let app = test_app(None).await;
        let (status, _) = app.get(&format!("/reports/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_verification_feeds_the_map() {
        let app = test_app(Some("s3cret")).await;
        let (token, _) = app.login("mod@example.org").await;

        let (_, json) = app
            .submit(
                &token,
                form(
                    &[
                        ("disasterType", "Cyclone"),
                        ("location", "Chennai"),
                        ("description", "Trees down"),
                        ("imageRef", app.photo.as_str()),
                    ],
                    None,
                ),
            )
            .await;
        let settled = app
            .settle(&token, json["submissionId"].as_str().unwrap())
            .await;
        let id = settled["report"]["id"].as_str().unwrap().to_string();

        let verify = |auth: &str| {
            Request::builder()
                .method("PUT")
                .uri(format!("/admin/reports/{id}/verification"))
                .header("authorization", format!("Bearer {auth}"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"state":"verified"}"#))
                .unwrap()
        };

        let (status, _, _) = app.send(verify("wrong")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated, _) = app.send(verify("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["verificationState"], "Verified");

        let (_, map) = app.get("/map?fresh=true", None).await;
        let points = map["items"].as_array().unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0]["name"], "Chennai");
        assert_eq!(points[0]["reportCount"], 1);
    }

    #[tokio::test]
    async fn admin_api_disabled_without_token() {
        let app = test_app(None).await;
        let req = Request::builder()
            .method("PUT")
            .uri(format!("/admin/reports/{}/verification", Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"state":"verified"}"#))
            .unwrap();
        let (status, _, _) = app.send(req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
