// Country Profile Dashboard - Web Server
// REST API with Axum: one dashboard session per browser tab

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post, put},
    Router,
};
use clap::Parser;
use country_profile::{
    DashboardConfig, DashboardView, DatasetKind, DatasetStatus, FilterUpdate, Session,
    UploadOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
struct AppState {
    sessions: Arc<Mutex<HashMap<Uuid, Session>>>,
    config: Arc<DashboardConfig>,
}

impl AppState {
    fn new(config: DashboardConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// The session map stays usable after a handler panicked while holding it
    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| {
            warn!("a request panicked while holding the session map, recovering it");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Run `f` against one session, mapping a missing id to an error response
    fn with_session<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, ApiError> {
        let mut sessions = self.sessions();
        let session = sessions.get_mut(&id).ok_or(ApiError::UnknownSession(id))?;
        Ok(f(session))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: (),
            error: Some(message.into()),
        }
    }
}

enum ApiError {
    UnknownSession(Uuid),
    UnknownDataset(String),
    Download(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownSession(id) => (StatusCode::NOT_FOUND, format!("Unknown session {}", id)),
            ApiError::UnknownDataset(kind) => {
                (StatusCode::NOT_FOUND, format!("Unknown dataset kind {:?}", kind))
            }
            ApiError::Download(e) => {
                warn!(error = %e, "download failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(ApiResponse::err(message))).into_response()
    }
}

fn parse_kind(kind: &str) -> Result<DatasetKind, ApiError> {
    DatasetKind::parse(kind).ok_or_else(|| ApiError::UnknownDataset(kind.to_string()))
}

/// Session creation response
#[derive(Serialize)]
struct SessionCreated {
    session_id: Uuid,
    datasets: Vec<DatasetStatus>,
    view: DashboardView,
}

#[derive(Deserialize)]
struct UploadQuery {
    name: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/sessions - New session preloaded with the sample datasets
async fn create_session(State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = Session::with_samples((*state.config).clone());
    let created = SessionCreated {
        session_id: session.id,
        datasets: session.statuses(),
        view: session.view(),
    };

    state.sessions().insert(session.id, session);
    info!(session = %created.session_id, "session created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(created))).into_response())
}

/// DELETE /api/sessions/:id
async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let removed = state.sessions().remove(&id);

    match removed {
        Some(_) => Ok((StatusCode::OK, Json(ApiResponse::ok(id))).into_response()),
        None => Err(ApiError::UnknownSession(id)),
    }
}

/// GET /api/sessions/:id/view - Header, every tab, notices
async fn get_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let view = state.with_session(id, |s| s.view())?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(view))).into_response())
}

/// PATCH /api/sessions/:id/filters - Change notification from any control
async fn update_filters(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<FilterUpdate>,
) -> Result<Response, ApiError> {
    let view = state.with_session(id, |s| s.apply_update(update))?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(view))).into_response())
}

/// POST /api/sessions/:id/reset - Back to full range, all ip types, default pair
async fn reset_filters(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let view = state.with_session(id, |s| {
        s.reset_filters();
        s.view()
    })?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(view))).into_response())
}

/// GET /api/sessions/:id/datasets - Slot status per dataset kind
async fn get_datasets(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let statuses = state.with_session(id, |s| s.statuses())?;
    Ok((StatusCode::OK, Json(ApiResponse::ok(statuses))).into_response())
}

/// PUT /api/sessions/:id/datasets/:kind - Replace a dataset with the CSV request body
async fn upload_dataset(
    State(state): State<AppState>,
    Path((id, kind)): Path<(Uuid, String)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let name = query.name.unwrap_or_else(|| format!("{}.csv", kind));

    let outcome = state.with_session(id, |s| s.upload(kind, &name, &body))?;
    let status = match outcome {
        UploadOutcome::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };

    Ok((status, Json(ApiResponse::ok(outcome))).into_response())
}

/// GET /api/sessions/:id/download/:kind - Filtered rows as a CSV attachment
async fn download_dataset(
    State(state): State<AppState>,
    Path((id, kind)): Path<(Uuid, String)>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let bytes = state
        .with_session(id, |s| s.download(kind))?
        .map_err(ApiError::Download)?;

    let headers = [
        (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", Session::download_file_name(kind)),
        ),
    ];

    Ok((StatusCode::OK, headers, bytes).into_response())
}

/// GET /api/schema/:kind - Required columns of a dataset kind
async fn get_schema(Path(kind): Path<String>) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let columns: Vec<&str> = kind.columns().iter().map(|c| c.name).collect();
    Ok((StatusCode::OK, Json(ApiResponse::ok(columns))).into_response())
}

// ============================================================================
// Router
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/schema/:kind", get(get_schema))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", axum::routing::delete(close_session))
        .route("/sessions/:id/view", get(get_view))
        .route("/sessions/:id/filters", patch(update_filters))
        .route("/sessions/:id/reset", post(reset_filters))
        .route("/sessions/:id/datasets", get(get_datasets))
        .route("/sessions/:id/datasets/:kind", put(upload_dataset))
        .route("/sessions/:id/download/:kind", get(download_dataset))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[derive(Parser)]
#[command(name = "country-profile-server")]
#[command(about = "HTTP API for the country profile dashboard", version)]
struct Cli {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the sample CSV files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Listen address, overrides `server_addr` from the config
    #[arg(long)]
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("country_profile=info,country_profile_server=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let addr = cli.addr.unwrap_or_else(|| config.server_addr.clone());

    println!("🌐 Country Profile Dashboard - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Sample data: {}", config.data_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: POST http://{}/api/sessions", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app(AppState::new(config))).await?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    const FLOWS: &str = "year,origin_country,dest_country,ip_type,applications\n\
        2020,Canada,Japan,patent,100\n\
        2021,Canada,Japan,patent,170\n\
        2021,Japan,Canada,trademark,40\n";

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = DashboardConfig {
            data_dir: dir.path().to_path_buf(),
            ..DashboardConfig::default()
        };
        (AppState::new(config), dir)
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn json(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(state, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn new_session(state: &AppState) -> String {
        let request = Request::post("/api/sessions").body(Body::empty()).unwrap();
        let (status, body) = json(state, request).await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["session_id"].as_str().unwrap().to_string()
    }

    async fn upload_flows(state: &AppState, id: &str) -> (StatusCode, Value) {
        let request = Request::put(format!("/api/sessions/{}/datasets/flows?name=mine.csv", id))
            .body(Body::from(FLOWS))
            .unwrap();
        json(state, request).await
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _dir) = test_state();
        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        let (status, body) = json(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let (state, _dir) = test_state();
        let request = Request::get(format!("/api/sessions/{}/view", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = json(&state, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_upload_then_filter_updates_kpis() {
        let (state, _dir) = test_state();
        let id = new_session(&state).await;

        let (status, body) = upload_flows(&state, &id).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "loaded");
        assert_eq!(body["data"]["records"], 3);

        let request = Request::patch(format!("/api/sessions/{}/filters", id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"year_from":2021,"year_to":2021}"#))
            .unwrap();
        let (status, body) = json(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["header"]["kpis"]["outbound_applications"], 170);
        assert_eq!(body["data"]["header"]["kpis"]["inbound_applications"], 40);
    }

    #[tokio::test]
    async fn test_same_upload_twice_is_unchanged() {
        let (state, _dir) = test_state();
        let id = new_session(&state).await;

        upload_flows(&state, &id).await;
        let (status, body) = upload_flows(&state, &id).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "unchanged");
    }

    #[tokio::test]
    async fn test_bad_header_is_rejected() {
        let (state, _dir) = test_state();
        let id = new_session(&state).await;

        let request = Request::put(format!("/api/sessions/{}/datasets/flows", id))
            .body(Body::from("year,origin\n2021,Canada\n"))
            .unwrap();
        let (status, body) = json(&state, request).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["data"]["outcome"], "rejected");
    }

    #[tokio::test]
    async fn test_download_filtered_csv() {
        let (state, _dir) = test_state();
        let id = new_session(&state).await;
        upload_flows(&state, &id).await;

        let request = Request::patch(format!("/api/sessions/{}/filters", id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"ip_types":["trademark"]}"#))
            .unwrap();
        send(&state, request).await;

        let request = Request::get(format!("/api/sessions/{}/download/flows", id))
            .body(Body::empty())
            .unwrap();
        let response = app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"flows_filtered.csv\""
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(
            text,
            "year,origin_country,dest_country,ip_type,applications\n2021,Japan,Canada,trademark,40\n"
        );
    }

    #[tokio::test]
    async fn test_counts_at_type_limit_still_serve_the_view() {
        let (state, _dir) = test_state();
        let id = new_session(&state).await;
        let big = i64::MAX;
        let rows = format!(
            "year,origin_country,dest_country,ip_type,applications\n\
             2020,Canada,Japan,patent,{big}\n\
             2020,Canada,Japan,patent,{big}\n\
             2020,Canada,Japan,patent,{big}\n"
        );

        let request = Request::put(format!("/api/sessions/{}/datasets/flows", id))
            .body(Body::from(rows))
            .unwrap();
        let (status, _) = json(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::get(format!("/api/sessions/{}/view", id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = json(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["header"]["kpis"]["outbound_applications"], u64::MAX);
    }

    #[tokio::test]
    async fn test_failed_request_leaves_other_sessions_serving() {
        let (state, _dir) = test_state();
        let healthy = new_session(&state).await;

        let request = Request::get(format!("/api/sessions/{}/view", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, _) = json(&state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // Panic while holding the session map
        let shared = state.clone();
        let crashed = std::thread::spawn(move || {
            let _guard = shared.sessions.lock().unwrap();
            panic!("handler failure");
        })
        .join();
        assert!(crashed.is_err());
        assert!(state.sessions.is_poisoned());

        let request = Request::get(format!("/api/sessions/{}/view", healthy))
            .body(Body::empty())
            .unwrap();
        let (status, body) = json(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let other = new_session(&state).await;
        assert_ne!(other, healthy);
    }

    #[tokio::test]
    async fn test_unknown_dataset_kind() {
        let (state, _dir) = test_state();
        let request = Request::get("/api/schema/budget").body(Body::empty()).unwrap();
        let (status, _) = json(&state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
