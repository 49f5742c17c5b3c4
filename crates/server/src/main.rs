use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use memo_core::{
    catalog::{CategoryCatalog, HintTemplate},
    image::{ImageUpload, MAX_IMAGE_BYTES},
};
use serde::Deserialize;
use server_api::{ApiContext, CatalogView};
use shared::{
    domain::{ImageId, Memo, MemoId, RecordMode, RecordType, UserId, UserProfile},
    error::{ApiError, ErrorCode},
    protocol::{
        CreateMemoRequest, FeedEvent, ImageUploadResponse, LoginRequest, LoginResponse,
        MemoCreatedResponse, MemoStats, ProfileUpdate, UpdateMemoRequest,
    },
};
use storage::Storage;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

/// Room for a maximum-size image plus headers and JSON overhead.
const MAX_REQUEST_BYTES: usize = MAX_IMAGE_BYTES + 1024 * 1024;

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct UserQuery {
    user_id: i64,
}

#[derive(Debug, Deserialize)]
struct CatalogQuery {
    record_type: RecordType,
    record_mode: RecordMode,
}

#[derive(Debug, Deserialize)]
struct ListMemosQuery {
    user_id: i64,
    keyword: Option<String>,
    tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZonedQuery {
    user_id: i64,
    tz_offset_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ImageUploadQuery {
    user_id: i64,
    memo_id: Option<i64>,
    filename: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let public_url = settings
        .server_public_url
        .clone()
        .unwrap_or_else(|| format!("http://{}", settings.server_bind));
    let storage = Storage::new(&database_url)
        .await
        .map_err(|error| {
            error!(
                %database_url,
                %error,
                "failed to open SQLite database; verify parent directory exists and permissions are correct"
            );
            error
        })?
        .with_public_base_url(public_url);
    let catalog = match &settings.catalog_path {
        Some(path) => {
            info!(path = %path.display(), "loading category catalog");
            CategoryCatalog::load(path)?
        }
        None => CategoryCatalog::builtin(),
    };
    let api = ApiContext::new(storage, Arc::new(catalog))
        .with_default_offset(settings.stats_offset()?);

    let app = build_router(Arc::new(AppState::new(api)));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/users/:user_id/profile", get(get_profile).put(put_profile))
        .route("/catalog", get(get_catalog))
        .route("/catalog/hints/:category", get(get_hint_templates))
        .route("/memos", post(create_memo).get(list_memos))
        .route("/memos/public", get(list_public_memos))
        .route(
            "/memos/:memo_id",
            get(get_memo).put(update_memo).delete(delete_memo),
        )
        .route("/memos/:memo_id/export.csv", get(export_csv))
        .route("/stats", get(get_stats))
        .route("/images", post(upload_image))
        .route("/images/:image_id", get(download_image))
        .route("/feed/ws", get(feed_ws_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_error(err: ApiError) -> (StatusCode, Json<ApiError>) {
    (status_for(err.code), Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> HttpResult<&'static str> {
    state.api.storage.health_check().await.map_err(|e| {
        error!(error = %e, "health check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<Json<LoginResponse>> {
    let response = server_api::login(&state.api, &req.username)
        .await
        .map_err(api_error)?;
    Ok(Json(response))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> HttpResult<Json<UserProfile>> {
    let profile = server_api::get_profile(&state.api, UserId(user_id))
        .await
        .map_err(api_error)?;
    Ok(Json(profile))
}

async fn put_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
    Json(update): Json<ProfileUpdate>,
) -> HttpResult<Json<UserProfile>> {
    let profile = server_api::save_profile(&state.api, UserId(user_id), &update)
        .await
        .map_err(api_error)?;
    Ok(Json(profile))
}

async fn get_catalog(
    State(state): State<Arc<AppState>>,
    Query(q): Query<CatalogQuery>,
) -> Json<CatalogView> {
    Json(server_api::catalog(&state.api, q.record_type, q.record_mode))
}

async fn get_hint_templates(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Json<Vec<HintTemplate>> {
    Json(server_api::hint_templates(&state.api, &category))
}

async fn create_memo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMemoRequest>,
) -> HttpResult<(StatusCode, Json<MemoCreatedResponse>)> {
    let memo = server_api::create_memo(&state.api, req)
        .await
        .map_err(api_error)?;
    info!(memo_id = %memo.id, user_id = %memo.user_id, public = memo.is_public, "memo created");
    let memo_id = memo.id;
    if memo.is_public {
        state.publish(FeedEvent::MemoPublished { memo });
    }
    Ok((StatusCode::CREATED, Json(MemoCreatedResponse { memo_id })))
}

async fn list_memos(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListMemosQuery>,
) -> HttpResult<Json<Vec<Memo>>> {
    let memos = server_api::list_memos(
        &state.api,
        UserId(q.user_id),
        q.keyword.as_deref(),
        q.tag.as_deref(),
    )
    .await
    .map_err(api_error)?;
    Ok(Json(memos))
}

async fn list_public_memos(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<Memo>>> {
    let memos = server_api::list_public_memos(&state.api)
        .await
        .map_err(api_error)?;
    Ok(Json(memos))
}

async fn get_memo(
    State(state): State<Arc<AppState>>,
    Path(memo_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> HttpResult<Json<Memo>> {
    let memo = server_api::get_memo(&state.api, UserId(q.user_id), MemoId(memo_id))
        .await
        .map_err(api_error)?;
    Ok(Json(memo))
}

async fn update_memo(
    State(state): State<Arc<AppState>>,
    Path(memo_id): Path<i64>,
    Json(req): Json<UpdateMemoRequest>,
) -> HttpResult<Json<Memo>> {
    let withdrawing = req.is_public == Some(false);
    let memo = server_api::update_memo(&state.api, MemoId(memo_id), req)
        .await
        .map_err(api_error)?;
    if memo.is_public {
        state.publish(FeedEvent::MemoPublished { memo: memo.clone() });
    } else if withdrawing {
        state.publish(FeedEvent::MemoWithdrawn { memo_id: memo.id });
    }
    Ok(Json(memo))
}

async fn delete_memo(
    State(state): State<Arc<AppState>>,
    Path(memo_id): Path<i64>,
    Query(q): Query<UserQuery>,
) -> HttpResult<StatusCode> {
    let memo = server_api::delete_memo(&state.api, UserId(q.user_id), MemoId(memo_id))
        .await
        .map_err(api_error)?;
    if memo.is_public {
        state.publish(FeedEvent::MemoWithdrawn { memo_id: memo.id });
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn export_csv(
    State(state): State<Arc<AppState>>,
    Path(memo_id): Path<i64>,
    Query(q): Query<ZonedQuery>,
) -> HttpResult<impl IntoResponse> {
    let export = server_api::export_csv(
        &state.api,
        UserId(q.user_id),
        MemoId(memo_id),
        q.tz_offset_minutes,
    )
    .await
    .map_err(api_error)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    let encoded: String = url::form_urlencoded::byte_serialize(export.file_name.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename*=UTF-8''{encoded}")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((StatusCode::OK, headers, export.content))
}

async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ZonedQuery>,
) -> HttpResult<Json<MemoStats>> {
    let stats = server_api::stats(&state.api, UserId(q.user_id), q.tz_offset_minutes)
        .await
        .map_err(api_error)?;
    Ok(Json(stats))
}

async fn upload_image(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ImageUploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResult<Json<ImageUploadResponse>> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let filename = q
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if filename.is_some_and(|name| name.contains('/') || name.contains('\\')) {
        return Err(api_error(ApiError::validation(
            "filename must not contain path separators",
        )));
    }
    let upload = ImageUpload {
        bytes: body.to_vec(),
        mime_type,
        filename: filename.map(str::to_string),
    };

    let response = server_api::upload_image(
        &state.api,
        UserId(q.user_id),
        q.memo_id.map(MemoId),
        upload,
    )
    .await
    .map_err(api_error)?;
    Ok(Json(response))
}

async fn download_image(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<i64>,
) -> HttpResult<impl IntoResponse> {
    let image = server_api::load_image(&state.api, ImageId(image_id))
        .await
        .map_err(api_error)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&image.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok((StatusCode::OK, headers, image.bytes))
}

async fn feed_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| feed_connection(state, socket))
}

async fn feed_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut events_rx = state.feed.subscribe();

    let send_task = tokio::spawn(async move {
        while let Some(event) = next_feed_event(&mut events_rx).await {
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}
    send_task.abort();
}

/// A slow subscriber skips what it missed and keeps following the feed.
/// `None` once the feed is gone.
async fn next_feed_event(events_rx: &mut broadcast::Receiver<FeedEvent>) -> Option<FeedEvent> {
    loop {
        match events_rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "feed subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
