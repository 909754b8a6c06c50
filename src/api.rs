//! All the web-facing API stuff goes here
//!
//! - `POST /profile/:nickname`: multipart form, the `image` field is run
//!   through the pipeline and stored as the user's avatar.
//! - `GET /avatars/:file`: serve a stored avatar with HTTP caching headers.

use std::{net::TcpListener, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    avatars::{normalize_nickname, AvatarStore},
    decode,
    pipeline::ScalePipeline,
    primitive::{anyhow::Context, tracing::instrument, *},
    upload::IMAGE_FIELD,
};

/// Default request body ceiling, bytes.
pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// API Error. This gets converted into Axum error responses
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Internal Server Error: {0}")]
    Ise(#[source] anyhow::Error),

    #[error("Bad Request: {0}")]
    BadRequest(#[source] anyhow::Error),

    #[error("Not Found: {0}")]
    NotFound(#[source] anyhow::Error),
}

impl IntoResponse for ApiError {
    /// Hard-coded JSON bodies. The wrapped error is only logged.
    fn into_response(self) -> Response {
        tracing::warn!("{}", self);
        match self {
            ApiError::Ise(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"status": 500})))
                    .into_response()
            }
            ApiError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({"status": 400}))).into_response()
            }
            ApiError::NotFound(_) => {
                (StatusCode::NOT_FOUND, Json(json!({"status": 404}))).into_response()
            }
        }
    }
}

impl From<ScaleError> for ApiError {
    fn from(e: ScaleError) -> Self {
        match e {
            ScaleError::InvalidImage { .. } | ScaleError::UnsupportedScale(_) => {
                ApiError::BadRequest(e.into())
            }
            ScaleError::EncodingFailed { .. }
            | ScaleError::InvalidConfig(_)
            | ScaleError::Cancelled(_) => ApiError::Ise(e.into()),
        }
    }
}

/// API Result
type ApiResult<T> = std::result::Result<T, ApiError>;

/// Application State
#[derive(Debug, Clone)]
pub struct AppState {
    /// Where avatars live
    pub store: AvatarStore,
    /// Shared, stateless between runs
    pub pipeline: Arc<ScalePipeline>,
}

/// Build the app.
pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/profile/:nickname", post(post_profile))
        .route("/avatars/:file", get(get_avatar))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on an already bound listener until the server fails.
pub async fn serve(listener: TcpListener, app: Router) -> anyhow::Result<()> {
    listener
        .set_nonblocking(true)
        .context("serve: set_nonblocking")?;
    tracing::info!("Listening on {:?}", listener.local_addr());
    axum::Server::from_tcp(listener)
        .context("serve: from_tcp")?
        .serve(app.into_make_service())
        .await
        .context("serve: server error")
}

/// Accept an avatar upload.
///
/// Browsers already send a small JPEG, but anything that decodes is
/// accepted: the server runs the same crop/scale/encode on it.
#[instrument(err, skip(state, multipart))]
async fn post_profile(
    State(state): State<AppState>,
    Path(nickname): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let nick = normalize_nickname(&nickname)
        .ok_or_else(|| ApiError::BadRequest(anyhow::anyhow!("bad nickname {nickname:?}")))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.into()))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(e.into()))?;
            upload = Some(bytes);
        } else {
            // Profile text fields belong to someone else.
            tracing::debug!("ignoring form field {:?}", field.name());
        }
    }
    let upload = upload.ok_or_else(|| {
        ApiError::BadRequest(anyhow::anyhow!("no {IMAGE_FIELD:?} field"))
    })?;

    // Sync block
    let pipeline = Arc::clone(&state.pipeline);
    let encoded = tokio::task::spawn_blocking(move || {
        let src = decode::decode(&upload, pipeline.config())?;
        pipeline.run(src)
    })
    .await
    .context("post_profile: join error")
    .map_err(ApiError::Ise)??;

    let name = state
        .store
        .save(&nick, &encoded)
        .await
        .map_err(ApiError::Ise)?;
    Ok(Json(json!({"status": 200, "avatar": name})))
}

/// HTTP date, always GMT.
fn http_date(t: &DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Decide whether the client's copy is still good.
fn not_modified(headers: &HeaderMap, lastmod: Option<&DateTime>) -> bool {
    let (Some(lastmod), Some(since)) = (lastmod, headers.get(header::IF_MODIFIED_SINCE)) else {
        return false;
    };
    let Some(since) = since
        .to_str()
        .ok()
        .and_then(|s| chrono::DateTime::parse_from_rfc2822(s).ok())
    else {
        return false;
    };
    // HTTP dates have whole seconds.
    lastmod.timestamp() <= since.timestamp()
}

/// Serve a stored avatar.
#[instrument(err, skip(state, headers))]
async fn get_avatar(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let avatar = state
        .store
        .load_file(&file)
        .await
        .map_err(ApiError::Ise)?
        .ok_or_else(|| ApiError::NotFound(anyhow::anyhow!("no avatar {file:?}")))?;

    if not_modified(&headers, avatar.lastmod.as_ref()) {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let mime = mime_guess::from_path(&file).first_or_octet_stream();
    let mut out = HeaderMap::new();
    out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref())
            .context("get_avatar: content type")
            .map_err(ApiError::Ise)?,
    );
    out.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, no-cache"),
    );
    if let Some(lastmod) = &avatar.lastmod {
        out.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&http_date(lastmod))
                .context("get_avatar: last modified")
                .map_err(ApiError::Ise)?,
        );
    }
    Ok((out, avatar.bytes).into_response())
}
