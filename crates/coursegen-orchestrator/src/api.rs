//! HTTP API for course generation, lessons and progress.
//!
//! Every route lives under `/api`. Callers are identified by the
//! `X-User-Id` header, which the fronting auth layer sets; all course data
//! is scoped to that identity.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Service status
//! - `POST /api/courses/generate` - Generate and store a course
//! - `GET /api/courses` - List the caller's courses
//! - `GET /api/courses/:id` - Course with module and lesson summaries
//! - `DELETE /api/courses/:id` - Delete a course
//! - `GET /api/courses/:id/export` - Markdown export
//! - `GET /api/lessons/course/:courseId/module/:m/lesson/:l` - Lesson by position
//! - `GET /api/lessons/:id` - Lesson by id
//! - `POST /api/lessons/:id/generate` - Regenerate lesson content
//! - `GET /api/progress/course/:id` - Progress record
//! - `POST /api/progress/course/:id/lesson/:lessonId/complete` - Complete a lesson
//! - `PUT /api/progress/course/:id/position` - Move the current position
//! - `GET /api/videos/search?q=` - Cached video search
//!
//! Responses use the envelope `{success, data?, error?: {message, code, details?}}`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Query, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use coursegen_content::{CourseSummary, Lesson, Position, Progress};
use coursegen_gateway::{GatewayError, TextGenerator, VideoResult, VideoSearch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GenerationSettings;
use crate::error::CourseGenError;
use crate::generation::{CourseDetail, CourseGenerator, CourseRequest};
use crate::store::{CourseStore, StoreStats};
use crate::tracker::{CompleteLessonRequest, CompletionOutcome, ProgressTracker};

/// Header carrying the caller's identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Longest raw model output echoed back in error details.
const RAW_DETAIL_LIMIT: usize = 500;

// ============================================================================
// Envelope
// ============================================================================

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error description on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> ApiResponse<T> {
    /// Wraps a successful payload.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Error part of the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description.
    pub message: String,
    /// Stable machine-readable code.
    pub code: String,
    /// Extra context, when there is any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Whether repeating the request might succeed.
    #[serde(default)]
    pub retryable: bool,
}

/// Health check payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Id of the text generator in use.
    pub model: String,
    /// Whether video search is available.
    pub video_search: bool,
    /// Stored courses.
    pub courses: usize,
    /// Stored lessons.
    pub lessons: usize,
}

/// Payload of a successful delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedResponse {
    /// The deleted course.
    pub id: Uuid,
    /// Always `true`.
    pub deleted: bool,
}

/// Query string of the video search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoSearchQuery {
    /// The search query.
    #[serde(default)]
    pub q: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Course and lesson generation.
    pub courses: Arc<CourseGenerator>,
    /// Progress tracking.
    pub progress: Arc<ProgressTracker>,
    /// Backing store.
    pub store: Arc<dyn CourseStore>,
    /// Video search, when configured.
    pub videos: Option<Arc<dyn VideoSearch>>,
    model: String,
}

impl AppState {
    /// Wires the services over one generator and one store.
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn CourseStore>,
        settings: GenerationSettings,
    ) -> Self {
        let model = generator.id().to_string();
        Self {
            courses: Arc::new(CourseGenerator::new(generator, store.clone(), settings)),
            progress: Arc::new(ProgressTracker::new(store.clone())),
            store,
            videos: None,
            model,
        }
    }

    /// Enables the video search endpoint.
    #[must_use]
    pub fn with_video_search(mut self, videos: Arc<dyn VideoSearch>) -> Self {
        self.videos = Some(videos);
        self
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error returned by handlers; rendered as an error envelope.
#[derive(Debug)]
pub struct ApiError(CourseGenError);

impl<E: Into<CourseGenError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            CourseGenError::Validation { .. }
            | CourseGenError::Gateway(GatewayError::InvalidRequest(_)) => StatusCode::BAD_REQUEST,
            CourseGenError::Unauthorized => StatusCode::UNAUTHORIZED,
            CourseGenError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            CourseGenError::NotFound { .. } => StatusCode::NOT_FOUND,
            CourseGenError::Gateway(GatewayError::NotConfigured { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CourseGenError::Gateway(_) | CourseGenError::InvalidJson { .. } => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<Value> {
        match &self.0 {
            CourseGenError::InvalidJson { raw, .. } => {
                let excerpt: String = raw.chars().take(RAW_DETAIL_LIMIT).collect();
                Some(json!({ "raw": excerpt }))
            }
            CourseGenError::Gateway(err) => err.status().map(|status| json!({ "status": status })),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = self.0.is_transient();
        if status.is_server_error() {
            error!(code = self.0.code(), retryable, error = %self.0, "Request failed");
        } else {
            warn!(code = self.0.code(), retryable, error = %self.0, "Request rejected");
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(ErrorBody {
                message: self.0.to_string(),
                code: self.0.code().to_string(),
                details: self.details(),
                retryable,
            }),
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// The caller's identity, taken from the `X-User-Id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerId(pub String);

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CallerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(value.to_string()))
            .ok_or(ApiError(CourseGenError::Unauthorized))
    }
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError(CourseGenError::validation(format!("invalid {what} id '{raw}'"))))
}

fn parse_index(raw: &str, what: &str) -> Result<u32, ApiError> {
    raw.trim().parse().map_err(|_| {
        ApiError(CourseGenError::validation(format!(
            "{what} index must be a non-negative integer, got '{raw}'"
        )))
    })
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(CourseGenError::validation(rejection.body_text())))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries CORS and request tracing layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/courses", get(handle_list_courses))
        .route("/courses/generate", post(handle_generate_course))
        .route(
            "/courses/:id",
            get(handle_course_detail).delete(handle_delete_course),
        )
        .route("/courses/:id/export", get(handle_export_course))
        .route(
            "/lessons/course/:course_id/module/:module_index/lesson/:lesson_index",
            get(handle_lesson_at),
        )
        .route("/lessons/:id", get(handle_lesson))
        .route("/lessons/:id/generate", post(handle_regenerate_lesson))
        .route("/progress/course/:id", get(handle_get_progress))
        .route(
            "/progress/course/:id/lesson/:lesson_id/complete",
            post(handle_complete_lesson),
        )
        .route("/progress/course/:id/position", put(handle_set_position))
        .route("/videos/search", get(handle_video_search));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/health`.
async fn handle_health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let StoreStats {
        courses, lessons, ..
    } = state.store.stats().await?;
    Ok(Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        model: state.model.clone(),
        video_search: state.videos.is_some(),
        courses,
        lessons,
    })))
}

/// Handler for `POST /api/courses/generate`.
async fn handle_generate_course(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    payload: Result<Json<CourseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CourseDetail>>), ApiError> {
    let request = json_body(payload)?;
    let tree = state.courses.generate_course(&user, &request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(CourseDetail::from(&tree))),
    ))
}

/// Handler for `GET /api/courses`.
async fn handle_list_courses(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
) -> ApiResult<Vec<CourseSummary>> {
    Ok(Json(ApiResponse::ok(state.courses.list_courses(&user).await?)))
}

/// Handler for `GET /api/courses/:id`.
async fn handle_course_detail(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
) -> ApiResult<CourseDetail> {
    let course_id = parse_id(&id, "course")?;
    Ok(Json(ApiResponse::ok(
        state.courses.course_detail(&user, course_id).await?,
    )))
}

/// Handler for `DELETE /api/courses/:id`.
async fn handle_delete_course(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
) -> ApiResult<DeletedResponse> {
    let course_id = parse_id(&id, "course")?;
    state.courses.delete_course(&user, course_id).await?;
    Ok(Json(ApiResponse::ok(DeletedResponse {
        id: course_id,
        deleted: true,
    })))
}

/// Handler for `GET /api/courses/:id/export`.
///
/// Returns the Markdown document itself rather than an envelope.
async fn handle_export_course(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let course_id = parse_id(&id, "course")?;
    let export = state.courses.export_markdown(&user, course_id).await?;
    info!(course_id = %course_id, bytes = export.markdown.len(), "Exported course");

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.file_name),
            ),
        ],
        export.markdown,
    )
        .into_response())
}

/// Handler for `GET /api/lessons/course/:courseId/module/:m/lesson/:l`.
async fn handle_lesson_at(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path((course_id, module_index, lesson_index)): Path<(String, String, String)>,
) -> ApiResult<Lesson> {
    let course_id = parse_id(&course_id, "course")?;
    let module_index = parse_index(&module_index, "module")?;
    let lesson_index = parse_index(&lesson_index, "lesson")?;
    Ok(Json(ApiResponse::ok(
        state
            .courses
            .lesson_at(&user, course_id, module_index, lesson_index)
            .await?,
    )))
}

/// Handler for `GET /api/lessons/:id`.
async fn handle_lesson(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Lesson> {
    let lesson_id = parse_id(&id, "lesson")?;
    Ok(Json(ApiResponse::ok(state.courses.lesson(&user, lesson_id).await?)))
}

/// Handler for `POST /api/lessons/:id/generate`.
async fn handle_regenerate_lesson(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Lesson> {
    let lesson_id = parse_id(&id, "lesson")?;
    Ok(Json(ApiResponse::ok(
        state.courses.regenerate_lesson(&user, lesson_id).await?,
    )))
}

/// Handler for `GET /api/progress/course/:id`.
async fn handle_get_progress(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
) -> ApiResult<Progress> {
    let course_id = parse_id(&id, "course")?;
    Ok(Json(ApiResponse::ok(state.progress.get(&user, course_id).await?)))
}

/// Handler for `POST /api/progress/course/:id/lesson/:lessonId/complete`.
async fn handle_complete_lesson(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path((course_id, lesson_id)): Path<(String, String)>,
    payload: Result<Json<CompleteLessonRequest>, JsonRejection>,
) -> ApiResult<CompletionOutcome> {
    let course_id = parse_id(&course_id, "course")?;
    let lesson_id = parse_id(&lesson_id, "lesson")?;
    let request = json_body(payload)?;
    Ok(Json(ApiResponse::ok(
        state
            .progress
            .complete_lesson(&user, course_id, lesson_id, request.time_spent)
            .await?,
    )))
}

/// Handler for `PUT /api/progress/course/:id/position`.
async fn handle_set_position(
    State(state): State<Arc<AppState>>,
    CallerId(user): CallerId,
    Path(id): Path<String>,
    payload: Result<Json<Position>, JsonRejection>,
) -> ApiResult<Progress> {
    let course_id = parse_id(&id, "course")?;
    let position = json_body(payload)?;
    Ok(Json(ApiResponse::ok(
        state.progress.set_position(&user, course_id, position).await?,
    )))
}

/// Handler for `GET /api/videos/search`.
async fn handle_video_search(
    State(state): State<Arc<AppState>>,
    CallerId(_user): CallerId,
    Query(query): Query<VideoSearchQuery>,
) -> ApiResult<Vec<VideoResult>> {
    let videos = state.videos.as_ref().ok_or(GatewayError::NotConfigured {
        service: "video search",
        hint: "set YOUTUBE_API_KEY or videoSearch.apiKey",
    })?;
    Ok(Json(ApiResponse::ok(videos.search(&query.q).await?)))
}
