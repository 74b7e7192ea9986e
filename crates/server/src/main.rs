use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, Local};
use serde::Deserialize;
use server_api::{
    catalog, create_course, dashboard_courses, delete_course, draft_description, enroll, featured,
    get_course, list_instructors, list_users, register, resolve_actor, schedule, seed_demo_data,
    sign_in, stats, ApiContext,
};
use shared::{
    domain::{Course, CourseId, DashboardStats, EnrollOutcome, NewCourse, User, UserId, CATEGORIES},
    error::{ApiError, ErrorCode},
    protocol::{
        CourseFilter, DraftRequest, DraftResponse, EnrollResponse, MonthSchedule,
        RegisterRequest, ServerEvent, SignInRequest,
    },
};
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod extract;

use config::{load_settings, prepare_database_url};
use extract::{ApiJson, ApiQuery};

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    events: broadcast::Sender<ServerEvent>,
}

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct ActorQuery {
    user_id: Option<UserId>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MonthQuery {
    year: Option<i32>,
    month: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let api = ApiContext::new(
        Arc::new(storage),
        gemini_integration::drafter_from_config(settings.gemini()),
    );
    if settings.seed_demo_data {
        seed_demo_data(&api, Local::now().date_naive())
            .await
            .map_err(shared::error::ApiException::from)?;
    }
    let (events, _) = broadcast::channel(256);

    let state = AppState { api, events };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/register", post(http_register))
        .route("/auth/sign_in", post(http_sign_in))
        .route("/users", get(http_list_users))
        .route("/instructors", get(http_list_instructors))
        .route("/categories", get(http_categories))
        .route("/courses", get(http_catalog).post(http_create_course))
        .route("/courses/featured", get(http_featured))
        .route("/courses/draft", post(http_draft))
        .route(
            "/courses/:course_id",
            get(http_get_course).delete(http_delete_course),
        )
        .route("/courses/:course_id/enroll", post(http_enroll))
        .route("/dashboard/courses", get(http_dashboard_courses))
        .route("/dashboard/stats", get(http_dashboard_stats))
        .route("/dashboard/schedule", get(http_dashboard_schedule))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorCode::RoleNotPermitted => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict | ErrorCode::CourseFull => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn http_error(err: ApiError) -> HttpError {
    match err.code {
        ErrorCode::Internal => error!(message = %err.message, "request failed"),
        code if code.is_rule_violation() => {
            info!(?code, message = %err.message, "request refused")
        }
        code => debug!(?code, message = %err.message, "request rejected"),
    }
    (status_for(err.code), Json(err))
}

async fn actor(state: &AppState, q: &ActorQuery) -> Result<Option<User>, HttpError> {
    resolve_actor(&state.api, q.user_id.as_ref())
        .await
        .map_err(http_error)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.api.store.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok("ok")
}

async fn http_register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), HttpError> {
    let user = register(&state.api, req).await.map_err(http_error)?;
    let _ = state
        .events
        .send(ServerEvent::UserRegistered { user: user.clone() });
    Ok((StatusCode::CREATED, Json(user)))
}

async fn http_sign_in(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SignInRequest>,
) -> Result<Json<User>, HttpError> {
    let user = sign_in(&state.api, req).await.map_err(http_error)?;
    Ok(Json(user))
}

async fn http_list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ActorQuery>,
) -> Result<Json<Vec<User>>, HttpError> {
    let actor = actor(&state, &q).await?;
    let users = list_users(&state.api, actor.as_ref())
        .await
        .map_err(http_error)?;
    Ok(Json(users))
}

async fn http_list_instructors(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<User>>, HttpError> {
    let instructors = list_instructors(&state.api).await.map_err(http_error)?;
    Ok(Json(instructors))
}

async fn http_categories() -> Json<Vec<&'static str>> {
    Json(CATEGORIES.to_vec())
}

async fn http_catalog(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<Course>>, HttpError> {
    let courses = catalog(&state.api, q.q.as_deref())
        .await
        .map_err(http_error)?;
    Ok(Json(courses))
}

async fn http_featured(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Course>>, HttpError> {
    let courses = featured(&state.api).await.map_err(http_error)?;
    Ok(Json(courses))
}

async fn http_get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<Json<Course>, HttpError> {
    let course = get_course(&state.api, &CourseId(course_id))
        .await
        .map_err(http_error)?;
    Ok(Json(course))
}

async fn http_create_course(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ActorQuery>,
    ApiJson(req): ApiJson<NewCourse>,
) -> Result<(StatusCode, Json<Course>), HttpError> {
    let actor = actor(&state, &q).await?;
    let course = create_course(&state.api, actor.as_ref(), req)
        .await
        .map_err(http_error)?;
    let _ = state.events.send(ServerEvent::CourseCreated {
        course: course.clone(),
    });
    Ok((StatusCode::CREATED, Json(course)))
}

async fn http_delete_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    ApiQuery(q): ApiQuery<ActorQuery>,
) -> Result<StatusCode, HttpError> {
    let actor = actor(&state, &q).await?;
    let course_id = CourseId(course_id);
    if delete_course(&state.api, actor.as_ref(), &course_id)
        .await
        .map_err(http_error)?
    {
        let _ = state.events.send(ServerEvent::CourseDeleted { course_id });
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn http_enroll(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    ApiQuery(q): ApiQuery<ActorQuery>,
) -> Result<Json<EnrollResponse>, HttpError> {
    let actor = actor(&state, &q).await?;
    let response = enroll(&state.api, actor.as_ref(), &CourseId(course_id))
        .await
        .map_err(http_error)?;
    if response.outcome == EnrollOutcome::Enrolled {
        if let Some(student) = &actor {
            let _ = state.events.send(ServerEvent::StudentEnrolled {
                course_id: response.course.id.clone(),
                student_id: student.id.clone(),
                enrolled_count: response.course.enrolled_count(),
                capacity: response.course.capacity,
            });
        }
    }
    Ok(Json(response))
}

async fn http_dashboard_courses(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ActorQuery>,
    ApiQuery(filter): ApiQuery<CourseFilter>,
) -> Result<Json<Vec<Course>>, HttpError> {
    let actor = actor(&state, &q).await?;
    let courses = dashboard_courses(&state.api, actor.as_ref(), &filter)
        .await
        .map_err(http_error)?;
    Ok(Json(courses))
}

async fn http_dashboard_stats(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ActorQuery>,
    ApiQuery(filter): ApiQuery<CourseFilter>,
) -> Result<Json<DashboardStats>, HttpError> {
    let actor = actor(&state, &q).await?;
    let totals = stats(&state.api, actor.as_ref(), filter.tab)
        .await
        .map_err(http_error)?;
    Ok(Json(totals))
}

async fn http_dashboard_schedule(
    State(state): State<Arc<AppState>>,
    ApiQuery(q): ApiQuery<ActorQuery>,
    ApiQuery(month): ApiQuery<MonthQuery>,
) -> Result<Json<MonthSchedule>, HttpError> {
    let actor = actor(&state, &q).await?;
    let today = Local::now().date_naive();
    let grid = schedule(
        &state.api,
        actor.as_ref(),
        month.year.unwrap_or(today.year()),
        month.month.unwrap_or(today.month()),
    )
    .await
    .map_err(http_error)?;
    Ok(Json(grid))
}

async fn http_draft(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<DraftRequest>,
) -> Json<DraftResponse> {
    Json(draft_description(&state.api, &req.title).await)
}

/// Subscribes before the upgrade completes so no event published after the
/// handshake is missed.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let events_rx = state.events.subscribe();
    ws.on_upgrade(move |socket| ws_connection(socket, events_rx))
}

async fn ws_connection(
    socket: axum::extract::ws::WebSocket,
    mut events_rx: broadcast::Receiver<ServerEvent>,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
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

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
