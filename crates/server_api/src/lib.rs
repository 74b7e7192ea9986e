use std::sync::Arc;

use chrono::NaiveDate;
use gemini_integration::DescriptionDrafter;
use shared::{
    domain::{
        Course, CourseId, DashboardStats, EnrollOutcome, NewCourse, Role, User, UserId,
        DEFAULT_CATEGORY,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        CourseFilter, DashboardTab, DraftResponse, EnrollResponse, MonthSchedule,
        RegisterRequest, SignInRequest,
    },
};
use storage::{seed, CatalogStore, EnrollWrite};
use tracing::{debug, info};
use url::Url;

pub mod filter;
pub mod schedule;

pub use filter::{
    dashboard_stats, featured_courses, filter_courses, has_active_filters, search_courses,
};
pub use schedule::month_schedule;

const AVATAR_BASE_URL: &str = "https://ui-avatars.com/api/";

#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<dyn CatalogStore>,
    pub drafter: Arc<dyn DescriptionDrafter>,
}

impl ApiContext {
    pub fn new(store: Arc<dyn CatalogStore>, drafter: Arc<dyn DescriptionDrafter>) -> Self {
        Self { store, drafter }
    }
}

/// Writes the demo users and courses into an empty store.
pub async fn seed_demo_data(ctx: &ApiContext, today: NaiveDate) -> Result<bool, ApiError> {
    let seeded = ctx
        .store
        .seed_if_empty(&seed::demo_users(), &seed::demo_courses(today))
        .await
        .map_err(internal)?;
    if seeded {
        info!(%today, "seeded demo catalog");
    }
    Ok(seeded)
}

pub async fn register(ctx: &ApiContext, req: RegisterRequest) -> Result<User, ApiError> {
    let name = req.name.trim();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "name is required"));
    }
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "a valid email address is required",
        ));
    }

    let existing = ctx
        .store
        .find_user_by_email(&email)
        .await
        .map_err(internal)?;
    if existing.is_some() {
        return Err(ApiError::new(
            ErrorCode::Conflict,
            "email already exists, please sign in",
        ));
    }

    let user = User {
        id: UserId::generate(),
        name: name.to_string(),
        avatar_url: avatar_url(name),
        email,
        role: req.role,
    };
    // A concurrent registration may have claimed the email since the lookup.
    if !ctx.store.insert_user(&user).await.map_err(internal)? {
        return Err(ApiError::new(
            ErrorCode::Conflict,
            "email already exists, please sign in",
        ));
    }
    info!(user_id = %user.id, role = %user.role, "user registered");
    Ok(user)
}

pub async fn sign_in(ctx: &ApiContext, req: SignInRequest) -> Result<User, ApiError> {
    ctx.store
        .find_user_by_email(&req.email.trim().to_lowercase())
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::NotFound,
                "user not found, check your email or register",
            )
        })
}

/// Looks up the self-asserted acting user. An id that names no user is
/// treated the same as no id at all.
pub async fn resolve_actor(
    ctx: &ApiContext,
    user_id: Option<&UserId>,
) -> Result<Option<User>, ApiError> {
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    let user = ctx.store.get_user(user_id).await.map_err(internal)?;
    if user.is_none() {
        debug!(%user_id, "unknown acting user");
    }
    Ok(user)
}

pub async fn list_users(ctx: &ApiContext, actor: Option<&User>) -> Result<Vec<User>, ApiError> {
    let actor = require_actor(actor)?;
    if actor.role != Role::Admin {
        return Err(ApiError::new(
            ErrorCode::RoleNotPermitted,
            "only admins can manage users",
        ));
    }
    ctx.store.list_users().await.map_err(internal)
}

pub async fn list_instructors(ctx: &ApiContext) -> Result<Vec<User>, ApiError> {
    let users = ctx.store.list_users().await.map_err(internal)?;
    Ok(users
        .into_iter()
        .filter(|u| u.role == Role::Instructor)
        .collect())
}

pub async fn get_course(ctx: &ApiContext, course_id: &CourseId) -> Result<Course, ApiError> {
    ctx.store
        .get_course(course_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "course not found"))
}

pub async fn catalog(ctx: &ApiContext, query: Option<&str>) -> Result<Vec<Course>, ApiError> {
    let courses = ctx.store.list_courses().await.map_err(internal)?;
    Ok(match query {
        Some(query) => search_courses(&courses, query),
        None => courses,
    })
}

pub async fn featured(ctx: &ApiContext) -> Result<Vec<Course>, ApiError> {
    let courses = ctx.store.list_courses().await.map_err(internal)?;
    Ok(featured_courses(&courses))
}

pub async fn create_course(
    ctx: &ApiContext,
    actor: Option<&User>,
    new_course: NewCourse,
) -> Result<Course, ApiError> {
    let actor = require_course_manager(actor)?;

    let title = new_course.title.trim();
    if title.is_empty() {
        return Err(ApiError::new(ErrorCode::Validation, "title is required"));
    }
    if new_course.capacity < 1 {
        return Err(ApiError::new(
            ErrorCode::Validation,
            "capacity must be at least 1",
        ));
    }

    let id = CourseId::generate();
    let category = match new_course.category.trim() {
        "" => DEFAULT_CATEGORY.to_string(),
        category => category.to_string(),
    };
    let image_url = new_course
        .image_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| format!("https://picsum.photos/400/300?random={id}"));

    let course = Course {
        id,
        title: title.to_string(),
        description: new_course.description,
        instructor_id: actor.id.clone(),
        instructor_name: actor.name.clone(),
        date: new_course.date,
        price: new_course.price,
        capacity: new_course.capacity,
        enrolled_student_ids: Vec::new(),
        image_url,
        category,
    };
    ctx.store.insert_course(&course).await.map_err(internal)?;
    info!(course_id = %course.id, instructor_id = %actor.id, "course created");
    Ok(course)
}

/// Removes a course. A course that does not exist is not an error.
pub async fn delete_course(
    ctx: &ApiContext,
    actor: Option<&User>,
    course_id: &CourseId,
) -> Result<bool, ApiError> {
    let actor = require_course_manager(actor)?;
    let deleted = ctx.store.delete_course(course_id).await.map_err(internal)?;
    if deleted {
        info!(%course_id, actor_id = %actor.id, "course deleted");
    } else {
        debug!(%course_id, "delete of unknown course ignored");
    }
    Ok(deleted)
}

/// Enrolls the acting student. The capacity check and the append happen in
/// one conditional store write.
pub async fn enroll(
    ctx: &ApiContext,
    actor: Option<&User>,
    course_id: &CourseId,
) -> Result<EnrollResponse, ApiError> {
    let actor = require_actor(actor)?;
    if actor.role != Role::Student {
        debug!(user_id = %actor.id, role = %actor.role, %course_id, "enroll refused for role");
        return Err(ApiError::new(
            ErrorCode::RoleNotPermitted,
            "only students can enroll in courses",
        ));
    }

    let write = ctx
        .store
        .try_enroll(course_id, &actor.id)
        .await
        .map_err(internal)?;
    let outcome = match write {
        EnrollWrite::Inserted { enrolled_count } => {
            info!(%course_id, student_id = %actor.id, enrolled_count, "student enrolled");
            EnrollOutcome::Enrolled
        }
        EnrollWrite::AlreadyEnrolled => EnrollOutcome::AlreadyEnrolled,
        EnrollWrite::Full => {
            debug!(%course_id, student_id = %actor.id, "course full");
            return Err(ApiError::new(ErrorCode::CourseFull, "course is full"));
        }
        EnrollWrite::CourseMissing => {
            return Err(ApiError::new(ErrorCode::NotFound, "course not found"));
        }
    };

    let course = get_course(ctx, course_id).await?;
    Ok(EnrollResponse { outcome, course })
}

pub async fn dashboard_courses(
    ctx: &ApiContext,
    actor: Option<&User>,
    filter: &CourseFilter,
) -> Result<Vec<Course>, ApiError> {
    let actor = require_actor(actor)?;
    let courses = ctx.store.list_courses().await.map_err(internal)?;
    Ok(filter_courses(&courses, actor.role, &actor.id, filter))
}

pub async fn stats(
    ctx: &ApiContext,
    actor: Option<&User>,
    tab: DashboardTab,
) -> Result<DashboardStats, ApiError> {
    let filter = CourseFilter {
        tab,
        ..CourseFilter::default()
    };
    let courses = dashboard_courses(ctx, actor, &filter).await?;
    Ok(dashboard_stats(&courses))
}

/// The actor's own courses laid out on a month calendar.
pub async fn schedule(
    ctx: &ApiContext,
    actor: Option<&User>,
    year: i32,
    month: u32,
) -> Result<MonthSchedule, ApiError> {
    let courses = dashboard_courses(ctx, actor, &CourseFilter::default()).await?;
    month_schedule(&courses, year, month)
}

/// Asks the text service for a description. Never fails; an unavailable
/// service yields an empty response.
pub async fn draft_description(ctx: &ApiContext, title: &str) -> DraftResponse {
    if title.trim().is_empty() {
        return DraftResponse::default();
    }
    let draft = ctx.drafter.draft(title).await;
    DraftResponse {
        description: draft.as_ref().map(|d| d.compose_description()),
        draft,
    }
}

pub fn avatar_url(name: &str) -> String {
    Url::parse_with_params(AVATAR_BASE_URL, &[("name", name), ("background", "random")])
        .map(String::from)
        .unwrap_or_else(|_| AVATAR_BASE_URL.to_string())
}

fn require_actor(actor: Option<&User>) -> Result<&User, ApiError> {
    actor.ok_or_else(ApiError::unauthenticated)
}

fn require_course_manager(actor: Option<&User>) -> Result<&User, ApiError> {
    let actor = require_actor(actor)?;
    if !actor.role.manages_courses() {
        return Err(ApiError::new(
            ErrorCode::RoleNotPermitted,
            "only instructors and admins can manage courses",
        ));
    }
    Ok(actor)
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
