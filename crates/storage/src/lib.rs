use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{Course, CourseId, Role, User, UserId};

mod memory;
pub mod seed;

pub use memory::MemoryStore;

/// Result of the store's conditional enrollment write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollWrite {
    Inserted { enrolled_count: u32 },
    AlreadyEnrolled,
    Full,
    CourseMissing,
}

/// Record store boundary for users and courses.
///
/// Implementations must keep `|enrolled_student_ids| <= capacity` for every
/// course and reject references to users that do not exist.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    /// Returns `false` when the id or the email (case-insensitive) is taken.
    async fn insert_user(&self, user: &User) -> Result<bool>;
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn insert_course(&self, course: &Course) -> Result<()>;
    async fn get_course(&self, course_id: &CourseId) -> Result<Option<Course>>;
    async fn list_courses(&self) -> Result<Vec<Course>>;
    async fn list_courses_by_instructor(&self, instructor_id: &UserId) -> Result<Vec<Course>>;
    async fn list_courses_by_category(&self, category: &str) -> Result<Vec<Course>>;
    /// Returns whether a course was removed. Enrollments go with it.
    async fn delete_course(&self, course_id: &CourseId) -> Result<bool>;

    /// Appends `student_id` to the course iff it is not already present and
    /// the course still has a free seat, as one atomic step.
    async fn try_enroll(&self, course_id: &CourseId, student_id: &UserId) -> Result<EnrollWrite>;

    /// Inserts the given records only when the store holds no users and no
    /// courses. Returns whether anything was written.
    async fn seed_if_empty(&self, users: &[User], courses: &[Course]) -> Result<bool>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

enum CourseScope<'a> {
    All,
    Id(&'a CourseId),
    Instructor(&'a UserId),
    Category(&'a str),
}

impl CourseScope<'_> {
    fn course_clause(&self) -> &'static str {
        match self {
            CourseScope::All => "",
            CourseScope::Id(_) => "WHERE c.id = ?",
            CourseScope::Instructor(_) => "WHERE c.instructor_id = ?",
            CourseScope::Category(_) => "WHERE c.category = ?",
        }
    }

    fn bind_value(&self) -> Option<&str> {
        match self {
            CourseScope::All => None,
            CourseScope::Id(id) => Some(id.as_str()),
            CourseScope::Instructor(id) => Some(id.as_str()),
            CourseScope::Category(category) => Some(category),
        }
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run catalog migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn load_courses(&self, scope: CourseScope<'_>) -> Result<Vec<Course>> {
        let course_sql = format!(
            "SELECT c.id, c.title, c.description, c.instructor_id, c.instructor_name, c.date,
                    c.price, c.capacity, c.image_url, c.category
             FROM courses c
             {}
             ORDER BY c.rowid ASC",
            scope.course_clause()
        );
        let enrollment_sql = format!(
            "SELECT e.course_id, e.user_id
             FROM enrollments e
             INNER JOIN courses c ON c.id = e.course_id
             {}
             ORDER BY e.rowid ASC",
            scope.course_clause()
        );

        let mut course_query = sqlx::query(&course_sql);
        let mut enrollment_query = sqlx::query(&enrollment_sql);
        if let Some(value) = scope.bind_value() {
            course_query = course_query.bind(value);
            enrollment_query = enrollment_query.bind(value);
        }

        let course_rows = course_query
            .fetch_all(&self.pool)
            .await
            .context("failed to load courses")?;
        let enrollment_rows = enrollment_query
            .fetch_all(&self.pool)
            .await
            .context("failed to load enrollments")?;

        let mut enrolled: HashMap<String, Vec<UserId>> = HashMap::new();
        for row in enrollment_rows {
            enrolled
                .entry(row.try_get::<String, _>(0)?)
                .or_default()
                .push(UserId(row.try_get::<String, _>(1)?));
        }

        course_rows
            .into_iter()
            .map(|row| {
                let id: String = row.try_get(0)?;
                let students = enrolled.remove(&id).unwrap_or_default();
                course_from_row(&row, students)
            })
            .collect()
    }

    async fn enrolled_count(&self, course_id: &CourseId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments WHERE course_id = ?")
            .bind(course_id.as_str())
            .fetch_one(&self.pool)
            .await?;
        u32::try_from(count).context("enrollment count out of range")
    }
}

#[async_trait]
impl CatalogStore for Storage {
    async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        let inserted = sqlx::query(
            "INSERT INTO users (id, name, email, role, avatar_url)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(user.email.trim().to_lowercase())
        .bind(user.role.as_str())
        .bind(&user.avatar_url)
        .execute(&self.pool)
        .await
        .context("failed to insert user")?
        .rows_affected();
        Ok(inserted > 0)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, role, avatar_url FROM users WHERE id = ?")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, name, email, role, avatar_url FROM users WHERE email = ? COLLATE NOCASE",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| user_from_row(&r)).transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows =
            sqlx::query("SELECT id, name, email, role, avatar_url FROM users ORDER BY rowid ASC")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn insert_course(&self, course: &Course) -> Result<()> {
        check_enrollment_list(course)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO courses (id, title, description, instructor_id, instructor_name, date, price, capacity, image_url, category)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(course.id.as_str())
        .bind(&course.title)
        .bind(&course.description)
        .bind(course.instructor_id.as_str())
        .bind(&course.instructor_name)
        .bind(course.date)
        .bind(i64::from(course.price))
        .bind(i64::from(course.capacity))
        .bind(&course.image_url)
        .bind(&course.category)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert course '{}'", course.id))?;

        for student_id in &course.enrolled_student_ids {
            sqlx::query("INSERT INTO enrollments (course_id, user_id) VALUES (?, ?)")
                .bind(course.id.as_str())
                .bind(student_id.as_str())
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!("failed to enroll '{student_id}' into course '{}'", course.id)
                })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Option<Course>> {
        Ok(self
            .load_courses(CourseScope::Id(course_id))
            .await?
            .into_iter()
            .next())
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        self.load_courses(CourseScope::All).await
    }

    async fn list_courses_by_instructor(&self, instructor_id: &UserId) -> Result<Vec<Course>> {
        self.load_courses(CourseScope::Instructor(instructor_id))
            .await
    }

    async fn list_courses_by_category(&self, category: &str) -> Result<Vec<Course>> {
        self.load_courses(CourseScope::Category(category)).await
    }

    async fn delete_course(&self, course_id: &CourseId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM courses WHERE id = ?")
            .bind(course_id.as_str())
            .execute(&self.pool)
            .await
            .context("failed to delete course")?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn try_enroll(&self, course_id: &CourseId, student_id: &UserId) -> Result<EnrollWrite> {
        // The seat check and the append are one statement; SQLite serializes
        // writers, so two sessions cannot both take the last seat.
        let inserted = sqlx::query(
            "INSERT INTO enrollments (course_id, user_id)
             SELECT c.id, ?
             FROM courses c
             WHERE c.id = ?
               AND (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) < c.capacity
             ON CONFLICT(course_id, user_id) DO NOTHING",
        )
        .bind(student_id.as_str())
        .bind(course_id.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to enroll '{student_id}' into course '{course_id}'"))?
        .rows_affected();

        if inserted > 0 {
            let enrolled_count = self.enrolled_count(course_id).await?;
            debug!(%course_id, %student_id, enrolled_count, "enrollment stored");
            return Ok(EnrollWrite::Inserted { enrolled_count });
        }

        let row = sqlx::query(
            "SELECT
                EXISTS(SELECT 1 FROM courses WHERE id = ?),
                EXISTS(SELECT 1 FROM enrollments WHERE course_id = ? AND user_id = ?)",
        )
        .bind(course_id.as_str())
        .bind(course_id.as_str())
        .bind(student_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        let course_exists: bool = row.try_get(0)?;
        let already_enrolled: bool = row.try_get(1)?;
        Ok(if !course_exists {
            EnrollWrite::CourseMissing
        } else if already_enrolled {
            EnrollWrite::AlreadyEnrolled
        } else {
            EnrollWrite::Full
        })
    }

    async fn seed_if_empty(&self, users: &[User], courses: &[Course]) -> Result<bool> {
        let existing: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM users) + (SELECT COUNT(*) FROM courses)",
        )
        .fetch_one(&self.pool)
        .await?;
        if existing > 0 {
            return Ok(false);
        }

        for user in users {
            if !self.insert_user(user).await? {
                bail!("duplicate seed user '{}'", user.id);
            }
        }
        for course in courses {
            self.insert_course(course).await?;
        }
        Ok(true)
    }
}

fn check_enrollment_list(course: &Course) -> Result<()> {
    if course.capacity == 0 {
        bail!("course '{}' must have capacity of at least 1", course.id);
    }
    if course.enrolled_count() > course.capacity {
        bail!(
            "course '{}' lists {} students for {} seats",
            course.id,
            course.enrolled_student_ids.len(),
            course.capacity
        );
    }
    for (index, student_id) in course.enrolled_student_ids.iter().enumerate() {
        if course.enrolled_student_ids[..index].contains(student_id) {
            bail!("course '{}' lists '{student_id}' twice", course.id);
        }
    }
    Ok(())
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let raw_role: String = row.try_get(3)?;
    let role = Role::parse(&raw_role).ok_or_else(|| anyhow!("unknown role '{raw_role}'"))?;
    Ok(User {
        id: UserId(row.try_get(0)?),
        name: row.try_get(1)?,
        email: row.try_get(2)?,
        role,
        avatar_url: row.try_get(4)?,
    })
}

fn course_from_row(row: &SqliteRow, enrolled_student_ids: Vec<UserId>) -> Result<Course> {
    let price: i64 = row.try_get(6)?;
    let capacity: i64 = row.try_get(7)?;
    Ok(Course {
        id: CourseId(row.try_get(0)?),
        title: row.try_get(1)?,
        description: row.try_get(2)?,
        instructor_id: UserId(row.try_get(3)?),
        instructor_name: row.try_get(4)?,
        date: row.try_get::<NaiveDate, _>(5)?,
        price: u32::try_from(price).context("course price out of range")?,
        capacity: u32::try_from(capacity).context("course capacity out of range")?,
        enrolled_student_ids,
        image_url: row.try_get(8)?,
        category: row.try_get(9)?,
    })
}

pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
