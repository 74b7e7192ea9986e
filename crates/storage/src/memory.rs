use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use shared::domain::{Course, CourseId, User, UserId};

use crate::{check_enrollment_list, CatalogStore, EnrollWrite};

/// Process-local store. Records keep insertion order; every operation runs
/// under a single lock, which also makes `try_enroll` atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    courses: Vec<Course>,
}

impl MemoryState {
    fn has_user(&self, user_id: &UserId) -> bool {
        self.users.iter().any(|u| &u.id == user_id)
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users.iter().any(|u| u.email.eq_ignore_ascii_case(email))
    }

    /// Stores the user with a trimmed, lower-cased email. Returns `false`
    /// when the id or the email is already taken.
    fn insert_user(&mut self, user: &User) -> bool {
        let email = user.email.trim().to_lowercase();
        if self.has_user(&user.id) || self.email_taken(&email) {
            return false;
        }
        self.users.push(User {
            email,
            ..user.clone()
        });
        true
    }

    fn insert_course(&mut self, course: &Course) -> Result<()> {
        check_enrollment_list(course)?;
        if self.courses.iter().any(|c| c.id == course.id) {
            bail!("course '{}' already exists", course.id);
        }
        if !self.has_user(&course.instructor_id) {
            bail!(
                "course '{}' references unknown instructor '{}'",
                course.id,
                course.instructor_id
            );
        }
        if let Some(missing) = course
            .enrolled_student_ids
            .iter()
            .find(|id| !self.has_user(id))
        {
            bail!("course '{}' references unknown student '{missing}'", course.id);
        }
        self.courses.push(course.clone());
        Ok(())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        Ok(self.lock()?.insert_user(user))
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        Ok(self.lock()?.users.iter().find(|u| &u.id == user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim();
        Ok(self
            .lock()?
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.lock()?.users.clone())
    }

    async fn insert_course(&self, course: &Course) -> Result<()> {
        self.lock()?.insert_course(course)
    }

    async fn get_course(&self, course_id: &CourseId) -> Result<Option<Course>> {
        Ok(self
            .lock()?
            .courses
            .iter()
            .find(|c| &c.id == course_id)
            .cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        Ok(self.lock()?.courses.clone())
    }

    async fn list_courses_by_instructor(&self, instructor_id: &UserId) -> Result<Vec<Course>> {
        Ok(self
            .lock()?
            .courses
            .iter()
            .filter(|c| &c.instructor_id == instructor_id)
            .cloned()
            .collect())
    }

    async fn list_courses_by_category(&self, category: &str) -> Result<Vec<Course>> {
        Ok(self
            .lock()?
            .courses
            .iter()
            .filter(|c| c.category == category)
            .cloned()
            .collect())
    }

    async fn delete_course(&self, course_id: &CourseId) -> Result<bool> {
        let mut state = self.lock()?;
        let before = state.courses.len();
        state.courses.retain(|c| &c.id != course_id);
        Ok(state.courses.len() != before)
    }

    async fn try_enroll(&self, course_id: &CourseId, student_id: &UserId) -> Result<EnrollWrite> {
        let mut state = self.lock()?;
        if !state.has_user(student_id) {
            bail!("cannot enroll unknown student '{student_id}'");
        }
        let Some(course) = state.courses.iter_mut().find(|c| &c.id == course_id) else {
            return Ok(EnrollWrite::CourseMissing);
        };
        if course.is_enrolled(student_id) {
            return Ok(EnrollWrite::AlreadyEnrolled);
        }
        if course.is_full() {
            return Ok(EnrollWrite::Full);
        }
        course.enrolled_student_ids.push(student_id.clone());
        Ok(EnrollWrite::Inserted {
            enrolled_count: course.enrolled_count(),
        })
    }

    async fn seed_if_empty(&self, users: &[User], courses: &[Course]) -> Result<bool> {
        let mut state = self.lock()?;
        if !state.users.is_empty() || !state.courses.is_empty() {
            return Ok(false);
        }
        for user in users {
            if !state.insert_user(user) {
                bail!("duplicate seed user '{}'", user.id);
            }
        }
        for course in courses {
            state.insert_course(course)?;
        }
        Ok(true)
    }
}
