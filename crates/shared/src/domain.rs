use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(CourseId);

/// Categories offered by the course form. Stored category values are free text.
pub const CATEGORIES: [&str; 6] = [
    "Ceramics",
    "Painting",
    "Leather",
    "Woodworking",
    "Textiles",
    "General",
];

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Instructor => "INSTRUCTOR",
            Role::Student => "STUDENT",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Role::Admin),
            "INSTRUCTOR" => Some(Role::Instructor),
            "STUDENT" => Some(Role::Student),
            _ => None,
        }
    }

    /// Instructors and admins own, create and delete courses.
    pub fn manages_courses(self) -> bool {
        matches!(self, Role::Admin | Role::Instructor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub title: String,
    pub description: String,
    pub instructor_id: UserId,
    pub instructor_name: String,
    pub date: NaiveDate,
    pub price: u32,
    pub capacity: u32,
    pub enrolled_student_ids: Vec<UserId>,
    pub image_url: String,
    pub category: String,
}

impl Course {
    pub fn enrolled_count(&self) -> u32 {
        u32::try_from(self.enrolled_student_ids.len()).unwrap_or(u32::MAX)
    }

    pub fn spots_left(&self) -> u32 {
        self.capacity.saturating_sub(self.enrolled_count())
    }

    pub fn is_full(&self) -> bool {
        self.enrolled_count() >= self.capacity
    }

    pub fn is_enrolled(&self, user_id: &UserId) -> bool {
        self.enrolled_student_ids.contains(user_id)
    }
}

/// Course fields supplied by the creating instructor. Identity, instructor
/// snapshot and enrollment list are filled in on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCourse {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    pub price: u32,
    pub capacity: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollOutcome {
    Enrolled,
    AlreadyEnrolled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDraft {
    pub description: String,
    pub prerequisites: String,
}

impl CourseDraft {
    /// Text placed into the course form's description field.
    pub fn compose_description(&self) -> String {
        format!(
            "{}\n\nPrerequisites: {}",
            self.description.trim(),
            self.prerequisites.trim()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_courses: u64,
    pub total_students: u64,
    pub total_revenue: u64,
}
