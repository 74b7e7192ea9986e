use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::{Course, CourseDraft, CourseId, EnrollOutcome, Role, User, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub outcome: EnrollOutcome,
    pub course: Course,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRequest {
    pub title: String,
}

/// `draft` is `None` whenever the text service is unavailable; clients keep
/// the description field as it was.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftResponse {
    pub draft: Option<CourseDraft>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardTab {
    #[default]
    Mine,
    All,
}

impl FromStr for DashboardTab {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "mine" => Ok(Self::Mine),
            "all" => Ok(Self::All),
            other => Err(format!("unknown tab '{other}', expected 'mine' or 'all'")),
        }
    }
}

/// Dashboard filter state. `"All"` and empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseFilter {
    #[serde(default, deserialize_with = "empty_as_default")]
    pub tab: DashboardTab,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub instructor: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub day: u32,
    pub date: NaiveDate,
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthSchedule {
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    /// Weekday of the 1st, counted from Sunday = 0. Number of blank cells
    /// before the first day in a Sunday-first grid.
    pub first_weekday: u32,
    pub days_in_month: u32,
    pub days: Vec<ScheduleDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    UserRegistered {
        user: User,
    },
    CourseCreated {
        course: Course,
    },
    CourseDeleted {
        course_id: CourseId,
    },
    StudentEnrolled {
        course_id: CourseId,
        student_id: UserId,
        enrolled_count: u32,
        capacity: u32,
    },
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn empty_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    empty_as_none(deserializer).map(Option::unwrap_or_default)
}
