//! Pure course-list views. Every function keeps the input order.

use std::collections::HashSet;

use shared::{
    domain::{Course, DashboardStats, Role, UserId},
    protocol::{CourseFilter, DashboardTab},
};

pub const FEATURED_COUNT: usize = 3;

/// Courses shown on a dashboard tab for the given actor.
///
/// On the "mine" tab instructors and admins see the courses they teach and
/// students see the courses they are enrolled in. The remaining filters are
/// conjunctive; an unset filter matches everything.
pub fn filter_courses(
    courses: &[Course],
    role: Role,
    actor_id: &UserId,
    filter: &CourseFilter,
) -> Vec<Course> {
    courses
        .iter()
        .filter(|course| owned_by_tab(course, role, actor_id, filter.tab))
        .filter(|course| matches_filters(course, filter))
        .cloned()
        .collect()
}

fn owned_by_tab(course: &Course, role: Role, actor_id: &UserId, tab: DashboardTab) -> bool {
    match tab {
        DashboardTab::All => true,
        DashboardTab::Mine if role.manages_courses() => &course.instructor_id == actor_id,
        DashboardTab::Mine => course.is_enrolled(actor_id),
    }
}

fn matches_filters(course: &Course, filter: &CourseFilter) -> bool {
    let category = active_value(filter.category.as_deref());
    let instructor = active_value(filter.instructor.as_deref());

    category.map_or(true, |c| course.category == c)
        && instructor.map_or(true, |i| course.instructor_id.as_str() == i)
        && filter.start.map_or(true, |start| course.date >= start)
        && filter.end.map_or(true, |end| course.date <= end)
}

fn active_value(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "All")
}

pub fn has_active_filters(filter: &CourseFilter) -> bool {
    active_value(filter.category.as_deref()).is_some()
        || active_value(filter.instructor.as_deref()).is_some()
        || filter.start.is_some()
        || filter.end.is_some()
}

/// Public catalog search over title and category, ignoring case.
pub fn search_courses(courses: &[Course], query: &str) -> Vec<Course> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return courses.to_vec();
    }
    courses
        .iter()
        .filter(|c| {
            c.title.to_lowercase().contains(&needle) || c.category.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}

pub fn featured_courses(courses: &[Course]) -> Vec<Course> {
    courses.iter().take(FEATURED_COUNT).cloned().collect()
}

pub fn dashboard_stats(courses: &[Course]) -> DashboardStats {
    let students: HashSet<&UserId> = courses
        .iter()
        .flat_map(|c| c.enrolled_student_ids.iter())
        .collect();
    let total_revenue = courses
        .iter()
        .map(|c| u64::from(c.price) * u64::from(c.enrolled_count()))
        .sum();

    DashboardStats {
        total_courses: courses.len() as u64,
        total_students: students.len() as u64,
        total_revenue,
    }
}
