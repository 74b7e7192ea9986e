use chrono::{Datelike, NaiveDate};
use shared::{
    domain::Course,
    error::{ApiError, ErrorCode},
    protocol::{MonthSchedule, ScheduleDay},
};

/// Month calendar for the given courses. Every day of the month is present,
/// with the courses dated that day in their input order.
pub fn month_schedule(courses: &[Course], year: i32, month: u32) -> Result<MonthSchedule, ApiError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, format!("invalid month {year}-{month}")))?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let next_first = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| ApiError::new(ErrorCode::Validation, "month out of range"))?;
    let days_in_month = u32::try_from((next_first - first).num_days()).unwrap_or(31);

    let days = first
        .iter_days()
        .take(days_in_month as usize)
        .map(|date| ScheduleDay {
            day: date.day(),
            date,
            courses: courses.iter().filter(|c| c.date == date).cloned().collect(),
        })
        .collect();

    Ok(MonthSchedule {
        year,
        month,
        month_name: first.format("%B").to_string(),
        first_weekday: first.weekday().num_days_from_sunday(),
        days_in_month,
        days,
    })
}
