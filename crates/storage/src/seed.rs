//! Fixed demo records written into an empty store on first start.

use chrono::{Days, NaiveDate};
use shared::domain::{Course, CourseId, Role, User, UserId};

struct DemoCourse {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    instructor: usize,
    days_from_today: u64,
    price: u32,
    capacity: u32,
    enrolled: &'static [&'static str],
    image_id: u32,
    category: &'static str,
}

const DEMO_USERS: [(&str, &str, &str, Role); 3] = [
    ("1", "Alice Admin", "alice@craft.com", Role::Admin),
    ("2", "Bob Instructor", "bob@craft.com", Role::Instructor),
    ("3", "Charlie Student", "charlie@gmail.com", Role::Student),
];

const DEMO_COURSES: [DemoCourse; 5] = [
    DemoCourse {
        id: "c1",
        title: "Modern Ceramics & Glazing",
        description: "Learn the fundamentals of wheel throwing and glazing techniques. Create your own bowl set.",
        instructor: 1,
        days_from_today: 2,
        price: 120,
        capacity: 8,
        enrolled: &["3"],
        image_id: 40,
        category: "Ceramics",
    },
    DemoCourse {
        id: "c2",
        title: "Leather Crafting Basics",
        description: "Design and stitch your own leather wallet. Tools and materials provided.",
        instructor: 1,
        days_from_today: 7,
        price: 95,
        capacity: 6,
        enrolled: &[],
        image_id: 80,
        category: "Leather",
    },
    DemoCourse {
        id: "c3",
        title: "Watercolor Landscapes",
        description: "Capture the beauty of nature with watercolor techniques. Suitable for beginners.",
        instructor: 0,
        days_from_today: 10,
        price: 60,
        capacity: 12,
        enrolled: &["3"],
        image_id: 90,
        category: "Painting",
    },
    DemoCourse {
        id: "c4",
        title: "Rustic Wood Stool",
        description: "Build your own three-legged stool using traditional joinery. No power tools needed.",
        instructor: 1,
        days_from_today: 14,
        price: 150,
        capacity: 5,
        enrolled: &[],
        image_id: 106,
        category: "Woodworking",
    },
    DemoCourse {
        id: "c5",
        title: "Intro to Weaving",
        description: "Learn the basics of weaving on a frame loom. Create a beautiful wall hanging.",
        instructor: 0,
        days_from_today: 20,
        price: 85,
        capacity: 10,
        enrolled: &[],
        image_id: 225,
        category: "Textiles",
    },
];

pub fn demo_users() -> Vec<User> {
    DEMO_USERS
        .iter()
        .map(|(id, name, email, role)| User {
            id: UserId::from(*id),
            name: (*name).to_string(),
            email: (*email).to_string(),
            role: *role,
            avatar_url: format!("https://picsum.photos/id/{id}/200/200"),
        })
        .collect()
}

/// Demo courses dated relative to `today`, in their display order.
pub fn demo_courses(today: NaiveDate) -> Vec<Course> {
    DEMO_COURSES
        .iter()
        .map(|demo| {
            let (instructor_id, instructor_name, _, _) = DEMO_USERS[demo.instructor];
            Course {
                id: CourseId::from(demo.id),
                title: demo.title.to_string(),
                description: demo.description.to_string(),
                instructor_id: UserId::from(instructor_id),
                instructor_name: instructor_name.to_string(),
                date: today
                    .checked_add_days(Days::new(demo.days_from_today))
                    .unwrap_or(today),
                price: demo.price,
                capacity: demo.capacity,
                enrolled_student_ids: demo.enrolled.iter().map(|id| UserId::from(*id)).collect(),
                image_url: format!("https://picsum.photos/id/{}/800/600", demo.image_id),
                category: demo.category.to_string(),
            }
        })
        .collect()
}
