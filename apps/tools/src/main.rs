use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use gemini_integration::MissingDrafter;
use server_api::{enroll, register, resolve_actor, seed_demo_data, ApiContext};
use shared::{
    domain::{CourseId, Role, UserId},
    error::ApiException,
    protocol::RegisterRequest,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/craftconnect.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the demo users and courses into an empty database.
    Seed,
    ListCourses,
    ListUsers,
    CreateUser {
        name: String,
        email: String,
        #[arg(default_value = "student")]
        role: String,
    },
    Enroll {
        user_id: String,
        course_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    let api = ApiContext::new(Arc::new(storage), Arc::new(MissingDrafter));

    match cli.command {
        Command::Seed => {
            let seeded = seed_demo_data(&api, Local::now().date_naive())
                .await
                .map_err(ApiException::from)?;
            if seeded {
                println!("seeded demo catalog");
            } else {
                println!("database already has records; nothing seeded");
            }
        }
        Command::ListCourses => {
            for course in api.store.list_courses().await? {
                println!(
                    "{}\t{}\t{}\t{}\t${}\t{}/{}",
                    course.id,
                    course.date,
                    course.category,
                    course.title,
                    course.price,
                    course.enrolled_count(),
                    course.capacity
                );
            }
        }
        Command::ListUsers => {
            for user in api.store.list_users().await? {
                println!("{}\t{}\t{}\t{}", user.id, user.role, user.email, user.name);
            }
        }
        Command::CreateUser { name, email, role } => {
            let role = Role::parse(&role)
                .with_context(|| format!("unknown role '{role}', expected admin, instructor or student"))?;
            let user = register(&api, RegisterRequest { name, email, role })
                .await
                .map_err(ApiException::from)?;
            println!("created user_id={}", user.id);
        }
        Command::Enroll { user_id, course_id } => {
            let actor = resolve_actor(&api, Some(&UserId(user_id)))
                .await
                .map_err(ApiException::from)?;
            let response = enroll(&api, actor.as_ref(), &CourseId(course_id))
                .await
                .map_err(ApiException::from)?;
            println!(
                "{:?}: {} has {}/{} seats taken",
                response.outcome,
                response.course.id,
                response.course.enrolled_count(),
                response.course.capacity
            );
        }
    }

    Ok(())
}
