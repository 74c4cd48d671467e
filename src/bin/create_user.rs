use std::io::{self, Write};

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

use kamero_api::auth::passwords::{PasswordCost, PasswordService};
use kamero_api::auth::responses::Role;

#[derive(Parser, Debug)]
#[command(
    name = "create_user",
    about = "Create a Kamero user account, typically the first administrator"
)]
struct Args {
    /// Login name for the account.
    #[arg(long)]
    username: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Optional email address used for password resets.
    #[arg(long)]
    email: Option<String>,

    /// Role to assign (`admin`, `lecturer` or `student`).
    #[arg(long, default_value = "admin")]
    role: String,

    /// Institution the account belongs to.
    #[arg(long)]
    institution_id: Option<i32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let username = args.username.trim().to_string();

    if username.is_empty() {
        writeln!(io::stderr(), "error: username must not be empty")?;
        std::process::exit(1);
    }

    let Some(role) = Role::parse(args.role.trim().to_lowercase().as_str()) else {
        writeln!(
            io::stderr(),
            "error: unsupported role '{}'. Use 'admin', 'lecturer' or 'student'.",
            args.role
        )?;
        std::process::exit(1);
    };

    if role == Role::Lecturer && args.institution_id.is_none() {
        log::warn!("lecturer '{username}' has no institution and will be refused lecturer routes");
    }

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE username = $1")
        .bind(&username)
        .fetch_one(&mut *tx)
        .await?;

    if existing > 0 {
        writeln!(
            io::stderr(),
            "error: a user named '{username}' already exists."
        )?;
        std::process::exit(1);
    }

    let password_service = PasswordService::new(PasswordCost::from_env()).map_err(|err| {
        io::Error::new(io::ErrorKind::Other, format!("argon2 init failed: {err}"))
    })?;
    let password_hash = password_service
        .hash_password(&args.password)
        .map_err(|err| {
            io::Error::new(io::ErrorKind::Other, format!("password hash failed: {err}"))
        })?;

    let user_id: i32 = sqlx::query_scalar(
        "INSERT INTO users (username, email, password, role, institution_id) VALUES ($1, $2, $3, $4, $5) RETURNING id",
    )
    .bind(&username)
    .bind(args.email.as_deref().map(str::trim))
    .bind(password_hash)
    .bind(role.as_str())
    .bind(args.institution_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    println!("Created {role} user '{username}' with id {user_id}");
    Ok(())
}
