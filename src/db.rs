use rocket_db_pools::{sqlx, Database};

#[derive(Database)]
#[database("kamero_db")]
pub struct KameroDb(sqlx::PgPool);

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Apply every pending migration under `migrations/`.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}
