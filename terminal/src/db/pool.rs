//! Database connection pool management.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Type alias for the database pool.
pub type Pool = SqlitePool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
}

/// Create an in-memory pool with the schema applied. A single connection
/// keeps the shared in-memory database alive for the pool's lifetime.
pub async fn create_memory_pool() -> Result<Pool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(sqlx::Error::from)?;
    Ok(pool)
}

/// Run database migrations.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
