use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tracing::info;

/// Process-wide connection pool, created on first use and never torn down.
static POOL: OnceCell<PgPool> = OnceCell::const_new();

/// Returns the process-wide pool, connecting on the first call only.
/// Later calls ignore their arguments and hand back the same pool.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<&'static PgPool, sqlx::Error> {
    POOL.get_or_try_init(|| async {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Database pool created successfully.");
        Ok(pool)
    })
    .await
}

/// Applies the embedded migrations in `crates/db/migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied.");
    Ok(())
}
