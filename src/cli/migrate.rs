use anyhow::{Context, Result};
use cryptorag::{db::Database, Config};

pub async fn execute(config: Config) -> Result<()> {
    let url = config
        .storage
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to run migrations")?;

    tracing::info!("Running database migrations");
    let db = Database::new(url).await?;
    db.run_migrations().await?;
    db.close().await;

    println!("Database migrations completed successfully");
    Ok(())
}
