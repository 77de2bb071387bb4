use sqlx::postgres::PgPoolOptions;

use likeshift::config::Config;
use likeshift::{service, LOG};

#[async_std::main]
async fn main() -> anyhow::Result<()> {
    // try sourcing a .env if one exists
    dotenv::dotenv().ok();
    let config = Config::load();
    config.initialize()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;
    slog::info!(LOG, "migrations applied");

    service::start(config, pool).await?;
    Ok(())
}
