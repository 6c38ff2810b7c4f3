use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dartscore::{
    repository::{DartsRepository, InMemoryDartsRepository, PostgresDartsRepository},
    routes, AppConfig, AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting darts scoring server");

    let repository: Arc<dyn DartsRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let repository = PostgresDartsRepository::new(pool);
            repository.migrate().await?;
            info!("Using PostgreSQL repository");
            Arc::new(repository)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory repository");
            Arc::new(InMemoryDartsRepository::new())
        }
    };

    let app = routes::app(AppState::new(repository));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Server running");
    axum::serve(listener, app).await?;
    Ok(())
}
