//! NoteSync Server binary.

use notesync_server::config::Config;
use notesync_server::db::{self, NoteRepository, PgNoteRepository};
use notesync_server::{app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notesync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting NoteSync Server on {}", config.bind_addr());

    let state = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            tracing::info!("Running database migrations...");
            db::run_migrations(&pool).await?;
            let notes: Arc<dyn NoteRepository> = Arc::new(PgNoteRepository::new(pool));
            AppState::new(notes)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, notes are kept in memory");
            AppState::in_memory()
        }
    };

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
