// Page Tree Server - serves published pages by locale and permalink

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use page_tree::{app_state::AppState, config::Config, http::create_page_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;

    // Warm the permalink route patterns
    for locale in &config.locales.supported {
        if let Some(pattern) = app_state.page_service.register_routes(Some(locale.as_str())).await? {
            info!("Page routes for {}: {}", locale, pattern);
        }
    }

    let app = Router::new()
        .merge(create_page_router(app_state))
        .layer(CorsLayer::permissive());

    let addr = config.server_address();
    info!("Page server starting on http://{} ({:?})", addr, config.environment);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
