use sentinel_server::config::ServerConfig;
use sentinel_server::{routes, state, TracingSink};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let config = ServerConfig::from_env();
    let state = state::build_state(&config)?;

    state.feed().watch(TracingSink, config.feed_poll);
    state::start_scanners(&state, &config);

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(bind = %config.bind, db = %config.db_path, "sentinel-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
