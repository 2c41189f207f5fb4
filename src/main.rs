use anyhow::Result;
use std::sync::Arc;
use streamhub_oauth::{
    app, transport::HttpTokenEndpoint, AppState, Config, OAuthTokenManager, PlatformCatalog,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamhub_oauth=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let catalog = PlatformCatalog::builtin();

    // Load configuration
    let config = Config::from_env(catalog.ids())?;
    info!("Starting StreamHub OAuth service");

    // Token endpoint calls get a bounded timeout
    let endpoint = HttpTokenEndpoint::new(config.token_request_timeout)?;
    let manager = OAuthTokenManager::new(Arc::new(endpoint));

    let app_state = AppState::new(config, catalog, manager);
    let router = app(app_state.clone());

    let addr = app_state.config.server_address();
    info!("Listening on {}", addr);

    println!("\nStreamHub OAuth Service");
    println!("=======================");
    println!("Server running at: {}", app_state.config.public_url);
    println!("\nPlatforms:");
    for id in app_state.catalog.ids() {
        let status = app_state.manager.status(id);
        println!(
            "  {:<10} {}",
            id,
            if status.configured {
                "credentials loaded"
            } else {
                "no credentials"
            }
        );
    }
    println!("\nAPI Endpoints:");
    println!("  Platforms: {}/platforms", app_state.config.public_url);
    println!("  Callback:  {}/oauth/callback/:platform", app_state.config.public_url);
    println!("  Health:    {}/health\n", app_state.config.public_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
