//! OAuth 2.0 authorization-code + PKCE token manager for the StreamHub
//! multistreaming dashboard, and the HTTP service that exposes it.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod manager;
pub mod pkce;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod transport;
pub mod types;

pub use crate::{
    catalog::PlatformCatalog, config::Config, error::AppError, manager::OAuthTokenManager,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<PlatformCatalog>,
    pub manager: OAuthTokenManager,
}

impl AppState {
    /// Apply per-platform settings from the config: endpoint overrides go into
    /// the catalog, client credentials into the manager.
    pub fn new(config: Config, mut catalog: PlatformCatalog, manager: OAuthTokenManager) -> Self {
        for settings in &config.platforms {
            let Some(entry) = catalog.get_mut(&settings.id) else {
                warn!("Ignoring settings for unknown platform {}", settings.id);
                continue;
            };
            if let Some(auth_url) = &settings.auth_url {
                entry.oauth.auth_url = auth_url.clone();
            }
            if let Some(token_url) = &settings.token_url {
                entry.oauth.token_url = token_url.clone();
            }

            if let Some(client_id) = &settings.client_id {
                let redirect_uri = settings
                    .redirect_uri
                    .clone()
                    .unwrap_or_else(|| config.default_redirect_uri(&settings.id));
                manager.set_credentials(
                    &settings.id,
                    client_id.clone(),
                    settings.client_secret.clone(),
                    redirect_uri,
                );
                info!("Loaded credentials for {} from environment", settings.id);
            }
        }

        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            manager,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/platforms", get(routes::list_platforms))
        .route("/platforms/:platform", get(routes::platform_status))
        .route(
            "/platforms/:platform/credentials",
            put(routes::set_credentials),
        )
        .route("/platforms/:platform/authorize", post(routes::authorize))
        .route("/platforms/:platform/complete", post(routes::complete))
        .route("/platforms/:platform/refresh", post(routes::refresh))
        .route("/platforms/:platform/revoke", post(routes::revoke))
        .route("/oauth/callback/:platform", get(routes::callback))
        .route("/health", get(routes::health_check))
        .route("/", get(routes::root_handler))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
