use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Platform '{0}' has no OAuth credentials configured")]
    Configuration(String),

    #[error("OAuth state mismatch for '{0}'")]
    StateMismatch(String),

    #[error("No authorization in progress for '{0}'")]
    MissingVerifier(String),

    #[error("No refresh token available for '{0}'")]
    NoRefreshToken(String),

    #[error("Authorization denied by platform: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("Token exchange failed{}: {body}", status_suffix(.status))]
    TokenExchange { status: Option<u16>, body: String },

    #[error("Token refresh failed{}: {body}", status_suffix(.status))]
    TokenRefresh { status: Option<u16>, body: String },

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (HTTP {})", code))
        .unwrap_or_default()
}

impl AppError {
    /// Message shown to the dashboard. Each failure class gets its own wording
    /// so the UI can tell bad credentials, denied consent and network trouble apart.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Configuration(platform) => format!(
                "Set a client ID for {} before connecting the account.",
                platform
            ),
            AppError::StateMismatch(_) => {
                "The authorization response did not match this login attempt. Please start again."
                    .to_string()
            }
            AppError::MissingVerifier(_) => {
                "This authorization has expired or was never started. Please start again."
                    .to_string()
            }
            AppError::NoRefreshToken(platform) => format!(
                "{} did not issue a refresh token. Reconnect the account to continue.",
                platform
            ),
            AppError::AuthorizationDenied { error, description } => match description {
                Some(description) => format!("Authorization was denied ({}): {}", error, description),
                None => format!("Authorization was denied ({}).", error),
            },
            AppError::TokenExchange { status: Some(code), .. } => format!(
                "The platform rejected the authorization code (HTTP {}).",
                code
            ),
            AppError::TokenExchange { status: None, .. } => {
                "Could not reach the platform's token endpoint.".to_string()
            }
            AppError::TokenRefresh { status: Some(code), .. } => format!(
                "The platform rejected the token refresh (HTTP {}). Reconnect the account.",
                code
            ),
            AppError::TokenRefresh { status: None, .. } => {
                "Could not reach the platform's token endpoint to refresh the token.".to_string()
            }
            AppError::UnknownPlatform(platform) => format!("Unknown platform: {}", platform),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "configuration",
            AppError::StateMismatch(_) => "state_mismatch",
            AppError::MissingVerifier(_) => "missing_verifier",
            AppError::NoRefreshToken(_) => "no_refresh_token",
            AppError::AuthorizationDenied { .. } => "authorization_denied",
            AppError::TokenExchange { .. } => "token_exchange",
            AppError::TokenRefresh { .. } => "token_refresh",
            AppError::UnknownPlatform(_) => "unknown_platform",
            AppError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Configuration(_) => StatusCode::PRECONDITION_FAILED,
            AppError::StateMismatch(_) => StatusCode::BAD_REQUEST,
            AppError::MissingVerifier(_) | AppError::NoRefreshToken(_) => StatusCode::CONFLICT,
            AppError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            AppError::TokenExchange { status: Some(_), .. }
            | AppError::TokenRefresh { status: Some(_), .. } => StatusCode::BAD_GATEWAY,
            AppError::TokenExchange { status: None, .. }
            | AppError::TokenRefresh { status: None, .. } => StatusCode::GATEWAY_TIMEOUT,
            AppError::UnknownPlatform(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind(),
            "message": self.user_message(),
        }));

        (self.status_code(), body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
