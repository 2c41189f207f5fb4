use crate::{
    error::{AppError, Result},
    types::{AuthorizationRequest, OAuthCallback, PlatformStatus},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompletePayload {
    pub code: String,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct PlatformView {
    pub name: String,
    #[serde(flatten)]
    pub status: PlatformStatus,
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "StreamHub OAuth",
        "status": "running",
        "endpoints": {
            "platforms": "/platforms",
            "credentials": "/platforms/:platform/credentials",
            "authorize": "/platforms/:platform/authorize",
            "complete": "/platforms/:platform/complete",
            "callback": "/oauth/callback/:platform",
            "refresh": "/platforms/:platform/refresh",
            "revoke": "/platforms/:platform/revoke",
            "health": "/health"
        }
    }))
}

pub async fn list_platforms(State(state): State<AppState>) -> Json<Vec<PlatformView>> {
    let views = state
        .catalog
        .ids()
        .filter_map(|id| state.catalog.get(id))
        .map(|entry| PlatformView {
            name: entry.name.clone(),
            status: state.manager.status(&entry.id),
        })
        .collect();
    Json(views)
}

pub async fn platform_status(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<PlatformView>> {
    let entry = state
        .catalog
        .get(&platform)
        .ok_or_else(|| AppError::UnknownPlatform(platform.clone()))?;

    Ok(Json(PlatformView {
        name: entry.name.clone(),
        status: state.manager.status(&platform),
    }))
}

pub async fn set_credentials(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Json(payload): Json<CredentialsPayload>,
) -> Result<Json<PlatformStatus>> {
    state.catalog.oauth(&platform)?;

    let client_id = payload.client_id.trim();
    if client_id.is_empty() {
        return Err(AppError::Configuration(platform));
    }

    let redirect_uri = payload
        .redirect_uri
        .filter(|uri| !uri.is_empty())
        .unwrap_or_else(|| state.config.default_redirect_uri(&platform));
    url::Url::parse(&redirect_uri).map_err(|e| {
        AppError::Configuration(format!("{} (invalid redirect URI: {})", platform, e))
    })?;

    state.manager.set_credentials(
        &platform,
        client_id,
        payload.client_secret.filter(|secret| !secret.is_empty()),
        redirect_uri,
    );

    info!("Credentials updated for {}", platform);
    Ok(Json(state.manager.status(&platform)))
}

pub async fn authorize(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<AuthorizationRequest>> {
    let oauth = state.catalog.oauth(&platform)?;
    let request = state.manager.authorization_request(&platform, oauth)?;

    debug!(
        "Authorization URL for {}: {}",
        platform, request.authorization_url
    );
    Ok(Json(request))
}

pub async fn complete(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Json(payload): Json<CompletePayload>,
) -> Result<Json<PlatformStatus>> {
    let oauth = state.catalog.oauth(&platform)?;
    state
        .manager
        .complete_authorization(&platform, &payload.code, &payload.state, oauth)
        .await?;

    Ok(Json(state.manager.status(&platform)))
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<PlatformStatus>> {
    let oauth = state.catalog.oauth(&platform)?;
    state.manager.refresh(&platform, oauth).await?;

    Ok(Json(state.manager.status(&platform)))
}

pub async fn revoke(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<PlatformStatus>> {
    state.catalog.oauth(&platform)?;
    state.manager.revoke(&platform);

    Ok(Json(state.manager.status(&platform)))
}

// Platform redirects here after consent
pub async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<OAuthCallback>,
) -> Response {
    match handle_callback(&state, &platform, params).await {
        Ok(()) => {
            info!("Callback completed for {}", platform);
            callback_page(
                &platform,
                StatusCode::OK,
                true,
                "Account connected. You can close this window.",
            )
        }
        Err(e) => {
            error!("Callback for {} failed: {}", platform, e);
            callback_page(&platform, e.status_code(), false, &e.user_message())
        }
    }
}

async fn handle_callback(state: &AppState, platform: &str, params: OAuthCallback) -> Result<()> {
    let oauth = state.catalog.oauth(platform)?;

    if let Some(error) = params.error {
        return Err(AppError::AuthorizationDenied {
            error,
            description: params.error_description,
        });
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        return Err(AppError::AuthorizationDenied {
            error: "invalid_request".to_string(),
            description: Some("The callback did not include a code and state".to_string()),
        });
    };

    state
        .manager
        .complete_authorization(platform, &code, &oauth_state, oauth)
        .await?;
    Ok(())
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn callback_page(platform: &str, status: StatusCode, success: bool, message: &str) -> Response {
    let payload = json!({
        "type": "streamhub:oauth-callback",
        "platform": platform,
        "success": success,
        "message": message,
    })
    .to_string()
    .replace("</", "<\\/");

    let (title, class) = if success {
        ("Connected", "success")
    } else {
        ("Connection failed", "error")
    };

    let html = format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background-color: #0f0f14;
        }}
        .container {{
            text-align: center;
            background: #1b1b24;
            color: #e2e8f0;
            padding: 2rem;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.4);
            max-width: 420px;
        }}
        .success {{
            color: #48bb78;
            font-weight: bold;
        }}
        .error {{
            color: #f56565;
            font-weight: bold;
        }}
    </style>
    <script>
        if (window.opener) {{
            window.opener.postMessage({payload}, '*');
            setTimeout(() => window.close(), 1500);
        }}
    </script>
</head>
<body>
    <div class="container">
        <h1>{title}</h1>
        <p>{platform}</p>
        <p class="{class}">{message}</p>
    </div>
</body>
</html>
    "#,
        title = title,
        payload = payload,
        platform = escape_html(platform),
        class = class,
        message = escape_html(message),
    );

    (status, Html(html)).into_response()
}
