//! OAuth authorization-code + PKCE lifecycle for any number of platforms.
//!
//! Per platform: `UNCONFIGURED -> CONFIGURED -> PENDING -> AUTHENTICATED`,
//! then either `AUTHENTICATED` again after a refresh or `UNAUTHENTICATED`
//! after a failed refresh or a revoke.

use crate::{
    clock::{Clock, SystemClock},
    error::{AppError, Result},
    pkce::{generate_code_challenge, generate_code_verifier, generate_state},
    scheduler::RefreshTimers,
    store::{OAuthStore, PendingMatch},
    transport::TokenEndpoint,
    types::{
        AuthorizationRequest, PendingAuthorization, PlatformCredentials, PlatformOAuthConfig,
        PlatformStatus, TokenRecord, TokenRequest, TokenResponse,
    },
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Tokens are refreshed this many seconds before they expire.
pub const REFRESH_LEEWAY_SECS: u64 = 300;

/// Delay between issuance and the automatic refresh of a token.
pub fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_secs(expires_in.saturating_sub(REFRESH_LEEWAY_SECS))
}

fn expiry_after(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

struct Inner {
    store: OAuthStore,
    timers: RefreshTimers,
    endpoint: Arc<dyn TokenEndpoint>,
    clock: Arc<dyn Clock>,
}

/// Shared handle to the credential, pending-authorization and token stores.
///
/// Cloning is cheap; all clones see the same state.
#[derive(Clone)]
pub struct OAuthTokenManager {
    inner: Arc<Inner>,
}

enum Grant {
    AuthorizationCode,
    RefreshToken,
}

impl Grant {
    fn failure(&self, platform: &str, status: Option<u16>, body: String) -> AppError {
        match self {
            Grant::AuthorizationCode => {
                error!("Token exchange for {} failed: {:?}", platform, status);
                AppError::TokenExchange { status, body }
            }
            Grant::RefreshToken => {
                error!("Token refresh for {} failed: {:?}", platform, status);
                AppError::TokenRefresh { status, body }
            }
        }
    }
}

impl OAuthTokenManager {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self::with_clock(endpoint, Arc::new(SystemClock))
    }

    pub fn with_clock(endpoint: Arc<dyn TokenEndpoint>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: OAuthStore::new(),
                timers: RefreshTimers::new(),
                endpoint,
                clock,
            }),
        }
    }

    pub fn set_credentials(
        &self,
        platform: &str,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        redirect_uri: impl Into<String>,
    ) {
        self.inner.store.set_credentials(
            platform,
            PlatformCredentials {
                client_id: client_id.into(),
                client_secret,
                redirect_uri: redirect_uri.into(),
            },
        );
    }

    fn require_credentials(&self, platform: &str) -> Result<PlatformCredentials> {
        self.inner
            .store
            .get_credentials(platform)
            .ok_or_else(|| AppError::Configuration(platform.to_string()))
    }

    /// Begin a new authorization and return the URL to open in the consent popup.
    ///
    /// Replaces any authorization already in flight for the platform. Does no I/O.
    pub fn start_authorization(
        &self,
        platform: &str,
        config: &PlatformOAuthConfig,
    ) -> Result<String> {
        Ok(self
            .authorization_request(platform, config)?
            .authorization_url)
    }

    /// Like [`start_authorization`](Self::start_authorization), also returning the `state`.
    pub fn authorization_request(
        &self,
        platform: &str,
        config: &PlatformOAuthConfig,
    ) -> Result<AuthorizationRequest> {
        let credentials = self.require_credentials(platform)?;

        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        let scope = config.scopes.join(" ");
        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("redirect_uri", credentials.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state.as_str()),
            ("code_challenge", code_challenge.as_str()),
            ("code_challenge_method", "S256"),
        ];

        let mut url = Url::parse(&config.auth_url).map_err(|e| {
            AppError::Configuration(format!("{} (invalid authorization URL: {})", platform, e))
        })?;
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{}&{}", existing, query),
            _ => query,
        };
        url.set_query(Some(&query));

        self.inner.store.store_pending(
            platform,
            PendingAuthorization {
                state: state.clone(),
                code_verifier,
                created_at: self.inner.clock.now(),
            },
        );

        info!("Started authorization for {}", platform);
        Ok(AuthorizationRequest {
            authorization_url: url.into(),
            state,
        })
    }

    /// Exchange the callback's `code` for tokens.
    ///
    /// A matching `state` consumes the pending authorization, whatever happens next.
    pub async fn complete_authorization(
        &self,
        platform: &str,
        code: &str,
        state: &str,
        config: &PlatformOAuthConfig,
    ) -> Result<TokenRecord> {
        let pending = match self.inner.store.take_matching_pending(platform, state) {
            PendingMatch::Matched(pending) => pending,
            PendingMatch::Missing => return Err(AppError::MissingVerifier(platform.to_string())),
            PendingMatch::Mismatched { created_at } => {
                warn!(
                    "Rejected callback for {}: state mismatch (authorization started {}s ago)",
                    platform,
                    (self.inner.clock.now() - created_at).num_seconds()
                );
                return Err(AppError::StateMismatch(platform.to_string()));
            }
        };

        let credentials = self.require_credentials(platform)?;

        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            code: Some(code.to_string()),
            redirect_uri: Some(credentials.redirect_uri),
            code_verifier: Some(pending.code_verifier),
            refresh_token: None,
        };

        let response = self
            .request_tokens(platform, config, &request, Grant::AuthorizationCode)
            .await?;
        let expires_in = response.expires_in;
        let record = self.build_record(platform, response, None);
        self.inner.store.store_token(platform, record.clone());
        self.arm_refresh(platform, &record, expires_in, config);

        info!(
            "Authorized {} ({}s after the authorization started)",
            platform,
            (self.inner.clock.now() - pending.created_at).num_seconds()
        );
        Ok(record)
    }

    /// Current access token, if one is stored and has not expired.
    pub fn get_access_token(&self, platform: &str) -> Option<String> {
        let now = self.inner.clock.now();
        self.inner
            .store
            .get_token(platform)
            .filter(|record| record.is_valid_at(now))
            .map(|record| record.access_token)
    }

    pub fn is_authenticated(&self, platform: &str) -> bool {
        self.get_access_token(platform).is_some()
    }

    /// Forget the platform's tokens and stop refreshing them. Safe to repeat.
    pub fn revoke(&self, platform: &str) {
        let had_token = self.inner.store.remove_token(platform).is_some();
        self.inner.timers.cancel(platform);
        self.inner.store.take_pending(platform);
        if had_token {
            info!("Revoked tokens for {}", platform);
        }
    }

    /// Trade the stored refresh token for a new access token.
    ///
    /// On failure the stored tokens are dropped and no retry is scheduled.
    /// A response that arrives after the tokens were revoked or replaced is
    /// discarded.
    pub async fn refresh(
        &self,
        platform: &str,
        config: &PlatformOAuthConfig,
    ) -> Result<TokenRecord> {
        let current = self
            .inner
            .store
            .get_token(platform)
            .ok_or_else(|| AppError::NoRefreshToken(platform.to_string()))?;
        let refresh_token = current
            .refresh_token
            .clone()
            .ok_or_else(|| AppError::NoRefreshToken(platform.to_string()))?;

        let credentials = self.require_credentials(platform)?;

        let request = TokenRequest {
            grant_type: "refresh_token".to_string(),
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: Some(refresh_token.clone()),
        };

        match self
            .request_tokens(platform, config, &request, Grant::RefreshToken)
            .await
        {
            Ok(response) => {
                let expires_in = response.expires_in;
                let record = self.build_record(platform, response, Some(&current));
                if !self
                    .inner
                    .store
                    .replace_token_if(platform, &refresh_token, record.clone())
                {
                    info!("Discarded refresh for {}: tokens were revoked or replaced", platform);
                    return Err(AppError::NoRefreshToken(platform.to_string()));
                }
                self.arm_refresh(platform, &record, expires_in, config);
                info!("Refreshed tokens for {}", platform);
                Ok(record)
            }
            Err(e) => {
                if self.inner.store.remove_token_if(platform, &refresh_token) {
                    self.inner.timers.cancel(platform);
                }
                Err(e)
            }
        }
    }

    pub fn status(&self, platform: &str) -> PlatformStatus {
        let now = self.inner.clock.now();
        let token = self.inner.store.get_token(platform);
        PlatformStatus {
            platform: platform.to_string(),
            configured: self.inner.store.get_credentials(platform).is_some(),
            pending: self.inner.store.get_pending(platform).is_some(),
            authenticated: token.as_ref().is_some_and(|record| record.is_valid_at(now)),
            expires_at: token.map(|record| record.expires_at),
            refresh_scheduled: self.inner.timers.is_scheduled(platform),
        }
    }

    /// Time left until the platform's automatic refresh fires.
    pub fn refresh_due_in(&self, platform: &str) -> Option<Duration> {
        self.inner.timers.due_in(platform)
    }

    async fn request_tokens(
        &self,
        platform: &str,
        config: &PlatformOAuthConfig,
        request: &TokenRequest,
        grant: Grant,
    ) -> Result<TokenResponse> {
        debug!("Requesting tokens for {} at {}", platform, config.token_url);

        let response = self
            .inner
            .endpoint
            .post_form(&config.token_url, &config.headers, request)
            .await
            .map_err(|e| grant.failure(platform, None, e))?;

        if !response.is_success() {
            return Err(grant.failure(platform, Some(response.status), response.body));
        }

        serde_json::from_str(&response.body).map_err(|e| {
            grant.failure(
                platform,
                Some(response.status),
                format!("Failed to parse token response: {}", e),
            )
        })
    }

    fn build_record(
        &self,
        platform: &str,
        response: TokenResponse,
        previous: Option<&TokenRecord>,
    ) -> TokenRecord {
        if !response.extra.is_empty() {
            let fields: Vec<&String> = response.extra.keys().collect();
            debug!("Token response for {} carried extra fields {:?}", platform, fields);
        }

        TokenRecord {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous.and_then(|p| p.refresh_token.clone())),
            token_type: response.token_type,
            scope: response
                .scope
                .or_else(|| previous.and_then(|p| p.scope.clone())),
            expires_at: expiry_after(self.inner.clock.now(), response.expires_in),
        }
    }

    fn arm_refresh(
        &self,
        platform: &str,
        record: &TokenRecord,
        expires_in: u64,
        config: &PlatformOAuthConfig,
    ) {
        if record.refresh_token.is_some() {
            self.schedule_refresh(platform, expires_in, config);
        } else {
            self.inner.timers.cancel(platform);
            debug!("No refresh token for {}, not scheduling refresh", platform);
        }
    }

    fn schedule_refresh(&self, platform: &str, expires_in: u64, config: &PlatformOAuthConfig) {
        let delay = refresh_delay(expires_in);
        let manager = Arc::downgrade(&self.inner);
        let platform_id = platform.to_string();
        let config = config.clone();

        self.inner.timers.schedule(platform, delay, async move {
            let Some(inner) = manager.upgrade() else {
                return;
            };
            let manager = OAuthTokenManager { inner };
            if let Err(e) = manager.refresh(&platform_id, &config).await {
                warn!(
                    "Scheduled refresh for {} failed, platform is now unauthenticated: {}",
                    platform_id, e
                );
            }
        });

        debug!("Refresh for {} scheduled in {:?}", platform, delay);
    }
}
