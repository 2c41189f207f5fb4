use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

/// Credentials and endpoint overrides for one platform, read from `<PLATFORM>_*` variables.
#[derive(Debug, Clone, Default)]
pub struct PlatformSettings {
    pub id: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub public_url: String,
    pub token_request_timeout: Duration,
    pub platforms: Vec<PlatformSettings>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

impl PlatformSettings {
    fn from_env(id: &str) -> Self {
        let prefix = id.to_ascii_uppercase();
        Self {
            id: id.to_string(),
            client_id: env_var(&format!("{}_CLIENT_ID", prefix)),
            client_secret: env_var(&format!("{}_CLIENT_SECRET", prefix)),
            redirect_uri: env_var(&format!("{}_REDIRECT_URI", prefix)),
            auth_url: env_var(&format!("{}_AUTH_URL", prefix)),
            token_url: env_var(&format!("{}_TOKEN_URL", prefix)),
        }
    }
}

impl Config {
    pub fn from_env<'a>(platform_ids: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4000".to_string())
            .parse()
            .context("Invalid PORT")?;

        let public_url = env_var("PUBLIC_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port))
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_url).context("Invalid PUBLIC_URL")?;

        let timeout_secs: u64 = std::env::var("TOKEN_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("Invalid TOKEN_REQUEST_TIMEOUT_SECS")?;

        Ok(Self {
            port,
            public_url,
            token_request_timeout: Duration::from_secs(timeout_secs),
            platforms: platform_ids
                .into_iter()
                .map(PlatformSettings::from_env)
                .collect(),
        })
    }

    pub fn server_address(&self) -> SocketAddr {
        ([0, 0, 0, 0], self.port).into()
    }

    /// Where a platform redirects after consent unless its credentials say otherwise.
    pub fn default_redirect_uri(&self, platform: &str) -> String {
        format!("{}/oauth/callback/{}", self.public_url, platform)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            public_url: "http://localhost:4000".to_string(),
            token_request_timeout: Duration::from_secs(30),
            platforms: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_redirect_uri() {
        let config = Config {
            public_url: "https://dash.example.com".into(),
            ..Config::default()
        };
        assert_eq!(
            config.default_redirect_uri("twitch"),
            "https://dash.example.com/oauth/callback/twitch"
        );
    }

    #[test]
    fn test_server_address() {
        let config = Config {
            port: 8123,
            ..Config::default()
        };
        assert_eq!(config.server_address().port(), 8123);
    }
}
