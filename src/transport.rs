use crate::types::TokenRequest;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Raw reply from a token endpoint.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: String,
}

impl EndpointResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends form-encoded token requests to a platform.
///
/// `Err` means the request never produced an HTTP response (connect failure,
/// timeout); a non-2xx answer is still `Ok`.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn post_form(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        request: &TokenRequest,
    ) -> Result<EndpointResponse, String>;
}

#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    client: reqwest::Client,
}

impl HttpTokenEndpoint {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("streamhub-oauth/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn extra_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!("Skipping invalid token endpoint header: {}", name),
        }
    }
    map
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn post_form(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        request: &TokenRequest,
    ) -> Result<EndpointResponse, String> {
        debug!("POST {} (grant_type={})", url, request.grant_type);

        let response = self
            .client
            .post(url)
            .headers(extra_headers(headers))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(request)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;

        Ok(EndpointResponse { status, body })
    }
}
