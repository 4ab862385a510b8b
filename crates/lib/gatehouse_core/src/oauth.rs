//! OAuth2 client-credentials grant against the authority.
//!
//! Lets this service call the authority on its own behalf: request a token
//! with [`ClientCredentials::request_token`], or get a ready-made client that
//! sends it with [`ClientCredentials::authorized_client`].

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Deserialize;
use tracing::debug;

use crate::auth::AuthError;
use crate::authority::{RemoteErrors, read_body};
use crate::config::AuthConfig;

/// Response of the authority's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientToken {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Client id and secret of this service plus the token endpoint.
#[derive(Clone)]
pub struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ClientCredentials {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            token_url: format!("{}/token", config.auth_origin),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            timeout: config.request_timeout,
        }
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Run the client-credentials grant for `scopes`.
    pub async fn request_token(&self, scopes: &[&str]) -> Result<ClientToken, AuthError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AuthError::UpstreamUnavailable {
                message: format!("http client: {e}"),
                status: None,
            })?;

        let scope = scopes.join(" ");
        let mut params = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        let resp = client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AuthError::UpstreamTimeout
                } else {
                    AuthError::UpstreamUnavailable {
                        message: format!("token request failed: {e}"),
                        status: None,
                    }
                }
            })?;

        let status = resp.status();
        let body = read_body(resp).await?;
        if !status.is_success() {
            let remote: RemoteErrors = serde_json::from_slice(&body).unwrap_or_default();
            let message = match remote.message() {
                m if m.is_empty() => format!("token request returned HTTP {status}"),
                m => m,
            };
            return Err(AuthError::UpstreamUnavailable {
                message,
                status: Some(status.as_u16()),
            });
        }

        let token: ClientToken =
            serde_json::from_slice(&body).map_err(|e| AuthError::UpstreamUnavailable {
                message: format!("token response parse error: {e}"),
                status: Some(status.as_u16()),
            })?;
        debug!(client_id = %self.client_id, scope = ?token.scope, "client token acquired");
        Ok(token)
    }

    /// A client that sends a freshly acquired bearer token with every
    /// request. The token is not refreshed; build a new client once it
    /// expires.
    pub async fn authorized_client(&self, scopes: &[&str]) -> Result<Client, AuthError> {
        let token = self.request_token(scopes).await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|e| AuthError::UpstreamUnavailable {
                message: format!("unusable access token: {e}"),
                status: None,
            })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AuthError::UpstreamUnavailable {
                message: format!("http client: {e}"),
                status: None,
            })
    }
}
