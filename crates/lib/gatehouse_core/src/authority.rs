//! Remote authority client — key list, token and user records over HTTP.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, header::AUTHORIZATION};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::auth::AuthError;
use crate::config::AuthConfig;
use crate::models::auth::{Token, User};

/// Upper bound on an authority response body: 1 MiB.
const MAX_BODY_BYTES: usize = 1 << 20;

/// One entry of the authority's `/keys` response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPublicKey {
    pub name: String,
    pub hash: String,
    /// Base64 (standard alphabet) of the DER SubjectPublicKeyInfo.
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
struct KeyList {
    #[serde(default)]
    results: Vec<Option<RawPublicKey>>,
}

/// Error body returned by the authority on non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct RemoteErrors {
    #[serde(default)]
    pub errors: Vec<RemoteErrorItem>,
    #[serde(default)]
    pub status_code: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RemoteErrorItem {
    #[serde(default)]
    pub message: String,
}

impl RemoteErrors {
    /// Messages joined the way the authority's clients display them.
    pub fn message(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Source of keys and records. `Ok(None)` means the authority does not know
/// the record.
#[async_trait]
pub trait Authority: Send + Sync {
    /// `GET {authOrigin}/keys`.
    async fn fetch_keys(&self) -> Result<Vec<Option<RawPublicKey>>, AuthError>;

    /// `GET {userOrigin}/me/token/me/` on behalf of `credential`.
    async fn fetch_token(&self, credential: &str) -> Result<Option<Token>, AuthError>;

    /// `GET {userOrigin}/{id}/`.
    async fn fetch_user(&self, id: &str) -> Result<Option<User>, AuthError>;
}

/// [`Authority`] backed by `reqwest`.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    auth_origin: String,
    user_origin: String,
}

impl HttpAuthority {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::UpstreamUnavailable {
                message: format!("http client: {e}"),
                status: None,
            })?;
        Ok(Self::with_client(client, config))
    }

    /// Use a preconfigured client, e.g. one carrying client credentials.
    pub fn with_client(client: Client, config: &AuthConfig) -> Self {
        Self {
            client,
            auth_origin: config.auth_origin.clone(),
            user_origin: config.user_origin.clone(),
        }
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn fetch_keys(&self) -> Result<Vec<Option<RawPublicKey>>, AuthError> {
        let url = format!("{}/keys", self.auth_origin);
        let resp = self.client.get(&url).send().await.map_err(transport_error)?;
        let status = resp.status();
        let body = read_body(resp).await?;
        debug!(status = status.as_u16(), body = %String::from_utf8_lossy(&body), "key fetch response");

        if !status.is_success() {
            return Err(AuthError::KeyRefreshFailed(format!(
                "key request returned HTTP {status}"
            )));
        }
        let list: KeyList = serde_json::from_slice(&body)
            .map_err(|e| AuthError::KeyRefreshFailed(format!("key list: {e}")))?;
        Ok(list.results)
    }

    async fn fetch_token(&self, credential: &str) -> Result<Option<Token>, AuthError> {
        let url = format!("{}/me/token/me/", self.user_origin);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {credential}"))
            .send()
            .await
            .map_err(transport_error)?;
        decode_record(resp, "token").await
    }

    async fn fetch_user(&self, id: &str) -> Result<Option<User>, AuthError> {
        let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
        let url = format!("{}/{}/", self.user_origin, encoded);
        let resp = self.client.get(&url).send().await.map_err(transport_error)?;
        decode_record(resp, "user").await
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    if e.is_timeout() {
        AuthError::UpstreamTimeout
    } else {
        AuthError::UpstreamUnavailable {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Read at most [`MAX_BODY_BYTES`] of `resp`, failing as soon as the body
/// grows past the cap.
pub(crate) async fn read_body(mut resp: Response) -> Result<Vec<u8>, AuthError> {
    if resp
        .content_length()
        .is_some_and(|len| len > MAX_BODY_BYTES as u64)
    {
        return Err(body_too_large());
    }
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await.map_err(transport_error)? {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(body_too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn body_too_large() -> AuthError {
    AuthError::UpstreamUnavailable {
        message: format!("response body exceeds {MAX_BODY_BYTES} bytes"),
        status: None,
    }
}

/// Decode a record response. A 404 (by HTTP status or by the error body's
/// `status_code`) is `Ok(None)`.
async fn decode_record<T: DeserializeOwned>(
    resp: Response,
    kind: &'static str,
) -> Result<Option<T>, AuthError> {
    let status = resp.status();
    let body = read_body(resp).await?;
    debug!(kind, status = status.as_u16(), body = %String::from_utf8_lossy(&body), "record fetch response");

    if status.is_success() {
        return serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| AuthError::UpstreamUnavailable {
                message: format!("{kind} response parse error: {e}"),
                status: Some(status.as_u16()),
            });
    }

    let remote: RemoteErrors = serde_json::from_slice(&body).unwrap_or_default();
    let remote_status = remote.status_code.unwrap_or(status.as_u16());
    if remote_status == StatusCode::NOT_FOUND.as_u16() {
        return Ok(None);
    }
    let message = match remote.message() {
        m if m.is_empty() => format!("{kind} request returned HTTP {status}"),
        m => m,
    };
    Err(AuthError::UpstreamUnavailable {
        message,
        status: Some(remote_status),
    })
}
