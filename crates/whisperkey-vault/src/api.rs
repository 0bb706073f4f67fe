//! HTTP client for the persistence boundary.
//!
//! The boundary exposes session endpoints (`/auth/*`, `/users/*`) and
//! authenticated CRUD for credential records (`/passwords`). This module
//! owns the wire DTOs and the status-to-error mapping; it holds no state
//! beyond the connection pool and never caches tokens or records.
//!
//! The `password` field is codec-encoded on the wire in both directions.
//! Encoding happens in the vault store before a request is built here;
//! decoding happens in [`WireCredential::into_record`] immediately on
//! receipt.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use whisperkey_core::{codec, AuthTokens, CredentialRecord, Principal, ProfilePatch};

use crate::error::{Result, VaultError};

/// Default per-request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the boundary base URL.
const ENV_API_BASE: &str = "WHISPERKEY_API_BASE";

/// Client for the persistence boundary's REST surface.
///
/// Cheap to clone; the session manager and the vault store each hold
/// their own copy over the same connection pool.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    /// Create a client for the boundary rooted at `base_url`
    /// (e.g. `http://localhost:3000/api`).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(VaultError::config("base URL is required"));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| VaultError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Create a client from the `WHISPERKEY_API_BASE` environment variable.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var(ENV_API_BASE)
            .map_err(|_| VaultError::config(format!("{ENV_API_BASE} environment variable not set")))?;
        Self::new(base_url)
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Duration::from_secs(seconds);
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // -- session endpoints --------------------------------------------------

    /// Exchange credentials for a token pair.
    pub(crate) async fn login(&self, email: &str, password: &str) -> Result<AuthTokens> {
        debug!("POST /auth/login");
        let response = self
            .client
            .post(self.url("/auth/login"))
            .timeout(self.timeout)
            .json(&LoginRequest { email, password })
            .send()
            .await
            .map_err(auth_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::authentication(
                error_message(response, "login rejected").await,
            ));
        }

        let pair: TokenPairResponse = response.json().await.map_err(auth_transport_error)?;
        Ok(pair.into_tokens())
    }

    /// Create a principal and return its first token pair.
    pub(crate) async fn signup(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<AuthTokens> {
        debug!("POST /auth/signup");
        let response = self
            .client
            .post(self.url("/auth/signup"))
            .timeout(self.timeout)
            .json(&SignupRequest {
                email,
                password,
                first_name,
                last_name,
            })
            .send()
            .await
            .map_err(auth_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            // Duplicate identity comes back as a non-success status here.
            return Err(VaultError::authentication(
                error_message(response, "signup rejected").await,
            ));
        }

        let pair: TokenPairResponse = response.json().await.map_err(auth_transport_error)?;
        Ok(pair.into_tokens())
    }

    /// Exchange the refresh token for a new token pair.
    pub(crate) async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens> {
        debug!("POST /auth/refresh");
        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .timeout(self.timeout)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(auth_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(VaultError::authentication(
                error_message(response, "refresh rejected").await,
            ));
        }

        let pair: TokenPairResponse = response.json().await.map_err(auth_transport_error)?;
        Ok(pair.into_tokens())
    }

    /// Resolve the principal behind a bearer token.
    pub(crate) async fn me(&self, token: &str) -> Result<Principal> {
        debug!("GET /auth/me");
        let response = self
            .client
            .get(self.url("/auth/me"))
            .timeout(self.timeout)
            .bearer_auth(token)
            .send()
            .await?;

        let response = check_bearer_response(response, "resolving principal failed").await?;
        Ok(response.json().await?)
    }

    /// Update the principal's profile fields.
    pub(crate) async fn update_profile(&self, token: &str, patch: &ProfilePatch) -> Result<()> {
        debug!("PATCH /users/profile");
        let response = self
            .client
            .patch(self.url("/users/profile"))
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(patch)
            .send()
            .await?;

        check_bearer_response(response, "profile update failed").await?;
        Ok(())
    }

    /// Request an email change. Completes out-of-band after the new
    /// address is verified; the principal is unchanged until then.
    pub(crate) async fn update_email(&self, token: &str, email: &str) -> Result<()> {
        debug!("PATCH /users/email");
        let response = self
            .client
            .patch(self.url("/users/email"))
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(&EmailChangeRequest { email })
            .send()
            .await?;

        check_bearer_response(response, "email change failed").await?;
        Ok(())
    }

    // -- credential endpoints -----------------------------------------------

    /// Fetch all credential records owned by the current principal.
    pub(crate) async fn list_credentials(&self, token: &str) -> Result<Vec<WireCredential>> {
        debug!("GET /passwords");
        let response = self
            .client
            .get(self.url("/passwords"))
            .timeout(self.timeout)
            .bearer_auth(token)
            .send()
            .await?;

        let response = check_bearer_response(response, "listing records failed").await?;
        Ok(response.json().await?)
    }

    /// Create a credential record; the boundary assigns the id.
    pub(crate) async fn create_credential(
        &self,
        token: &str,
        request: &CreateCredentialRequest,
    ) -> Result<WireCredential> {
        debug!("POST /passwords");
        let response = self
            .client
            .post(self.url("/passwords"))
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let response = check_bearer_response(response, "creating record failed").await?;
        Ok(response.json().await?)
    }

    /// Apply a partial update and return the boundary's view of the record.
    pub(crate) async fn update_credential(
        &self,
        token: &str,
        id: &str,
        request: &UpdateCredentialRequest,
    ) -> Result<WireCredential> {
        debug!(id, "PATCH /passwords/{{id}}");
        let response = self
            .client
            .patch(self.url(&format!("/passwords/{id}")))
            .timeout(self.timeout)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let response = check_bearer_response(response, "updating record failed").await?;
        Ok(response.json().await?)
    }

    /// Delete a credential record.
    pub(crate) async fn delete_credential(&self, token: &str, id: &str) -> Result<()> {
        debug!(id, "DELETE /passwords/{{id}}");
        let response = self
            .client
            .delete(self.url(&format!("/passwords/{id}")))
            .timeout(self.timeout)
            .bearer_auth(token)
            .send()
            .await?;

        check_bearer_response(response, "deleting record failed").await?;
        Ok(())
    }
}

/// Map a non-success response on a bearer endpoint to the error taxonomy:
/// 401 means the session is no longer valid, everything else is a sync
/// failure with local state untouched.
async fn check_bearer_response(
    response: reqwest::Response,
    fallback: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(VaultError::Unauthenticated);
    }
    Err(VaultError::sync(
        Some(status.as_u16()),
        error_message(response, fallback).await,
    ))
}

/// Extract the boundary's `{"message": ...}` error body, falling back to
/// a generic message when the body is missing or malformed.
async fn error_message(response: reqwest::Response, fallback: &str) -> String {
    let status = response.status();
    response
        .json::<ErrorBody>()
        .await
        .map(|body| body.message)
        .unwrap_or_else(|_| format!("{fallback} (status {status})"))
}

/// Transport or decode failures on auth endpoints still surface as
/// authentication errors so login/signup callers see a single kind.
fn auth_transport_error(err: reqwest::Error) -> VaultError {
    VaultError::authentication(err.to_string())
}

// ---------------------------------------------------------------------------
// Wire DTOs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct EmailChangeRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPairResponse {
    access_token: String,
    refresh_token: String,
}

impl TokenPairResponse {
    fn into_tokens(self) -> AuthTokens {
        AuthTokens::new(self.access_token, self.refresh_token)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// A credential record as the boundary serializes it. The `password`
/// field is codec-encoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireCredential {
    pub id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WireCredential {
    /// Decode the wire form into the in-memory record.
    ///
    /// A stored secret that fails to decode is treated as already
    /// plaintext; the anomaly is logged but never fatal.
    pub(crate) fn into_record(self) -> CredentialRecord {
        let plaintext = codec::decode(&self.password);
        if plaintext == self.password && !self.password.is_empty() {
            warn!(id = %self.id, "stored secret was not codec-encoded; using it as plaintext");
        }
        CredentialRecord {
            id: self.id,
            title: self.title,
            username: self.username,
            secret: plaintext.into(),
            website: self.website,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Create request; `password` must already be codec-encoded and the
/// owning principal's id attached.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateCredentialRequest {
    pub title: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub user_id: String,
}

/// Partial update request; absent fields are left unchanged by the
/// boundary. `password`, when present, is codec-encoded.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateCredentialRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}
