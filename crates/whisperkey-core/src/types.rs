//! Credential and session data model.
//!
//! The vault store owns the collection of [`CredentialRecord`]s; the
//! session manager owns the [`AuthTokens`] pair and the derived
//! [`Principal`]. Draft and patch types validate their input before any
//! network call is made.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secret::SecretString;

/// Rejected input, caught before any network call.
#[derive(Debug, Error)]
#[error("Validation error: {0}")]
pub struct ValidationError(pub String);

/// A credential record as held in memory.
///
/// `secret` is always the decoded plaintext; the codec-encoded form
/// exists only on the wire and in persisted state. The `id` is assigned
/// by the persistence boundary on creation and never reused.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    /// Server-assigned opaque identifier.
    pub id: String,

    /// Display label, non-empty.
    pub title: String,

    /// Account identifier, non-empty.
    pub username: String,

    /// Plaintext password. Never logged; redacted in Debug output.
    pub secret: SecretString,

    /// Optional URL or host the credential belongs to.
    pub website: Option<String>,

    /// When the record was created at the boundary.
    pub created_at: DateTime<Utc>,

    /// When the record was last updated at the boundary.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a credential record.
#[derive(Debug, Clone)]
pub struct CredentialDraft {
    /// Display label, required.
    pub title: String,

    /// Account identifier, required.
    pub username: String,

    /// Plaintext password, required.
    pub secret: SecretString,

    /// Optional URL or host.
    pub website: Option<String>,
}

impl CredentialDraft {
    /// Check the required fields are present before anything is sent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError("title must not be empty".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(ValidationError("username must not be empty".to_string()));
        }
        if self.secret.is_empty() {
            return Err(ValidationError("secret must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Partial update for an existing credential record.
///
/// `None` fields are left unchanged. The whole patch is applied by the
/// boundary or not at all; the local record is only replaced with the
/// server's response.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    /// New display label, if changing.
    pub title: Option<String>,

    /// New account identifier, if changing.
    pub username: Option<String>,

    /// New plaintext password, if changing.
    pub secret: Option<SecretString>,

    /// New URL or host, if changing.
    pub website: Option<String>,
}

impl CredentialPatch {
    /// Reject patches that would blank a required field, and patches
    /// that change nothing at all.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.is_none()
            && self.username.is_none()
            && self.secret.is_none()
            && self.website.is_none()
        {
            return Err(ValidationError("patch contains no fields".to_string()));
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(ValidationError("title must not be empty".to_string()));
        }
        if matches!(&self.username, Some(u) if u.trim().is_empty()) {
            return Err(ValidationError("username must not be empty".to_string()));
        }
        if matches!(&self.secret, Some(s) if s.is_empty()) {
            return Err(ValidationError("secret must not be empty".to_string()));
        }
        Ok(())
    }
}

/// The authenticated identity derived from the current session.
///
/// Always recomputed from the access token or the `/auth/me` endpoint,
/// never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// Opaque identifier assigned at signup.
    pub id: String,

    /// Login email.
    pub email: String,

    /// Optional given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Optional family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

/// Partial update for the principal's profile fields.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    /// New given name, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// New family name, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl ProfilePatch {
    /// Reject patches that change nothing at all.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.first_name.is_none() && self.last_name.is_none() {
            return Err(ValidationError("patch contains no fields".to_string()));
        }
        Ok(())
    }
}

/// The self-issued access/refresh token pair.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    /// Time-bounded bearer credential.
    pub access_token: SecretString,

    /// Long-lived credential used to mint a new access token.
    pub refresh_token: SecretString,
}

impl AuthTokens {
    /// Bundle a freshly issued token pair.
    pub fn new(access_token: impl Into<SecretString>, refresh_token: impl Into<SecretString>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}
