//! Shared fixtures for the integration tests.
//!
//! The persistence boundary is played by a wiremock server; these
//! helpers build the JWTs and wire bodies it hands back.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use whisperkey_core::codec;

/// Default test principal id.
pub const USER_ID: &str = "u1";

/// Default test principal email.
pub const EMAIL: &str = "a@b.com";

/// Build an unsigned-but-shaped JWT whose payload carries the claims the
/// client inspects. The signature is never verified client-side.
pub fn jwt(user_id: &str, email: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "userId": user_id,
            "email": email,
            "exp": exp,
        })
        .to_string(),
    );
    format!("{header}.{payload}.sig")
}

/// A JWT for the default principal expiring `secs` from now (negative
/// for an already-expired token).
pub fn jwt_expiring_in(secs: i64) -> String {
    jwt(USER_ID, EMAIL, Utc::now().timestamp() + secs)
}

/// The `{accessToken, refreshToken}` body returned by the auth endpoints.
pub fn token_pair(access: &str, refresh: &str) -> Value {
    json!({
        "accessToken": access,
        "refreshToken": refresh,
    })
}

/// A credential record as the boundary serializes it: the `password`
/// field codec-encoded, timestamps fixed for byte-for-byte comparisons.
pub fn wire_record(id: &str, title: &str, username: &str, secret: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "username": username,
        "password": codec::encode(secret),
        "website": null,
        "createdAt": "2024-01-01T00:00:00Z",
        "updatedAt": "2024-01-01T00:00:00Z",
    })
}
