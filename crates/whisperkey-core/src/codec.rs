//! Reversible obfuscation for secrets at rest.
//!
//! Secrets are base64-encoded before they cross the trust boundary (the
//! wire or a local token file) and decoded immediately on receipt, so
//! persisted state never contains literal plaintext bytes.
//!
//! # This is not encryption
//!
//! The transform is deterministic and keyless: anyone who can read the
//! stored value can decode it. It only prevents secrets from appearing
//! verbatim in storage. Real confidentiality requires an authenticated
//! encryption scheme with a securely managed key, which is deliberately
//! outside this crate's contract.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Encode a plaintext secret for storage or transport.
///
/// Pure and deterministic: `decode(encode(s)) == s` for every string.
pub fn encode(plaintext: &str) -> String {
    STANDARD.encode(plaintext.as_bytes())
}

/// Decode a stored secret back to plaintext.
///
/// Malformed input never fails the caller: anything that is not valid
/// base64, or whose decoded bytes are not valid UTF-8, is treated as
/// already-plaintext and returned unchanged.
pub fn decode(token: &str) -> String {
    match STANDARD.decode(token.as_bytes()) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(plaintext) => plaintext,
            Err(_) => token.to_string(),
        },
        Err(_) => token.to_string(),
    }
}
