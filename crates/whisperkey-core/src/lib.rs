//! Core types and utilities for WhisperKey.
//!
//! This crate is the leaf of the workspace: the credential data model,
//! the zero-on-drop plaintext wrapper, and the reversible codec applied
//! to secrets before they leave process memory. It performs no I/O.

pub mod codec;
pub mod secret;
pub mod types;

pub use secret::SecretString;
pub use types::{
    AuthTokens, CredentialDraft, CredentialPatch, CredentialRecord, Principal, ProfilePatch,
    ValidationError,
};
