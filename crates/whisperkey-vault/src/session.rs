//! Session lifecycle: the token pair, the derived principal, and
//! transparent refresh.
//!
//! The manager moves through `uninitialized → loading → {authenticated,
//! anonymous}`; an authenticated session returns to anonymous only via
//! [`SessionManager::logout`] or an unrecoverable refresh failure. The
//! access token's expiry is inspected locally (its JWT payload carries
//! an `exp` claim) and evaluated at the moment of use, never cached.
//!
//! Refresh is coalesced behind a single gate: when several operations
//! hit an expired token concurrently, exactly one network refresh runs
//! and every waiter proceeds with its outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, warn};
use whisperkey_core::{AuthTokens, Principal, ProfilePatch, SecretString};

use crate::api::ApiClient;
use crate::error::{Result, VaultError};
use crate::tokens::TokenStore;

/// Observable session transitions, broadcast so the owner of the vault
/// can trigger work (such as the initial record fetch) explicitly
/// instead of from a framework lifecycle hook.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session became usable: login, signup, or a resumed session.
    Ready(Principal),

    /// The session was destroyed by logout or an unrecoverable refresh
    /// failure.
    SignedOut,
}

/// The single owner of the token pair and the derived principal.
struct SessionState {
    tokens: AuthTokens,
    principal: Principal,
}

/// Manages the access/refresh token pair for one principal.
pub struct SessionManager {
    api: ApiClient,
    token_store: Arc<dyn TokenStore>,
    state: RwLock<Option<SessionState>>,
    loaded: AtomicBool,
    /// Serializes refresh attempts so concurrent callers coalesce.
    refresh_gate: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Create a manager in the uninitialized state.
    pub fn new(api: ApiClient, token_store: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            api,
            token_store,
            state: RwLock::new(None),
            loaded: AtomicBool::new(false),
            refresh_gate: Mutex::new(()),
            events,
        }
    }

    /// Subscribe to session transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether [`initialize`](Self::initialize) has completed. Flips to
    /// true exactly once, regardless of whether a session was resumed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// The current principal, present iff an unexpired access token is
    /// held right now.
    pub async fn principal(&self) -> Option<Principal> {
        let state = self.state.read().await;
        let state = state.as_ref()?;
        let claims = decode_claims(state.tokens.access_token.expose())?;
        if claims.is_expired() {
            return None;
        }
        Some(state.principal.clone())
    }

    /// Whether a currently-valid session exists.
    pub async fn is_authenticated(&self) -> bool {
        self.principal().await.is_some()
    }

    /// Resume a previously persisted session, if one exists and is still
    /// usable (directly, or through a single refresh). Always terminates
    /// by marking the manager loaded.
    pub async fn initialize(&self) {
        match self.token_store.load().await {
            Ok(Some(tokens)) => self.resume(tokens).await,
            Ok(None) => debug!("no stored session"),
            Err(e) => warn!("could not read stored session: {e}"),
        }
        self.loaded.store(true, Ordering::SeqCst);
    }

    async fn resume(&self, tokens: AuthTokens) {
        let usable = decode_claims(tokens.access_token.expose())
            .map(|claims| !claims.is_expired())
            .unwrap_or(false);

        if usable {
            match self.install(tokens).await {
                Ok(principal) => {
                    debug!("resumed stored session");
                    let _ = self.events.send(SessionEvent::Ready(principal));
                }
                Err(e) => warn!("stored session could not be resumed: {e}"),
            }
            return;
        }

        // Expired (or unreadable) access token: one refresh attempt,
        // then give up and drop the stored pair.
        let refresh_token = tokens.refresh_token.expose().to_string();
        match self.api.refresh(&refresh_token).await {
            Ok(fresh) => match self.install(fresh).await {
                Ok(principal) => {
                    debug!("resumed stored session via refresh");
                    let _ = self.events.send(SessionEvent::Ready(principal));
                }
                Err(e) => {
                    warn!("refreshed session could not be resumed: {e}");
                    self.clear_session().await;
                }
            },
            Err(e) => {
                debug!("stored session could not be refreshed: {e}");
                self.clear_session().await;
            }
        }
    }

    /// Exchange credentials for a session. On failure the current state
    /// is left unchanged.
    pub async fn login(&self, email: &str, password: &str) -> Result<Principal> {
        let tokens = self.api.login(email, password).await?;
        let principal = self.install(tokens).await?;
        let _ = self.events.send(SessionEvent::Ready(principal.clone()));
        Ok(principal)
    }

    /// Register a new principal and start its first session. Rejected if
    /// the boundary reports the identity already exists.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<Principal> {
        let tokens = self.api.signup(email, password, first_name, last_name).await?;
        let principal = self.install(tokens).await?;
        let _ = self.events.send(SessionEvent::Ready(principal.clone()));
        Ok(principal)
    }

    /// Destroy the session: clear the principal and both tokens. Never
    /// calls the network; always succeeds.
    pub async fn logout(&self) {
        self.clear_session().await;
    }

    /// Exchange the refresh token for a new access token. On failure the
    /// caller should treat the session as logged out rather than retry.
    pub async fn refresh(&self) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await.map(|_| ())
    }

    /// Produce an access token that is valid right now, refreshing at
    /// most once. On refresh failure the session transitions to
    /// anonymous and the triggering operation fails `Unauthenticated`.
    pub async fn ensure_valid(&self) -> Result<SecretString> {
        if let Some(token) = self.current_valid_token().await {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited on the gate.
        if let Some(token) = self.current_valid_token().await {
            return Ok(token);
        }

        match self.refresh_locked().await {
            Ok(()) => self
                .current_valid_token()
                .await
                .ok_or(VaultError::Unauthenticated),
            Err(e) => {
                debug!("token refresh failed: {e}");
                self.clear_session().await;
                Err(VaultError::Unauthenticated)
            }
        }
    }

    /// Update profile fields at the boundary, then recompute the
    /// principal from `/auth/me`: it is derived, never hand-edited.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<Principal> {
        patch.validate()?;
        let token = self.ensure_valid().await?;
        self.api.update_profile(token.expose(), patch).await?;

        let principal = self.api.me(token.expose()).await?;
        if let Some(state) = self.state.write().await.as_mut() {
            state.principal = principal.clone();
        }
        Ok(principal)
    }

    /// Request an email change. The principal keeps its current email
    /// until the new address is verified out-of-band.
    pub async fn update_email(&self, email: &str) -> Result<()> {
        if email.trim().is_empty() {
            return Err(VaultError::Validation("email must not be empty".to_string()));
        }
        let token = self.ensure_valid().await?;
        self.api.update_email(token.expose(), email).await
    }

    /// Adopt a freshly issued token pair: derive the principal, persist
    /// the pair, swap the state.
    async fn install(&self, tokens: AuthTokens) -> Result<Principal> {
        let claims = decode_claims(tokens.access_token.expose())
            .ok_or_else(|| VaultError::authentication("boundary issued a malformed access token"))?;
        let principal = claims.into_principal();

        if let Err(e) = self.token_store.save(&tokens).await {
            // A session that cannot be persisted still works for this
            // process; it just will not survive a restart.
            warn!("could not persist session tokens: {e}");
        }

        *self.state.write().await = Some(SessionState {
            tokens,
            principal: principal.clone(),
        });
        Ok(principal)
    }

    /// Must be called with the refresh gate held (or from `resume`,
    /// where no other caller can race yet).
    async fn refresh_locked(&self) -> Result<()> {
        let refresh_token = {
            let state = self.state.read().await;
            state
                .as_ref()
                .map(|s| s.tokens.refresh_token.expose().to_string())
        }
        .ok_or(VaultError::Unauthenticated)?;

        let fresh = self.api.refresh(&refresh_token).await?;
        self.install(fresh).await?;
        Ok(())
    }

    async fn current_valid_token(&self) -> Option<SecretString> {
        let state = self.state.read().await;
        let state = state.as_ref()?;
        let claims = decode_claims(state.tokens.access_token.expose())?;
        (!claims.is_expired()).then(|| state.tokens.access_token.clone())
    }

    async fn clear_session(&self) {
        let had_session = self.state.write().await.take().is_some();
        if let Err(e) = self.token_store.clear().await {
            warn!("could not clear stored session tokens: {e}");
        }
        if had_session {
            let _ = self.events.send(SessionEvent::SignedOut);
        }
    }
}

/// Claims carried in the access token's JWT payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenClaims {
    user_id: String,
    email: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    /// Expiry instant, seconds since the Unix epoch.
    exp: i64,
}

impl TokenClaims {
    /// Expired means now >= exp, evaluated at the moment of use.
    fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }

    fn into_principal(self) -> Principal {
        Principal {
            id: self.user_id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
/// Verification belongs to the boundary; the client only reads the
/// claims it was handed.
fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    serde_json::from_slice(&bytes).ok()
}
