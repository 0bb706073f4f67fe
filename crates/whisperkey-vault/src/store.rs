//! The in-memory credential collection, kept in sync with the boundary.
//!
//! The store exclusively owns the ordered record collection. Every
//! operation first obtains a currently-valid access token from the
//! session manager (failing fast with `Unauthenticated`), applies the
//! codec at the trust boundary, and folds the server's response back
//! into local state. A failed call never leaves a partial local effect:
//! records are only appended, replaced, or removed after the boundary
//! has confirmed the mutation.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use whisperkey_core::{codec, CredentialDraft, CredentialPatch, CredentialRecord};

use crate::api::{ApiClient, CreateCredentialRequest, UpdateCredentialRequest};
use crate::error::{Result, VaultError};
use crate::session::SessionManager;

/// Outcome signals emitted by the store, distinct from the returned
/// `Result`, so a UI can react to mutations it did not itself await.
/// Sends with no live receivers are harmless no-ops.
#[derive(Debug, Clone)]
pub enum VaultEvent {
    /// The collection was replaced wholesale by a `list()`.
    Synced { count: usize },

    /// A record was created and appended.
    Created { id: String },

    /// A record was replaced in place.
    Updated { id: String },

    /// A record was removed locally after remote success.
    Deleted { id: String },

    /// An operation failed; local state is exactly as it was before.
    SyncFailed {
        operation: &'static str,
        message: String,
    },
}

/// The remotely-synced credential vault.
pub struct VaultStore {
    api: ApiClient,
    session: Arc<SessionManager>,
    records: RwLock<Vec<CredentialRecord>>,
    events: broadcast::Sender<VaultEvent>,
}

impl VaultStore {
    /// Create an empty vault bound to a session.
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            api,
            session,
            records: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Subscribe to vault outcome signals.
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    /// Fetch all records for the current principal and replace the
    /// in-memory collection wholesale, preserving the boundary's order.
    pub async fn list(&self) -> Result<Vec<CredentialRecord>> {
        let token = self.session.ensure_valid().await.map_err(|e| self.fail("list", e))?;

        let wire = self
            .api
            .list_credentials(token.expose())
            .await
            .map_err(|e| self.fail("list", e))?;

        let fetched: Vec<CredentialRecord> = wire.into_iter().map(|w| w.into_record()).collect();
        debug!(count = fetched.len(), "replaced vault contents");

        *self.records.write().await = fetched.clone();
        let _ = self.events.send(VaultEvent::Synced {
            count: fetched.len(),
        });
        Ok(fetched)
    }

    /// Create a record. Validation failures never reach the network; on
    /// success the server-returned record is appended.
    pub async fn create(&self, draft: CredentialDraft) -> Result<CredentialRecord> {
        if let Err(e) = draft.validate() {
            return Err(self.fail("create", e.into()));
        }

        let token = self.session.ensure_valid().await.map_err(|e| self.fail("create", e))?;
        let owner = self
            .session
            .principal()
            .await
            .ok_or_else(|| self.fail("create", VaultError::Unauthenticated))?;

        let request = CreateCredentialRequest {
            title: draft.title,
            username: draft.username,
            password: codec::encode(draft.secret.expose()),
            website: draft.website,
            user_id: owner.id,
        };

        let wire = self
            .api
            .create_credential(token.expose(), &request)
            .await
            .map_err(|e| self.fail("create", e))?;

        let record = wire.into_record();
        debug!(id = %record.id, "created record");

        self.records.write().await.push(record.clone());
        let _ = self.events.send(VaultEvent::Created {
            id: record.id.clone(),
        });
        Ok(record)
    }

    /// Apply a partial update to an existing record. The local record is
    /// swapped for the server's response only after the boundary accepts
    /// the whole patch; a failed call leaves it byte-for-byte unchanged.
    pub async fn update(&self, id: &str, patch: CredentialPatch) -> Result<CredentialRecord> {
        if let Err(e) = patch.validate() {
            return Err(self.fail("update", e.into()));
        }
        if !self.contains(id).await {
            return Err(self.fail("update", VaultError::not_found(id)));
        }

        let token = self.session.ensure_valid().await.map_err(|e| self.fail("update", e))?;

        let request = UpdateCredentialRequest {
            title: patch.title,
            username: patch.username,
            password: patch.secret.as_ref().map(|s| codec::encode(s.expose())),
            website: patch.website,
        };

        let wire = self
            .api
            .update_credential(token.expose(), id, &request)
            .await
            .map_err(|e| self.fail("update", e))?;

        let record = wire.into_record();
        debug!(id = %record.id, "updated record");

        // Replace in place to preserve relative order. If the record was
        // removed while the call was in flight, dropping the response is
        // the harmless outcome.
        let mut records = self.records.write().await;
        if let Some(slot) = records.iter_mut().find(|r| r.id == id) {
            *slot = record.clone();
        }
        drop(records);

        let _ = self.events.send(VaultEvent::Updated {
            id: record.id.clone(),
        });
        Ok(record)
    }

    /// Delete a record at the boundary, then remove it locally. On
    /// failure the record stays in the collection.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let token = self.session.ensure_valid().await.map_err(|e| self.fail("delete", e))?;

        self.api
            .delete_credential(token.expose(), id)
            .await
            .map_err(|e| self.fail("delete", e))?;

        debug!(id, "deleted record");
        self.records.write().await.retain(|r| r.id != id);
        let _ = self.events.send(VaultEvent::Deleted { id: id.to_string() });
        Ok(())
    }

    /// Pure local lookup; no network.
    pub async fn get(&self, id: &str) -> Option<CredentialRecord> {
        self.records.read().await.iter().find(|r| r.id == id).cloned()
    }

    /// Snapshot of the collection in insertion order.
    pub async fn records(&self) -> Vec<CredentialRecord> {
        self.records.read().await.clone()
    }

    async fn contains(&self, id: &str) -> bool {
        self.records.read().await.iter().any(|r| r.id == id)
    }

    /// Emit the failure signal and hand the error back for propagation.
    fn fail(&self, operation: &'static str, err: VaultError) -> VaultError {
        let _ = self.events.send(VaultEvent::SyncFailed {
            operation,
            message: err.to_string(),
        });
        err
    }
}
