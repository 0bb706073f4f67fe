//! Session manager and remotely-synced credential vault.
//!
//! Three pieces cooperate here. The [`ApiClient`](api::ApiClient) speaks
//! to the persistence boundary's REST surface. The
//! [`SessionManager`](session::SessionManager) owns the access/refresh
//! token pair, derives the current principal, and refreshes expired
//! tokens transparently (coalescing concurrent refreshes). The
//! [`VaultStore`](store::VaultStore) owns the in-memory record
//! collection and keeps it in sync with the boundary across CRUD
//! operations, applying the at-rest codec at the trust boundary.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use whisperkey_vault::{ApiClient, FileTokenStore, SessionManager, VaultStore};
//!
//! let api = ApiClient::new("http://localhost:3000/api")?;
//! let tokens = Arc::new(FileTokenStore::new(config_dir.join("session.json")));
//! let session = Arc::new(SessionManager::new(api.clone(), tokens));
//!
//! session.initialize().await;
//! let vault = VaultStore::new(api, session.clone());
//! if session.is_authenticated().await {
//!     vault.list().await?;
//! }
//! ```

pub mod api;
pub mod error;
pub mod session;
pub mod store;
pub mod tokens;

pub use api::ApiClient;
pub use error::{Result, VaultError};
pub use session::{SessionEvent, SessionManager};
pub use store::{VaultEvent, VaultStore};
pub use tokens::{FileTokenStore, MemoryTokenStore, TokenStore};
