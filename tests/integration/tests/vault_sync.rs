//! Vault CRUD against a mocked persistence boundary: codec handling at
//! the trust boundary, failure non-mutation, and ordering guarantees.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use whisperkey_core::{codec, CredentialDraft, CredentialPatch, SecretString};
use whisperkey_integration_tests::{jwt_expiring_in, token_pair, wire_record, EMAIL, USER_ID};
use whisperkey_vault::{
    ApiClient, MemoryTokenStore, SessionManager, VaultError, VaultEvent, VaultStore,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount a login endpoint issuing a token with the given lifetime, then
/// log in and build a vault on top of the session.
async fn authed_vault(server: &MockServer, token_lifetime_secs: i64) -> (Arc<SessionManager>, VaultStore) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair(&jwt_expiring_in(token_lifetime_secs), "refresh-1")),
        )
        .mount(server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let session = Arc::new(SessionManager::new(
        api.clone(),
        Arc::new(MemoryTokenStore::new()),
    ));
    session.login(EMAIL, "p@ss1234").await.unwrap();

    let vault = VaultStore::new(api, session.clone());
    (session, vault)
}

fn draft(title: &str, username: &str, secret: &str) -> CredentialDraft {
    CredentialDraft {
        title: title.to_string(),
        username: username.to_string(),
        secret: SecretString::new(secret),
        website: None,
    }
}

#[tokio::test]
async fn create_then_get_returns_plaintext_secret() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;
    let mut events = vault.subscribe();

    // The wire carries the encoded secret and the owning principal's id.
    Mock::given(method("POST"))
        .and(path("/passwords"))
        .and(body_partial_json(json!({
            "password": codec::encode("p@ss1234"),
            "userId": USER_ID,
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(wire_record("rec-1", "Mail", "a@b.com", "p@ss1234")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let record = vault
        .create(draft("Mail", "a@b.com", "p@ss1234"))
        .await
        .unwrap();

    assert!(!record.id.is_empty());
    assert_eq!(record.secret.expose(), "p@ss1234");

    // The in-memory copy holds the decoded form, never the wire form.
    let fetched = vault.get("rec-1").await.unwrap();
    assert_eq!(fetched.secret.expose(), "p@ss1234");
    assert_eq!(vault.records().await.len(), 1);

    assert!(matches!(events.try_recv(), Ok(VaultEvent::Created { id }) if id == "rec-1"));
}

#[tokio::test]
async fn invalid_draft_never_reaches_the_network() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;
    let mut events = vault.subscribe();

    let requests_before = server.received_requests().await.unwrap().len();

    let err = vault.create(draft("", "a@b.com", "p@ss1234")).await.unwrap_err();
    assert!(matches!(err, VaultError::Validation(_)));
    assert!(vault.records().await.is_empty());

    assert_eq!(server.received_requests().await.unwrap().len(), requests_before);
    assert!(matches!(events.try_recv(), Ok(VaultEvent::SyncFailed { operation: "create", .. })));
}

#[tokio::test]
async fn list_replaces_the_collection_wholesale() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;

    Mock::given(method("POST"))
        .and(path("/passwords"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(wire_record("rec-9", "Old", "old@b.com", "stale")),
        )
        .mount(&server)
        .await;
    vault.create(draft("Old", "old@b.com", "stale")).await.unwrap();

    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wire_record("rec-1", "Mail", "a@b.com", "p@ss1234"),
            wire_record("rec-2", "Bank", "a@b.com", "hunter2"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let fetched = vault.list().await.unwrap();
    assert_eq!(fetched.len(), 2);

    // Replaced, not merged, and in the boundary's order.
    let ids: Vec<String> = vault.records().await.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["rec-1", "rec-2"]);
    assert!(vault.get("rec-9").await.is_none());
}

#[tokio::test]
async fn update_replaces_in_place_and_preserves_order() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;

    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wire_record("rec-1", "Mail", "a@b.com", "p@ss1234"),
            wire_record("rec-2", "Bank", "a@b.com", "hunter2"),
        ])))
        .mount(&server)
        .await;
    vault.list().await.unwrap();

    Mock::given(method("PATCH"))
        .and(path("/passwords/rec-1"))
        .and(body_partial_json(json!({"password": codec::encode("n3w-s3cret")})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(wire_record("rec-1", "Mail", "a@b.com", "n3w-s3cret")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let patch = CredentialPatch {
        secret: Some(SecretString::new("n3w-s3cret")),
        ..Default::default()
    };
    let updated = vault.update("rec-1", patch).await.unwrap();
    assert_eq!(updated.secret.expose(), "n3w-s3cret");

    let records = vault.records().await;
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["rec-1", "rec-2"]);
    assert_eq!(records[0].secret.expose(), "n3w-s3cret");
    assert_eq!(records[1].secret.expose(), "hunter2");
}

#[tokio::test]
async fn failed_update_leaves_the_record_identical() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;
    let mut events = vault.subscribe();

    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wire_record("rec-1", "Mail", "a@b.com", "p@ss1234"),
        ])))
        .mount(&server)
        .await;
    vault.list().await.unwrap();

    Mock::given(method("PATCH"))
        .and(path("/passwords/rec-1"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"message": "storage unavailable"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let before = vault.get("rec-1").await.unwrap();

    let patch = CredentialPatch {
        title: Some("Webmail".to_string()),
        secret: Some(SecretString::new("changed")),
        ..Default::default()
    };
    let err = vault.update("rec-1", patch).await.unwrap_err();
    assert!(matches!(err, VaultError::Sync { status: Some(500), .. }));
    assert!(err.is_retryable());

    let after = vault.get("rec-1").await.unwrap();
    assert_eq!(after.title, before.title);
    assert_eq!(after.username, before.username);
    assert_eq!(after.secret.expose(), before.secret.expose());
    assert_eq!(after.updated_at, before.updated_at);

    // The list() Synced event came first; the failure signal follows.
    assert!(matches!(events.try_recv(), Ok(VaultEvent::Synced { .. })));
    assert!(matches!(events.try_recv(), Ok(VaultEvent::SyncFailed { operation: "update", .. })));
}

#[tokio::test]
async fn update_of_unknown_id_fails_without_network() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;

    let requests_before = server.received_requests().await.unwrap().len();

    let patch = CredentialPatch {
        title: Some("Anything".to_string()),
        ..Default::default()
    };
    let err = vault.update("no-such-id", patch).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound(id) if id == "no-such-id"));

    assert_eq!(server.received_requests().await.unwrap().len(), requests_before);
}

#[tokio::test]
async fn delete_removes_locally_only_after_remote_success() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;

    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wire_record("rec-1", "Mail", "a@b.com", "p@ss1234"),
            wire_record("rec-2", "Bank", "a@b.com", "hunter2"),
        ])))
        .mount(&server)
        .await;
    vault.list().await.unwrap();
    let mut events = vault.subscribe();

    Mock::given(method("DELETE"))
        .and(path("/passwords/rec-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    vault.delete("rec-1").await.unwrap();

    assert!(vault.get("rec-1").await.is_none());
    let ids: Vec<String> = vault.records().await.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["rec-2"]);
    assert!(matches!(events.try_recv(), Ok(VaultEvent::Deleted { id }) if id == "rec-1"));
}

#[tokio::test]
async fn failed_delete_keeps_the_record() {
    let server = MockServer::start().await;
    let (_session, vault) = authed_vault(&server, 3600).await;

    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wire_record("rec-1", "Mail", "a@b.com", "p@ss1234"),
        ])))
        .mount(&server)
        .await;
    vault.list().await.unwrap();

    Mock::given(method("DELETE"))
        .and(path("/passwords/rec-1"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "boom"})))
        .mount(&server)
        .await;

    let err = vault.delete("rec-1").await.unwrap_err();
    assert!(matches!(err, VaultError::Sync { .. }));
    assert!(vault.get("rec-1").await.is_some());
}

#[tokio::test]
async fn delete_with_dead_session_fails_unauthenticated_and_keeps_record() {
    let server = MockServer::start().await;
    // Short-lived token: valid for the seeding list(), expired after.
    let (session, vault) = authed_vault(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wire_record("rec-1", "Mail", "a@b.com", "p@ss1234"),
        ])))
        .mount(&server)
        .await;
    vault.list().await.unwrap();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Refresh token revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Let the access token lapse, then try a protected mutation.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let err = vault.delete("rec-1").await.unwrap_err();
    assert!(matches!(err, VaultError::Unauthenticated));

    // The record survives and the session has gone anonymous.
    assert!(vault.get("rec-1").await.is_some());
    assert!(!session.is_authenticated().await);
}

#[tokio::test]
async fn concurrent_vault_operations_share_one_refresh() {
    let server = MockServer::start().await;
    // The boundary issues an already-expired access token, so the first
    // protected operations must refresh before touching /passwords.
    let (_session, vault) = authed_vault(&server, -60).await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair(&jwt_expiring_in(3600), "refresh-2"))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/passwords"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let (a, b) = tokio::join!(vault.list(), vault.list());
    assert!(a.is_ok());
    assert!(b.is_ok());
}

#[tokio::test]
async fn list_without_session_fails_fast() {
    let server = MockServer::start().await;
    let api = ApiClient::new(server.uri()).unwrap();
    let session = Arc::new(SessionManager::new(
        api.clone(),
        Arc::new(MemoryTokenStore::new()),
    ));
    let vault = VaultStore::new(api, session);

    let err = vault.list().await.unwrap_err();
    assert!(matches!(err, VaultError::Unauthenticated));
    assert!(server.received_requests().await.unwrap().is_empty());
}
