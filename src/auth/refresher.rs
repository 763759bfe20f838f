use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::credential_store::CredentialStore;
use crate::client::AuthenticatedClient;
use crate::error::RefreshFailure;
use crate::models::AccessCredential;

pub const REFRESH_PATH: &str = "/auth/refresh";

type RefreshFlight = Shared<BoxFuture<'static, Result<AccessCredential, RefreshFailure>>>;

#[derive(Deserialize)]
struct RefreshPayload {
    access_token: Option<String>,
}

/// Exchanges the session cookie for a fresh access credential.
///
/// Concurrent callers share one exchange: whoever arrives while a refresh
/// is in flight awaits that same result instead of issuing another call.
/// The shared exchange is retired once it resolves or once its last waiter
/// is dropped, so an abandoned exchange is never resumed later.
pub struct CredentialRefresher {
    http: reqwest::Client,
    url: String,
    store: Arc<CredentialStore>,
    slot: Mutex<FlightSlot>,
    exchanges: Arc<AtomicU64>,
}

#[derive(Default)]
struct FlightSlot {
    next_id: u64,
    current: Option<InFlight>,
}

struct InFlight {
    id: u64,
    flight: RefreshFlight,
    waiters: usize,
}

/// Registered for the duration of one `refresh` call.
struct Waiter<'a> {
    refresher: &'a CredentialRefresher,
    id: u64,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.refresher.leave(self.id);
    }
}

impl CredentialRefresher {
    /// Shares the client's cookie jar, which carries the session cookie.
    pub fn new(client: &AuthenticatedClient) -> Self {
        Self {
            http: client.http().clone(),
            url: client.endpoint(REFRESH_PATH),
            store: client.credentials().clone(),
            slot: Mutex::new(FlightSlot::default()),
            exchanges: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of refresh exchanges actually sent to the backend.
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub async fn refresh(&self) -> Result<AccessCredential, RefreshFailure> {
        let (id, flight) = self.join_or_start();
        let _waiter = Waiter { refresher: self, id };
        flight.await
    }

    fn lock_slot(&self) -> MutexGuard<'_, FlightSlot> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn join_or_start(&self) -> (u64, RefreshFlight) {
        let mut slot = self.lock_slot();
        if let Some(current) = slot.current.as_mut() {
            debug!(
                event_name = "auth.refresh.joined",
                event_domain = "auth",
                "joining refresh already in flight"
            );
            current.waiters += 1;
            return (current.id, current.flight.clone());
        }

        let flight = exchange(
            self.http.clone(),
            self.url.clone(),
            self.store.clone(),
            self.exchanges.clone(),
        )
        .boxed()
        .shared();
        let id = slot.next_id;
        slot.next_id += 1;
        slot.current = Some(InFlight {
            id,
            flight: flight.clone(),
            waiters: 1,
        });
        (id, flight)
    }

    /// Retires flight `id` once it has resolved or nobody awaits it any more.
    /// A newer flight in the slot is left alone.
    fn leave(&self, id: u64) {
        let mut slot = self.lock_slot();
        let retire = match slot.current.as_mut() {
            Some(current) if current.id == id => {
                current.waiters = current.waiters.saturating_sub(1);
                current.waiters == 0 || current.flight.peek().is_some()
            }
            _ => false,
        };
        if retire {
            slot.current = None;
        }
    }
}

/// One round trip to the refresh endpoint. Any failure clears the store.
async fn exchange(
    http: reqwest::Client,
    url: String,
    store: Arc<CredentialStore>,
    exchanges: Arc<AtomicU64>,
) -> Result<AccessCredential, RefreshFailure> {
    exchanges.fetch_add(1, Ordering::SeqCst);
    info!(
        event_name = "auth.refresh.started",
        event_domain = "auth",
        "refreshing access credential via {}",
        url
    );

    let outcome = request_credential(&http, &url).await;
    match &outcome {
        Ok(credential) => {
            store.set(credential.clone());
            info!(
                event_name = "auth.refresh.succeeded",
                event_domain = "auth",
                "access credential refreshed"
            );
        }
        Err(failure) => {
            store.clear();
            warn!(
                event_name = "auth.refresh.failed",
                event_domain = "auth",
                error = %failure,
                "credential refresh failed; stored credential cleared"
            );
        }
    }
    outcome
}

async fn request_credential(
    http: &reqwest::Client,
    url: &str,
) -> Result<AccessCredential, RefreshFailure> {
    let response = http
        .post(url)
        .send()
        .await
        .map_err(|e| RefreshFailure::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RefreshFailure::Rejected {
            status: status.as_u16(),
        });
    }

    let payload = response
        .json::<RefreshPayload>()
        .await
        .map_err(|e| RefreshFailure::InvalidPayload(e.to_string()))?;

    let credential = match payload.access_token {
        Some(token) if !token.is_empty() => AccessCredential::new(token),
        _ => return Err(RefreshFailure::MissingCredential),
    };
    if credential.header_value().is_none() {
        return Err(RefreshFailure::InvalidPayload(
            "access_token is not a valid header value".to_string(),
        ));
    }
    Ok(credential)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use mockito::Server;
    use std::io::Write;
    use std::time::Duration;

    fn client_for(url: String, store: Arc<CredentialStore>) -> AuthenticatedClient {
        let api = ApiConfig {
            base_url: url,
            login_url: "http://idp/login".to_string(),
            logout_url: "http://idp/logout".to_string(),
        };
        AuthenticatedClient::new(api, store).expect("client should build")
    }

    #[tokio::test]
    async fn test_refresh_success_replaces_credential() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Token refreshed", "access_token": "fresh"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::with_credential("stale"));
        let refresher = CredentialRefresher::new(&client_for(server.url(), store.clone()));

        let credential = refresher.refresh().await.expect("refresh should succeed");
        m.assert_async().await;
        assert_eq!(credential.as_str(), "fresh");
        assert_eq!(store.get(), Some(AccessCredential::new("fresh")));
    }

    #[tokio::test]
    async fn test_refresh_bad_request_clears_store() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(400)
            .with_body(r#"{"error": "bad"}"#)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::with_credential("stale"));
        let refresher = CredentialRefresher::new(&client_for(server.url(), store.clone()));

        let result = refresher.refresh().await;
        assert_eq!(result, Err(RefreshFailure::Rejected { status: 400 }));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_a_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message": "Token refreshed"}"#)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::with_credential("stale"));
        let refresher = CredentialRefresher::new(&client_for(server.url(), store.clone()));

        assert_eq!(
            refresher.refresh().await,
            Err(RefreshFailure::MissingCredential)
        );
        assert!(!store.is_present());
    }

    #[tokio::test]
    async fn test_refresh_with_unusable_token_clears_store() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "bad\nvalue"}"#)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::with_credential("stale"));
        let refresher = CredentialRefresher::new(&client_for(server.url(), store.clone()));

        assert!(matches!(
            refresher.refresh().await,
            Err(RefreshFailure::InvalidPayload(_))
        ));
        assert!(!store.is_present());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_exchange() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "shared"}"#)
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::new());
        let refresher = CredentialRefresher::new(&client_for(server.url(), store.clone()));

        let results = futures::future::join_all((0..8).map(|_| refresher.refresh())).await;

        m.assert_async().await;
        assert_eq!(refresher.exchange_count(), 1);
        for result in results {
            assert_eq!(result, Ok(AccessCredential::new("shared")));
        }
    }

    #[tokio::test]
    async fn test_abandoned_refresh_is_not_resumed() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(300));
                w.write_all(br#"{"access_token": "late"}"#)
            })
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::new());
        let refresher = CredentialRefresher::new(&client_for(server.url(), store.clone()));

        // The only waiter gives up mid-exchange.
        let abandoned = tokio::time::timeout(Duration::from_millis(50), refresher.refresh()).await;
        assert!(abandoned.is_err());
        assert!(refresher.lock_slot().current.is_none());
        assert_eq!(refresher.exchange_count(), 1);

        let credential = refresher.refresh().await.expect("new exchange should succeed");
        assert_eq!(credential.as_str(), "late");
        assert_eq!(refresher.exchange_count(), 2);
        assert!(refresher.lock_slot().current.is_none());
    }

    #[tokio::test]
    async fn test_sequential_refreshes_each_exchange() {
        let mut server = Server::new_async().await;
        let m = server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "again"}"#)
            .expect(2)
            .create_async()
            .await;

        let store = Arc::new(CredentialStore::new());
        let refresher = CredentialRefresher::new(&client_for(server.url(), store));

        refresher.refresh().await.expect("first refresh");
        refresher.refresh().await.expect("second refresh");
        m.assert_async().await;
        assert_eq!(refresher.exchange_count(), 2);
    }
}
