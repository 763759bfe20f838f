//! Process-wide authentication status, resolved once at startup.

use std::sync::Mutex;

use tokio::sync::{watch, OnceCell};
use tracing::{debug, info, warn};

use super::guard::{Route, RouteDecision};
use crate::client::receipts::ME_PATH;
use crate::client::AuthenticatedClient;
use crate::models::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unknown,
    Authenticated,
    Unauthenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthState {
    pub status: AuthStatus,
    pub resolving: bool,
}

impl AuthState {
    pub const INITIAL: AuthState = AuthState {
        status: AuthStatus::Unknown,
        resolving: true,
    };

    fn resolved(status: AuthStatus) -> Self {
        AuthState {
            status,
            resolving: false,
        }
    }
}

/// Built once at the composition root and handed to whoever guards routes.
///
/// The identity check runs at most once; later `bootstrap` calls return the
/// state it settled on.
pub struct SessionContext {
    client: AuthenticatedClient,
    state: watch::Sender<AuthState>,
    identity: OnceCell<AuthState>,
    profile: Mutex<Option<UserProfile>>,
}

impl SessionContext {
    pub fn new(client: AuthenticatedClient) -> Self {
        let (state, _) = watch::channel(AuthState::INITIAL);
        Self {
            client,
            state,
            identity: OnceCell::new(),
            profile: Mutex::new(None),
        }
    }

    /// Checks `/auth/me` the first time it is called.
    pub async fn bootstrap(&self) -> AuthState {
        *self.identity.get_or_init(|| self.check_identity()).await
    }

    async fn check_identity(&self) -> AuthState {
        info!("Starting initial authentication check for {}", ME_PATH);
        let status = match self.client.get(ME_PATH).await {
            Ok(response) if response.status().is_success() => {
                match response.json::<UserProfile>().await {
                    Ok(profile) => {
                        debug!("Identity check returned profile for {}", profile.display_name());
                        *self
                            .profile
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(profile);
                    }
                    Err(e) => debug!("Identity check body was not a profile: {}", e),
                }
                AuthStatus::Authenticated
            }
            Ok(response) => {
                warn!(
                    "Identity check failed with status {}; session is unauthenticated",
                    response.status()
                );
                AuthStatus::Unauthenticated
            }
            Err(e) => {
                warn!("Error during identity check; session is unauthenticated: {}", e);
                AuthStatus::Unauthenticated
            }
        };

        let next = AuthState::resolved(status);
        self.state.send_if_modified(|current| {
            if current.status != AuthStatus::Unknown || !current.resolving {
                return false;
            }
            *current = next;
            true
        });
        info!("Authentication check completed: {:?}", status);
        *self.state.borrow()
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().status == AuthStatus::Authenticated
    }

    /// Profile captured by the identity check, when the body had one.
    pub fn profile(&self) -> Option<UserProfile> {
        self.profile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn guard(&self, path: &str) -> RouteDecision {
        Route::parse(path).decide(self.state())
    }

    /// Where the identity provider login starts.
    pub fn login_redirect(&self) -> &str {
        &self.client.api().login_url
    }

    /// Drops the local credential and returns the logout target. The session
    /// state is not checked again; callers are expected to navigate away.
    pub fn logout(&self) -> &str {
        self.client.credentials().clear();
        info!("Logging out; redirecting to {}", self.client.api().logout_url);
        &self.client.api().logout_url
    }
}
