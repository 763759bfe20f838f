//! Shared application state.
//!
//! Everything here is built once from the configuration and shares a single
//! credential store and cookie jar.

use std::sync::Arc;

use tracing::debug;

use crate::auth::{CredentialRefresher, CredentialStore, SessionContext};
use crate::client::{AuthenticatedClient, ReceiptApi};
use crate::config::ConfigV1;
use crate::error::ApiResult;
use crate::upload::{HttpUploadTransport, UploadOrchestrator, UploadSession};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// The one in-memory access credential.
    pub credentials: Arc<CredentialStore>,
    pub client: AuthenticatedClient,
    pub refresher: Arc<CredentialRefresher>,
    /// Resolved authentication status and route guarding.
    pub session: Arc<SessionContext>,
    pub receipts: ReceiptApi,
    pub uploads: UploadOrchestrator,
}

impl AppState {
    pub fn build(config: Arc<ConfigV1>) -> ApiResult<Self> {
        let credentials = Arc::new(CredentialStore::new());
        let client = AuthenticatedClient::new(config.api.clone(), credentials.clone())?;
        let refresher = Arc::new(CredentialRefresher::new(&client));
        let session = Arc::new(SessionContext::new(client.clone()));
        let receipts = ReceiptApi::new(client.clone());

        let transport = Arc::new(HttpUploadTransport::new(
            &client,
            config.upload.field_name.clone(),
        ));
        let upload_session = UploadSession::new(
            transport,
            credentials.clone(),
            refresher.clone(),
            config.upload.clone(),
        );
        let uploads = UploadOrchestrator::new(Arc::new(upload_session));

        debug!("Application state built for {}", config.api.base_url);
        Ok(Self {
            config,
            credentials,
            client,
            refresher,
            session,
            receipts,
            uploads,
        })
    }
}
