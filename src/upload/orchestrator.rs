use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::cancel::CancelHandle;
use super::file::UploadFile;
use super::progress::{UploadEvent, UploadEvents};
use super::session::UploadSession;
use super::task::{UploadTask, UploadTaskId};
use crate::utils::LogThrottle;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Owns the list of upload rows and drives one [`UploadSession`] per file.
///
/// Every upload runs independently: one failing, retrying or being
/// cancelled never touches another row. Cloning shares the same list.
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    session: Arc<UploadSession>,
    tasks: watch::Sender<Vec<UploadTask>>,
    cancels: Mutex<HashMap<UploadTaskId, CancelHandle>>,
    refresh_signal: watch::Sender<u64>,
    throttle: Arc<LogThrottle>,
}

/// Cancels its upload when dropped, unless it already finished.
pub struct UploadGuard {
    orchestrator: UploadOrchestrator,
    id: UploadTaskId,
}

impl UploadGuard {
    pub fn id(&self) -> &UploadTaskId {
        &self.id
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        self.orchestrator.cancel(&self.id);
    }
}

impl UploadOrchestrator {
    pub fn new(session: Arc<UploadSession>) -> Self {
        let (tasks, _) = watch::channel(Vec::new());
        let (refresh_signal, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                session,
                tasks,
                cancels: Mutex::new(HashMap::new()),
                refresh_signal,
                throttle: Arc::new(LogThrottle::new(PROGRESS_LOG_INTERVAL)),
            }),
        }
    }

    /// Appends one `Uploading` row per file and starts all of them at once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, files: Vec<UploadFile>) -> Vec<UploadTaskId> {
        if files.is_empty() {
            return Vec::new();
        }
        info!(
            event_name = "upload.batch.submitted",
            event_domain = "upload",
            count = files.len(),
            "starting uploads"
        );

        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let id = UploadTaskId::new(file.name.clone());
            let row = UploadTask::new(id.clone(), &file);
            self.inner.tasks.send_modify(|tasks| tasks.push(row));

            let (handle, signal) = CancelHandle::pair();
            self.inner.lock_cancels().insert(id.clone(), handle);

            let (events, rx) = UploadEvents::channel(id.to_string(), self.inner.throttle.clone());
            let inner = self.inner.clone();
            let task_id = id.clone();
            tokio::spawn(async move {
                let upload = inner.session.start(file, events, signal);
                let render = inner.render(&task_id, rx);
                let (outcome, ()) = tokio::join!(upload, render);
                inner.lock_cancels().remove(&task_id);
                debug!("Upload {} finished: ok={}", task_id, outcome.is_ok());
            });
            ids.push(id);
        }
        ids
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        self.inner.tasks.borrow().clone()
    }

    pub fn task(&self, id: &UploadTaskId) -> Option<UploadTask> {
        self.inner.tasks.borrow().iter().find(|t| &t.id == id).cloned()
    }

    /// Fires whenever any row changes.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadTask>> {
        self.inner.tasks.subscribe()
    }

    /// Number of uploads the server has accepted so far. Receipt lists
    /// should be refetched when it moves.
    pub fn refresh_signal(&self) -> u64 {
        *self.inner.refresh_signal.borrow()
    }

    pub fn subscribe_refresh(&self) -> watch::Receiver<u64> {
        self.inner.refresh_signal.subscribe()
    }

    /// Requests cancellation. Returns `false` when the upload is not running.
    pub fn cancel(&self, id: &UploadTaskId) -> bool {
        match self.inner.lock_cancels().get(id) {
            Some(handle) => {
                info!("Cancelling upload {}", id);
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Ties the upload's lifetime to the returned guard.
    pub fn guard(&self, id: &UploadTaskId) -> Option<UploadGuard> {
        if !self.inner.lock_cancels().contains_key(id) {
            return None;
        }
        Some(UploadGuard {
            orchestrator: self.clone(),
            id: id.clone(),
        })
    }

    /// Cancels the upload if still running and removes its row.
    pub fn dismiss(&self, id: &UploadTaskId) -> bool {
        self.cancel(id);
        self.inner.tasks.send_if_modified(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| &t.id != id);
            tasks.len() != before
        })
    }

    /// Resolves once no row is still uploading.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.tasks.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx
            .wait_for(|tasks| tasks.iter().all(|t| t.status.is_terminal()))
            .await;
    }
}

impl Inner {
    fn lock_cancels(&self) -> std::sync::MutexGuard<'_, HashMap<UploadTaskId, CancelHandle>> {
        self.cancels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn render(&self, id: &UploadTaskId, mut rx: mpsc::UnboundedReceiver<UploadEvent>) {
        while let Some(event) = rx.recv().await {
            let confirmed = matches!(event, UploadEvent::Confirmed(_));
            let changed = self.tasks.send_if_modified(|tasks| {
                tasks
                    .iter_mut()
                    .find(|t| &t.id == id)
                    .is_some_and(|task| task.apply(event))
            });
            if confirmed && changed {
                self.refresh_signal.send_modify(|n| *n += 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CredentialRefresher, CredentialStore};
    use crate::client::AuthenticatedClient;
    use crate::config::{ApiConfig, UploadConfig};
    use crate::error::{ApiError, ApiResult};
    use crate::models::{AccessCredential, UploadReceipt};
    use crate::upload::task::UploadStatus;
    use crate::upload::transport::UploadTransport;
    use async_trait::async_trait;

    /// First byte of the file picks the outcome: 0 succeeds, 1 fails,
    /// anything else hangs until cancelled.
    struct ByContentTransport;

    #[async_trait]
    impl UploadTransport for ByContentTransport {
        async fn send(
            &self,
            file: &UploadFile,
            _credential: Option<&AccessCredential>,
            events: &UploadEvents,
        ) -> ApiResult<UploadReceipt> {
            events.transfer(file.size() / 4, file.size());
            tokio::time::sleep(Duration::from_millis(10)).await;
            match file.data().first() {
                Some(0) => Ok(UploadReceipt {
                    original_filename: file.name.clone(),
                    ..UploadReceipt::default()
                }),
                Some(1) => Err(ApiError::Server { status: 500 }),
                _ => futures::future::pending().await,
            }
        }
    }

    fn orchestrator() -> UploadOrchestrator {
        let store = Arc::new(CredentialStore::with_credential("t"));
        let api = ApiConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            login_url: "http://idp/login".to_string(),
            logout_url: "http://idp/logout".to_string(),
        };
        let client = AuthenticatedClient::new(api, store.clone()).expect("client should build");
        let refresher = Arc::new(CredentialRefresher::new(&client));
        let config = UploadConfig {
            min_visible_ms: 40,
            min_animation_ms: 20,
            frame_interval_ms: 5,
            ..UploadConfig::default()
        };
        let session = UploadSession::new(Arc::new(ByContentTransport), store, refresher, config);
        UploadOrchestrator::new(Arc::new(session))
    }

    fn file(name: &str, marker: u8) -> UploadFile {
        UploadFile::from_bytes(name, vec![marker; 64])
    }

    #[tokio::test]
    async fn test_same_name_uploads_have_independent_outcomes() {
        let uploads = orchestrator();
        let ids = uploads.submit(vec![file("receipt.pdf", 0), file("receipt.pdf", 1)]);
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(uploads.tasks().len(), 2);
        assert!(uploads
            .tasks()
            .iter()
            .all(|t| t.status == UploadStatus::Uploading && t.progress_percent == 0));

        uploads.wait_idle().await;

        let ok = uploads.task(&ids[0]).unwrap();
        assert_eq!(ok.status, UploadStatus::Completed);
        assert_eq!(ok.progress_percent, 100);
        assert_eq!(ok.receipt.unwrap().original_filename, "receipt.pdf");

        let failed = uploads.task(&ids[1]).unwrap();
        assert_eq!(failed.status, UploadStatus::Failed);
        assert_eq!(failed.progress_percent, 25);
        assert_eq!(failed.error, Some(ApiError::Server { status: 500 }));

        assert_eq!(uploads.refresh_signal(), 1);
    }

    #[tokio::test]
    async fn test_refresh_signal_counts_each_success() {
        let uploads = orchestrator();
        let mut refresh = uploads.subscribe_refresh();
        uploads.submit(vec![file("a.png", 0), file("b.png", 0), file("c.png", 0)]);
        uploads.wait_idle().await;

        assert_eq!(uploads.refresh_signal(), 3);
        assert!(refresh.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_cancel_only_affects_its_own_row() {
        let uploads = orchestrator();
        let ids = uploads.submit(vec![file("slow.pdf", 9), file("fast.pdf", 0)]);

        assert!(uploads.cancel(&ids[0]));
        uploads.wait_idle().await;

        let cancelled = uploads.task(&ids[0]).unwrap();
        assert_eq!(cancelled.status, UploadStatus::Failed);
        assert_eq!(cancelled.error, Some(ApiError::Cancelled));
        assert_eq!(uploads.task(&ids[1]).unwrap().status, UploadStatus::Completed);
        assert!(!uploads.cancel(&ids[0]));
    }

    #[tokio::test]
    async fn test_dropping_guard_cancels_upload() {
        let uploads = orchestrator();
        let ids = uploads.submit(vec![file("slow.pdf", 9)]);

        let guard = uploads.guard(&ids[0]).expect("upload is running");
        assert_eq!(guard.id(), &ids[0]);
        drop(guard);
        uploads.wait_idle().await;

        assert_eq!(uploads.task(&ids[0]).unwrap().error, Some(ApiError::Cancelled));
        assert!(uploads.guard(&ids[0]).is_none());
    }

    #[tokio::test]
    async fn test_dismiss_removes_row() {
        let uploads = orchestrator();
        let mut rows = uploads.subscribe();
        let ids = uploads.submit(vec![file("slow.pdf", 9), file("keep.pdf", 0)]);
        rows.borrow_and_update();

        assert!(uploads.dismiss(&ids[0]));
        assert!(rows.has_changed().unwrap());
        assert!(uploads.task(&ids[0]).is_none());
        assert!(!uploads.dismiss(&ids[0]));

        uploads.wait_idle().await;
        assert_eq!(uploads.tasks().len(), 1);
        assert_eq!(uploads.tasks()[0].name(), "keep.pdf");
    }

    #[tokio::test]
    async fn test_submit_nothing_is_a_no_op() {
        let uploads = orchestrator();
        assert!(uploads.submit(Vec::new()).is_empty());
        uploads.wait_idle().await;
        assert!(uploads.tasks().is_empty());
    }
}
