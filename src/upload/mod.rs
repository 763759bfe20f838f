//! Concurrent receipt uploads with smoothed, monotonic progress.

pub mod cancel;
pub mod file;
pub mod orchestrator;
pub mod progress;
pub mod session;
pub mod task;
pub mod transport;

pub use cancel::{CancelHandle, CancelSignal};
pub use file::UploadFile;
pub use orchestrator::{UploadGuard, UploadOrchestrator};
pub use progress::{SmoothingPlan, UploadEvent, UploadEvents};
pub use session::UploadSession;
pub use task::{UploadStatus, UploadTask, UploadTaskId};
pub use transport::{HttpUploadTransport, UploadTransport};
