use std::fmt;

use chrono::Utc;
use uuid::Uuid;

use super::file::{format_file_size, UploadFile};
use super::progress::{UploadEvent, MAX_UNCONFIRMED_PERCENT};
use crate::error::ApiError;
use crate::models::UploadReceipt;

/// Identity of one upload. Two picks of the same file name still differ
/// by timestamp and random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UploadTaskId {
    pub original_filename: String,
    pub created_at_ms: i64,
    pub suffix: String,
}

impl UploadTaskId {
    pub fn new(original_filename: impl Into<String>) -> Self {
        Self {
            original_filename: original_filename.into(),
            created_at_ms: Utc::now().timestamp_millis(),
            suffix: Uuid::new_v4().simple().to_string(),
        }
    }
}

impl fmt::Display for UploadTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.original_filename,
            self.created_at_ms,
            &self.suffix[..self.suffix.len().min(9)]
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, UploadStatus::Uploading)
    }
}

/// Render state of one upload row.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub id: UploadTaskId,
    pub size_label: String,
    pub is_image: bool,
    pub status: UploadStatus,
    pub progress_percent: u8,
    pub confirmed: bool,
    pub receipt: Option<UploadReceipt>,
    pub error: Option<ApiError>,
}

impl UploadTask {
    pub fn new(id: UploadTaskId, file: &UploadFile) -> Self {
        Self {
            id,
            size_label: format_file_size(file.size()),
            is_image: file.is_image(),
            status: UploadStatus::Uploading,
            progress_percent: 0,
            confirmed: false,
            receipt: None,
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.id.original_filename
    }

    /// Folds one event into the row. Returns whether anything changed.
    ///
    /// Percent only grows while uploading, goes past the transport cap only
    /// after server confirmation, and is frozen once the row is terminal.
    pub fn apply(&mut self, event: UploadEvent) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match event {
            UploadEvent::Progress(percent) => {
                let capped = percent.min(MAX_UNCONFIRMED_PERCENT);
                self.raise(capped)
            }
            UploadEvent::Confirmed(receipt) => {
                self.confirmed = true;
                self.receipt = Some(receipt);
                true
            }
            UploadEvent::Smoothing(percent) => {
                if !self.confirmed {
                    return false;
                }
                self.raise(percent.min(100))
            }
            UploadEvent::Completed => {
                if !self.confirmed {
                    return false;
                }
                self.status = UploadStatus::Completed;
                self.progress_percent = 100;
                true
            }
            UploadEvent::Failed(error) => {
                self.status = UploadStatus::Failed;
                self.error = Some(error);
                true
            }
        }
    }

    fn raise(&mut self, percent: u8) -> bool {
        if percent > self.progress_percent {
            self.progress_percent = percent;
            true
        } else {
            false
        }
    }

    pub fn status_label(&self) -> String {
        match self.status {
            UploadStatus::Completed => "Completed".to_string(),
            UploadStatus::Failed => match &self.error {
                Some(error) => format!("Failed: {}", error),
                None => "Failed".to_string(),
            },
            UploadStatus::Uploading => format!("{}% Done", self.progress_percent),
        }
    }
}
