use std::path::Path;
use std::sync::Arc;

use crate::error::ApiResult;

/// A selected file held in memory for the duration of its upload.
///
/// The buffer is shared so a retried attempt reuses it; it is released when
/// the last upload attempt referencing it is dropped.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    data: Arc<Vec<u8>>,
}

impl UploadFile {
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        let mime = mime_for(&name).to_string();
        Self {
            name,
            mime,
            data: Arc::new(data),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> ApiResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_bytes(name, data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn data(&self) -> &Arc<Vec<u8>> {
        &self.data
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// MIME type for the kinds of receipts the picker accepts.
pub fn mime_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}

/// Human size label: bytes, one-decimal KB, two-decimal MB.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_labels() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10.00 MB");
    }

    #[test]
    fn mime_from_extension() {
        assert!(UploadFile::from_bytes("Receipt.JPG", vec![]).is_image());
        assert_eq!(mime_for("scan.pdf"), "application/pdf");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn missing_file_is_a_file_error() {
        let result = UploadFile::from_path("/definitely/not/here.png").await;
        assert!(matches!(result, Err(crate::error::ApiError::File(_))));
    }
}
