use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Response of `POST /receipts/upload`. Only logged by the upload path.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct UploadReceipt {
    pub message: String,
    pub s3_key: String,
    pub extracted: BTreeMap<String, Value>,
    pub receipt_size: u64,
    pub original_filename: String,
    pub stored_filename: String,
    pub filename_changed: bool,
}

/// A stored receipt as returned by the listing and detail endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Receipt {
    pub receipt_id: String,
    #[serde(default)]
    pub receipt_filename: Option<String>,
    #[serde(default)]
    pub receipt_status: Option<String>,
    #[serde(default)]
    pub receipt_upload_datetime: Option<String>,
    #[serde(default)]
    pub receipt_size: Option<u64>,
    #[serde(default)]
    pub textract_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Optional date narrowing for `GET /receipts/view`. Month needs a year,
/// day needs a month; the server ignores the finer parts otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiptFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl ReceiptFilter {
    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(year) = self.year {
            pairs.push(("year", year.to_string()));
            if let Some(month) = self.month {
                pairs.push(("month", month.to_string()));
                if let Some(day) = self.day {
                    pairs.push(("day", day.to_string()));
                }
            }
        }
        pairs
    }
}

/// Partial update body for `PUT /receipts/update/{id}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub textract_data: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub receipt_id: String,
    pub new_status: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TotalClaims {
    pub year: i32,
    pub total_claims: f64,
    pub num_receipts: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeletedReceipt {
    pub receipt_id: String,
    #[serde(default)]
    pub deleted_s3_key: Option<String>,
    #[serde(default)]
    pub deleted_filename: Option<String>,
    #[serde(default)]
    pub s3_deletion_status: String,
}
