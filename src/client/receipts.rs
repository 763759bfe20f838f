//! Typed wrappers over the receipt endpoints.
//!
//! Every call goes through [`AuthenticatedClient`] and therefore never
//! refreshes on 401; the status is surfaced as [`ApiError::Unauthorized`].

use http::Method;
use tracing::debug;

use super::request::{ensure_success, read_json, AuthenticatedClient, RequestOptions};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    DeletedReceipt, Receipt, ReceiptFilter, ReceiptUpdate, StatusUpdate, TotalClaims, UserProfile,
};

pub const ME_PATH: &str = "/auth/me";

#[derive(Clone)]
pub struct ReceiptApi {
    client: AuthenticatedClient,
}

impl ReceiptApi {
    pub fn new(client: AuthenticatedClient) -> Self {
        Self { client }
    }

    pub async fn me(&self) -> ApiResult<UserProfile> {
        read_json(self.client.get(ME_PATH).await?).await
    }

    /// Newest first, as ordered by the service.
    pub async fn list_receipts(&self, filter: ReceiptFilter) -> ApiResult<Vec<Receipt>> {
        let mut options = RequestOptions::default();
        for (key, value) in filter.query_pairs() {
            options = options.query(key, value);
        }
        let response = self
            .client
            .request(&self.client.endpoint("/receipts/view"), options)
            .await?;
        let receipts: Vec<Receipt> = read_json(response).await?;
        debug!("Fetched {} receipts", receipts.len());
        Ok(receipts)
    }

    pub async fn get_receipt(&self, receipt_id: &str) -> ApiResult<Receipt> {
        read_json(
            self.client
                .get(&format!("/receipts/view/{}", receipt_id))
                .await?,
        )
        .await
    }

    pub async fn update_receipt(&self, receipt_id: &str, update: &ReceiptUpdate) -> ApiResult<()> {
        let body = serde_json::to_value(update)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        let response = self
            .client
            .request(
                &self.client.endpoint(&format!("/receipts/update/{}", receipt_id)),
                RequestOptions::method(Method::PUT).body(super::RequestBody::Json(body)),
            )
            .await?;
        ensure_success(response).map(|_| ())
    }

    pub async fn update_status(&self, receipt_id: &str, new_status: &str) -> ApiResult<()> {
        let body = StatusUpdate {
            receipt_id: receipt_id.to_string(),
            new_status: new_status.to_string(),
        };
        let response = self.client.post_json("/receipts/status", &body).await?;
        ensure_success(response).map(|_| ())
    }

    pub async fn delete_receipt(&self, receipt_id: &str) -> ApiResult<DeletedReceipt> {
        let response = self
            .client
            .request(
                &self.client.endpoint(&format!("/receipts/delete/{}", receipt_id)),
                RequestOptions::method(Method::DELETE),
            )
            .await?;
        read_json(response).await
    }

    pub async fn total_claims(&self, year: i32) -> ApiResult<TotalClaims> {
        let response = self
            .client
            .request(
                &self.client.endpoint("/receipts/total-claims"),
                RequestOptions::default().query("year", year.to_string()),
            )
            .await?;
        read_json(response).await
    }

    /// Raw image bytes with the served content type, if any.
    pub async fn receipt_image(&self, receipt_id: &str) -> ApiResult<(Vec<u8>, Option<String>)> {
        let response = ensure_success(
            self.client
                .get(&format!("/receipts/image/{}", receipt_id))
                .await?,
        )?;
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok((bytes.to_vec(), content_type))
    }
}
