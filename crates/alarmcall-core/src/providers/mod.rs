use crate::errors::VendorError;
use crate::model::{CallReceipt, CallRequest, TrackingBatch};
use async_trait::async_trait;

/// Source of tracking records (Bustrax in production).
#[async_trait]
pub trait TrackingSource: Send + Sync {
    /// Logs in and returns the session token.
    async fn authenticate(&self) -> Result<String, VendorError>;
    async fn fetch(&self, token: &str) -> Result<TrackingBatch, VendorError>;
    fn provider_name(&self) -> &'static str;
}

/// Places outbound voice calls (Retell in production).
#[async_trait]
pub trait CallPlacer: Send + Sync {
    async fn place_call(&self, req: &CallRequest) -> Result<CallReceipt, VendorError>;
    fn provider_name(&self) -> &'static str;
}

pub(crate) async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, VendorError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(VendorError::Status {
        status: status.as_u16(),
        body,
    })
}

pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, VendorError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

pub mod bustrax;
pub mod fake;
pub mod retell;
