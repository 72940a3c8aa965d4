use super::{ensure_success, CallPlacer};
use crate::config::RetellConfig;
use crate::errors::VendorError;
use crate::model::{CallReceipt, CallRequest};
use async_trait::async_trait;

pub const CREATE_PHONE_CALL_PATH: &str = "/v2/create-phone-call";

pub struct RetellClient {
    pub base_url: String,
    pub api_key: String,
    pub client: reqwest::Client,
}

impl RetellClient {
    pub fn new(cfg: &RetellConfig, client: reqwest::Client) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            client,
        }
    }
}

#[async_trait]
impl CallPlacer for RetellClient {
    async fn place_call(&self, req: &CallRequest) -> Result<CallReceipt, VendorError> {
        let url = format!("{}{}", self.base_url, CREATE_PHONE_CALL_PATH);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(req)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        // The call is placed once the vendor answers 2xx; an unreadable body
        // only loses the call id.
        let body = resp.text().await.unwrap_or_default();
        let json = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(
                    event = "call_response_undecodable",
                    error = %e,
                    bytes = body.len()
                );
                serde_json::Value::Null
            }
        };

        let call_id = json
            .get("call_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(CallReceipt { call_id, raw: json })
    }

    fn provider_name(&self) -> &'static str {
        "retell"
    }
}
