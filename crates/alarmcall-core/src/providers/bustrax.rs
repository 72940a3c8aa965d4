use super::{ensure_success, TrackingSource};
use crate::config::{BustraxConfig, TokenLocator};
use crate::errors::VendorError;
use crate::model::TrackingBatch;
use async_trait::async_trait;

pub struct BustraxClient {
    pub cfg: BustraxConfig,
    pub client: reqwest::Client,
}

impl BustraxClient {
    pub fn new(cfg: BustraxConfig, client: reqwest::Client) -> Self {
        Self { cfg, client }
    }

    fn tracking_form(&self, token: &str) -> Vec<(&'static str, String)> {
        vec![
            ("data[iuser]", self.cfg.username.clone()),
            ("data[bttkn]", token.to_string()),
            ("data[ver]", self.cfg.protocol_version.clone()),
            ("data[bunit]", self.cfg.business_unit.clone()),
            (
                "data[anticipation_minutes]",
                self.cfg.anticipation_minutes.to_string(),
            ),
            (
                "data[after_trip_minutes]",
                self.cfg.after_trip_minutes.to_string(),
            ),
            ("type", "get_route_tracking".to_string()),
        ]
    }
}

#[async_trait]
impl TrackingSource for BustraxClient {
    async fn authenticate(&self) -> Result<String, VendorError> {
        let resp = self
            .client
            .get(&self.cfg.auth_url)
            .query(&[
                ("action", "login"),
                ("username", self.cfg.username.as_str()),
                ("password", self.cfg.password.as_str()),
                ("version", self.cfg.auth_version.as_str()),
            ])
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let body = resp.text().await?;

        tracing::debug!(
            event = "bustrax_login_response",
            fields = body.split(',').count(),
            bytes = body.len()
        );

        extract_token(&body, &self.cfg.token_locator)
    }

    async fn fetch(&self, token: &str) -> Result<TrackingBatch, VendorError> {
        let resp = self
            .client
            .post(&self.cfg.track_url)
            .form(&self.tracking_form(token))
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let body = resp.text().await?;

        let json: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| VendorError::decode(format!("tracking body is not JSON: {e}")))?;

        TrackingBatch::from_json(&json).ok_or_else(|| {
            VendorError::decode(format!(
                "expected a list of records or {{\"data\": [...]}}, got {}",
                json_kind(&json)
            ))
        })
    }

    fn provider_name(&self) -> &'static str {
        "bustrax"
    }
}

/// Pulls the session token out of a login response body.
pub fn extract_token(body: &str, locator: &TokenLocator) -> Result<String, VendorError> {
    let body = body.trim();
    let token = match locator {
        TokenLocator::Field(idx) => {
            let parts: Vec<&str> = body.split(',').collect();
            match parts.get(*idx) {
                Some(p) => p.trim().trim_matches('"').to_string(),
                None => {
                    return Err(VendorError::decode(format!(
                        "login response has {} comma-separated fields, token expected at index {}",
                        parts.len(),
                        idx
                    )))
                }
            }
        }
        TokenLocator::JsonPointer(ptr) => {
            let json: serde_json::Value = serde_json::from_str(body)
                .map_err(|e| VendorError::decode(format!("login response is not JSON: {e}")))?;
            match json.pointer(ptr) {
                Some(serde_json::Value::String(s)) => s.trim().to_string(),
                Some(serde_json::Value::Null) | None => {
                    return Err(VendorError::decode(format!(
                        "login response has no value at {ptr}"
                    )))
                }
                Some(other) => other.to_string(),
            }
        }
    };

    if token.is_empty() {
        return Err(VendorError::decode("login response carried an empty token"));
    }
    Ok(token)
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object without a data array",
    }
}
