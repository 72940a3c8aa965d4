//! Scripted vendor doubles for tests.

use super::{CallPlacer, TrackingSource};
use crate::errors::VendorError;
use crate::model::{CallReceipt, CallRequest, TrackingBatch};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A canned vendor failure. `VendorError` itself is not `Clone`.
#[derive(Debug, Clone)]
pub enum FakeFailure {
    Status(u16, String),
    Decode(String),
}

impl FakeFailure {
    fn to_error(&self) -> VendorError {
        match self {
            FakeFailure::Status(status, body) => VendorError::Status {
                status: *status,
                body: body.clone(),
            },
            FakeFailure::Decode(msg) => VendorError::decode(msg.clone()),
        }
    }
}

/// Serves the same feed on every fetch.
pub struct FakeTracking {
    feed: Value,
    auth_failure: Option<FakeFailure>,
    fetch_failure: Option<FakeFailure>,
    pub auth_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakeTracking {
    pub fn new(feed: Value) -> Self {
        Self {
            feed,
            auth_failure: None,
            fetch_failure: None,
            auth_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_auth(failure: FakeFailure) -> Self {
        Self {
            auth_failure: Some(failure),
            ..Self::new(Value::Array(vec![]))
        }
    }

    pub fn failing_fetch(failure: FakeFailure) -> Self {
        Self {
            fetch_failure: Some(failure),
            ..Self::new(Value::Array(vec![]))
        }
    }
}

#[async_trait]
impl TrackingSource for FakeTracking {
    async fn authenticate(&self) -> Result<String, VendorError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        match &self.auth_failure {
            Some(f) => Err(f.to_error()),
            None => Ok("fake-token".to_string()),
        }
    }

    async fn fetch(&self, token: &str) -> Result<TrackingBatch, VendorError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = &self.fetch_failure {
            return Err(f.to_error());
        }
        if token != "fake-token" {
            return Err(VendorError::Status {
                status: 403,
                body: "bad token".into(),
            });
        }
        TrackingBatch::from_json(&self.feed).ok_or_else(|| VendorError::decode("unexpected feed shape"))
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Records every call request; fails for configured destination numbers.
#[derive(Default)]
pub struct FakeCaller {
    calls: Mutex<Vec<CallRequest>>,
    failing_numbers: HashSet<String>,
}

impl FakeCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(numbers: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing_numbers: numbers.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<CallRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallPlacer for FakeCaller {
    async fn place_call(&self, req: &CallRequest) -> Result<CallReceipt, VendorError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(req.clone());
            calls.len()
        };
        if self.failing_numbers.contains(&req.to_number) {
            return Err(VendorError::Status {
                status: 500,
                body: "upstream unavailable".into(),
            });
        }
        Ok(CallReceipt {
            call_id: Some(format!("call_{n}")),
            raw: serde_json::json!({ "call_id": format!("call_{n}") }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
