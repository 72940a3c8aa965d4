use thiserror::Error;

/// Failure of a single vendor HTTP interaction.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl VendorError {
    pub fn decode(msg: impl Into<String>) -> Self {
        VendorError::Decode(msg.into())
    }
}

/// Errors that abort a run before any record is evaluated.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Auth failed: {0}")]
    Auth(#[source] VendorError),

    #[error("Tracking failed: {0}")]
    Fetch(#[source] VendorError),
}

impl RunError {
    pub fn stage(&self) -> &'static str {
        match self {
            RunError::Auth(_) => "auth",
            RunError::Fetch(_) => "fetch",
        }
    }
}

/// Errors scoped to one tracking record. These never abort a run.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Missing or invalid phone number for driver {driver}: {raw:?}")]
    UnformattablePhone { driver: String, raw: String },

    #[error("Retell failed for {to} (driver {driver}): {source}")]
    CallFailed {
        to: String,
        driver: String,
        #[source]
        source: VendorError,
    },

    #[error("Ledger error for alarm {alarm_id}: {reason}")]
    Ledger { alarm_id: String, reason: String },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);
