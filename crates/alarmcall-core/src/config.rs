use crate::errors::ConfigError;
use crate::phone::{normalize, CountryCode};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Where the session token sits in the Bustrax login response.
///
/// The vendor documents the third comma-separated field while the deployed
/// client reads the fourth; keep this configurable until confirmed live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLocator {
    /// 0-based index into the comma-separated body.
    Field(usize),
    /// JSON pointer into a JSON body, e.g. `/data/token`.
    JsonPointer(String),
}

impl Default for TokenLocator {
    fn default() -> Self {
        TokenLocator::Field(3)
    }
}

impl FromStr for TokenLocator {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(idx) = s.strip_prefix("field:") {
            let n = idx
                .trim()
                .parse()
                .map_err(|_| ConfigError(format!("invalid token field index in {s:?}")))?;
            return Ok(TokenLocator::Field(n));
        }
        if let Some(ptr) = s.strip_prefix("json:") {
            let ptr = ptr.trim();
            if !ptr.starts_with('/') {
                return Err(ConfigError(format!(
                    "token JSON pointer must start with '/': {s:?}"
                )));
            }
            return Ok(TokenLocator::JsonPointer(ptr.to_string()));
        }
        Err(ConfigError(format!(
            "invalid token locator {s:?}: expected field:<n> or json:<pointer>"
        )))
    }
}

/// When a triggered alarm id is written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkPolicy {
    /// Mark only after the call vendor accepted the call. Failed calls are
    /// retried on the next poll.
    #[default]
    OnSuccess,
    /// Mark after every call attempt, successful or not.
    Always,
}

impl FromStr for MarkPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_success" | "success" => Ok(MarkPolicy::OnSuccess),
            "always" => Ok(MarkPolicy::Always),
            other => Err(ConfigError(format!(
                "invalid mark policy {other:?}: expected on_success or always"
            ))),
        }
    }
}

#[derive(Clone)]
pub struct BustraxConfig {
    pub auth_url: String,
    pub track_url: String,
    pub username: String,
    pub password: String,
    pub auth_version: String,
    pub protocol_version: String,
    pub business_unit: String,
    pub anticipation_minutes: u32,
    pub after_trip_minutes: u32,
    pub token_locator: TokenLocator,
}

impl fmt::Debug for BustraxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BustraxConfig")
            .field("auth_url", &self.auth_url)
            .field("track_url", &self.track_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("auth_version", &self.auth_version)
            .field("protocol_version", &self.protocol_version)
            .field("business_unit", &self.business_unit)
            .field("anticipation_minutes", &self.anticipation_minutes)
            .field("after_trip_minutes", &self.after_trip_minutes)
            .field("token_locator", &self.token_locator)
            .finish()
    }
}

#[derive(Clone)]
pub struct RetellConfig {
    pub base_url: String,
    pub api_key: String,
    pub from_number: String,
    pub agent_id: String,
    pub test_phone_number: Option<String>,
}

impl fmt::Debug for RetellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetellConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("from_number", &self.from_number)
            .field("agent_id", &self.agent_id)
            .field("test_phone_number", &self.test_phone_number)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub country_code: CountryCode,
    pub poll_interval: Duration,
    pub mark_policy: MarkPolicy,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bustrax: BustraxConfig,
    pub retell: RetellConfig,
    pub dispatch: DispatchConfig,
    pub http_timeout: Duration,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            get(key).ok_or_else(|| ConfigError(format!("missing required variable {key}")))
        };

        let bustrax = BustraxConfig {
            auth_url: or(
                "BUSTRAX_AUTH_URL",
                "https://w2.bustrax.io/wp-admin/ajax-auth.php",
            ),
            track_url: or(
                "BUSTRAX_TRACK_URL",
                "https://api.bustrax.io/engine/get_json.php",
            ),
            username: required("BUSTRAX_USERNAME")?,
            password: required("BUSTRAX_PASSWORD")?,
            auth_version: or("BUSTRAX_AUTH_VERSION", "2.0"),
            protocol_version: or("BUSTRAX_VER", "1.0.1"),
            business_unit: or("BUSTRAX_BUSINESS_UNIT", "lip_vdm"),
            anticipation_minutes: parsed(&get, "BUSTRAX_ANTICIPATION_MINUTES", 45)?,
            after_trip_minutes: parsed(&get, "BUSTRAX_AFTER_TRIP_MINUTES", 15)?,
            token_locator: match get("BUSTRAX_TOKEN_LOCATOR") {
                Some(v) => v.parse()?,
                None => TokenLocator::default(),
            },
        };

        let retell = RetellConfig {
            base_url: or("RETELL_BASE_URL", "https://api.retellai.com")
                .trim_end_matches('/')
                .to_string(),
            api_key: required("RETELL_API_KEY")?,
            from_number: required("RETELL_FROM_NUMBER")?,
            agent_id: required("RETELL_AGENT_ID")?,
            test_phone_number: get("RETELL_TEST_PHONE_NUMBER"),
        };

        let dispatch = DispatchConfig {
            country_code: match get("COUNTRY_CODE") {
                Some(v) => v.parse()?,
                None => CountryCode::default(),
            },
            poll_interval: Duration::from_secs(parsed(&get, "POLL_INTERVAL_SECONDS", 60)?),
            mark_policy: match get("ALARMCALL_MARK_POLICY") {
                Some(v) => v.parse()?,
                None => MarkPolicy::default(),
            },
            database_url: get("DATABASE_URL"),
        };

        if let Some(raw) = &retell.test_phone_number {
            if normalize(raw, &dispatch.country_code).is_none() {
                return Err(ConfigError(format!(
                    "RETELL_TEST_PHONE_NUMBER is not a dialable number: {raw:?}"
                )));
            }
        }

        if dispatch.poll_interval.is_zero() {
            return Err(ConfigError(
                "POLL_INTERVAL_SECONDS must be greater than zero".into(),
            ));
        }

        Ok(Self {
            bustrax,
            retell,
            dispatch,
            http_timeout: Duration::from_secs(parsed(&get, "HTTP_TIMEOUT_SECONDS", 30)?),
            log_level: or("ALARMCALL_LOG", "info"),
        })
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError(format!("invalid value for {key}: {v:?}"))),
        None => Ok(default),
    }
}
