use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::{IdentifierPolicy, RetryPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub forms: FormsApiConfig,
    pub account: AccountConfig,
    pub retry: RetryPolicy,
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Load from the process environment, reading an optional `.env` file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let environment = AppEnvironment::from_str(&or_default("APP_ENV", "development"));

        let host = or_default("APP_HOST", "127.0.0.1");
        let port = or_default("APP_PORT", "8000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = or_default("APP_LOG_LEVEL", "info");

        let timeout_secs: u64 = parse_value("HTTP_TIMEOUT_SECS", &or_default("HTTP_TIMEOUT_SECS", "30"))?;
        let forms = FormsApiConfig {
            base_url: parse_url("FORMS_API_URL", or_default("FORMS_API_URL", DEFAULT_FORMS_API_URL))?,
            api_key: api_key(
                get("FORMS_API_KEY"),
                or_default("FORMS_API_KEY_HEADER", "X-API-Key"),
            ),
            timeout: Duration::from_secs(timeout_secs),
        };

        let identifier = IdentifierPolicy {
            min_len: parse_value("ACCOUNT_ID_MIN_LEN", &or_default("ACCOUNT_ID_MIN_LEN", "3"))?,
            max_len: parse_value("ACCOUNT_ID_MAX_LEN", &or_default("ACCOUNT_ID_MAX_LEN", "20"))?,
        };
        if identifier.min_len == 0 || identifier.min_len > identifier.max_len {
            return Err(ConfigError::InvalidIdentifierRange {
                min: identifier.min_len,
                max: identifier.max_len,
            });
        }

        let debounce_ms: u64 =
            parse_value("ACCOUNT_DEBOUNCE_MS", &or_default("ACCOUNT_DEBOUNCE_MS", "800"))?;
        let account = AccountConfig {
            base_url: parse_url(
                "ACCOUNT_API_URL",
                or_default("ACCOUNT_API_URL", DEFAULT_ACCOUNT_API_URL),
            )?,
            fallback_url: parse_url(
                "ACCOUNT_FALLBACK_URL",
                or_default("ACCOUNT_FALLBACK_URL", DEFAULT_ACCOUNT_FALLBACK_URL),
            )?,
            api_key: api_key(
                get("ACCOUNT_API_KEY"),
                or_default("ACCOUNT_API_KEY_HEADER", "Ocp-Apim-Subscription-Key"),
            ),
            customer_code: or_default("ACCOUNT_CUSTOMER_CODE", "DOJ"),
            debounce: Duration::from_millis(debounce_ms),
            identifier,
        };

        let defaults = RetryPolicy::default();
        let base_delay_ms: u64 = parse_value(
            "RETRY_BASE_DELAY_MS",
            &or_default("RETRY_BASE_DELAY_MS", "1000"),
        )?;
        let raw_multiplier = or_default("RETRY_BACKOFF_MULTIPLIER", "2.0");
        let backoff_multiplier: f64 = parse_value("RETRY_BACKOFF_MULTIPLIER", &raw_multiplier)?;
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_BACKOFF_MULTIPLIER",
                value: raw_multiplier,
            });
        }
        let retry = RetryPolicy {
            max_attempts: parse_value("RETRY_MAX_ATTEMPTS", &or_default("RETRY_MAX_ATTEMPTS", "3"))?,
            base_delay: Duration::from_millis(base_delay_ms),
            backoff_multiplier,
            exponential: parse_flag("RETRY_EXPONENTIAL", &or_default("RETRY_EXPONENTIAL", "true"))?,
            retryable_statuses: defaults.retryable_statuses,
        };
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RETRY_MAX_ATTEMPTS",
                value: "0".to_string(),
            });
        }

        let notifications = NotificationConfig {
            cases_url: get("CASES_API_URL")
                .map(|url| parse_url("CASES_API_URL", url))
                .transpose()?,
            esb_url: get("ESB_URL").map(|url| parse_url("ESB_URL", url)).transpose()?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            forms,
            account,
            retry,
            notifications,
        })
    }
}

const DEFAULT_FORMS_API_URL: &str = "http://localhost:8000/api";
const DEFAULT_ACCOUNT_API_URL: &str = "http://localhost:8000/api/accounts";
const DEFAULT_ACCOUNT_FALLBACK_URL: &str = "http://localhost:8000/esb/validate-customer";

fn api_key(value: Option<String>, header: String) -> Option<ApiKey> {
    value.map(|value| ApiKey { header, value })
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}

fn parse_url(key: &'static str, raw: String) -> Result<String, ConfigError> {
    match reqwest::Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            Ok(raw.trim_end_matches('/').to_string())
        }
        _ => Err(ConfigError::InvalidUrl { key, value: raw }),
    }
}

/// Settings controlling the mock backend binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Header/value pair sent to authenticate against a remote API.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub header: String,
    pub value: String,
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("header", &self.header)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Location and credentials of the forms API.
#[derive(Debug, Clone)]
pub struct FormsApiConfig {
    pub base_url: String,
    pub api_key: Option<ApiKey>,
    pub timeout: Duration,
}

/// Customer/account validation services and the debounce applied to them.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    pub base_url: String,
    pub fallback_url: String,
    pub api_key: Option<ApiKey>,
    pub customer_code: String,
    pub debounce: Duration,
    pub identifier: IdentifierPolicy,
}

/// Optional downstream systems notified after a successful submission.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub cases_url: Option<String>,
    pub esb_url: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    InvalidUrl { key: &'static str, value: String },
    InvalidIdentifierRange { min: usize, max: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an invalid value '{value}'")
            }
            ConfigError::InvalidUrl { key, value } => {
                write!(f, "{key} must be an http(s) URL, got '{value}'")
            }
            ConfigError::InvalidIdentifierRange { min, max } => write!(
                f,
                "ACCOUNT_ID_MIN_LEN ({min}) must be positive and not exceed ACCOUNT_ID_MAX_LEN ({max})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::InvalidUrl { .. }
            | ConfigError::InvalidIdentifierRange { .. } => None,
        }
    }
}
