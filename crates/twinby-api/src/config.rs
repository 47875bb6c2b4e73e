use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder signing secret; the server warns when it is still in use.
pub const PLACEHOLDER_JWT_SECRET: &str = "change_me_please";

/// Accepted token lifetimes, one minute up to a year.
const JWT_EXPIRES_MIN_RANGE: RangeInclusive<i64> = 1..=60 * 24 * 365;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Prefix for photo URLs handed to clients, without a trailing slash.
    pub public_base_url: String,
    pub jwt_secret: String,
    pub jwt_expires_min: i64,
    pub ranking_url: Option<String>,
    pub ranking_timeout: Duration,
    pub gigachat: GigaChatConfig,
}

#[derive(Debug, Clone)]
pub struct GigaChatConfig {
    /// Base64 `client_id:client_secret`; `None` disables the assistant.
    pub credentials: Option<String>,
    pub scope: String,
    pub model: String,
    pub verify_ssl: bool,
    pub auth_url: String,
    pub api_url: String,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        Ok(Config {
            host: env.string("TWINBY_HOST", "0.0.0.0"),
            port: env.parse("TWINBY_PORT", 8080)?,
            db_path: env.string("TWINBY_DB_PATH", "twinby.db").into(),
            upload_dir: env.string("TWINBY_UPLOAD_DIR", "./uploads").into(),
            public_base_url: env
                .string("TWINBY_PUBLIC_BASE_URL", "http://localhost:8080")
                .trim_end_matches('/')
                .to_string(),
            jwt_secret: env.string("TWINBY_JWT_SECRET", PLACEHOLDER_JWT_SECRET),
            jwt_expires_min: env.ranged("TWINBY_JWT_EXPIRES_MIN", 60 * 24 * 7, JWT_EXPIRES_MIN_RANGE)?,
            ranking_url: env
                .optional("TWINBY_RANKING_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            ranking_timeout: Duration::from_secs(env.parse("TWINBY_RANKING_TIMEOUT_SECS", 5)?),
            gigachat: GigaChatConfig {
                credentials: env.optional("TWINBY_GIGACHAT_CREDENTIALS"),
                scope: env.string("TWINBY_GIGACHAT_SCOPE", "GIGACHAT_API_PERS"),
                model: env.string("TWINBY_GIGACHAT_MODEL", "GigaChat-2-Pro"),
                verify_ssl: env.flag("TWINBY_GIGACHAT_VERIFY_SSL", true)?,
                auth_url: env.string(
                    "TWINBY_GIGACHAT_AUTH_URL",
                    "https://ngw.devices.sberbank.ru:9443/api/v2/oauth",
                ),
                api_url: env
                    .string(
                        "TWINBY_GIGACHAT_API_URL",
                        "https://gigachat.devices.sberbank.ru/api/v1",
                    )
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(env.parse("TWINBY_ASSISTANT_TIMEOUT_SECS", 30)?),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_placeholder_secret(&self) -> bool {
        self.jwt_secret == PLACEHOLDER_JWT_SECRET
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value,
            }),
        }
    }

    fn ranged(&self, var: &'static str, default: i64, range: RangeInclusive<i64>) -> Result<i64, ConfigError> {
        let value = self.parse(var, default)?;
        if !range.contains(&value) {
            return Err(ConfigError::Invalid {
                var,
                value: value.to_string(),
                reason: format!("must be between {} and {}", range.start(), range.end()),
            });
        }
        Ok(value)
    }

    fn flag(&self, var: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.optional(var) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }
}
