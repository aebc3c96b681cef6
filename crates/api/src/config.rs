//! Server configuration loaded from the environment

use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

/// Minimum HMAC secret length (256 bits)
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub environment: String,
    pub version: String,
    pub allowed_origins: Vec<String>,
    /// Peers whose X-Forwarded-For / X-Real-IP headers are believed
    pub trusted_proxies: Vec<IpAddr>,

    // Backends
    pub database_url: String,
    pub redis_url: String,
    pub cache_timeout: Duration,
    pub database_timeout: Duration,

    // Tokens
    pub jwt_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub refresh_cookie_max_age: Duration,
    pub refresh_cookie_secure: bool,
    /// Delete the whole session when a superseded refresh token is replayed
    pub revoke_on_refresh_reuse: bool,

    // Login rate limiting
    pub login_rate_limit: u64,
    pub login_rate_window: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("environment", &self.environment)
            .field("version", &self.version)
            .field("allowed_origins", &self.allowed_origins)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("database_url", &"[REDACTED]")
            .field("redis_url", &"[REDACTED]")
            .field("cache_timeout", &self.cache_timeout)
            .field("database_timeout", &self.database_timeout)
            .field("jwt_secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("refresh_cookie_max_age", &self.refresh_cookie_max_age)
            .field("refresh_cookie_secure", &self.refresh_cookie_secure)
            .field("revoke_on_refresh_reuse", &self.revoke_on_refresh_reuse)
            .field("login_rate_limit", &self.login_rate_limit)
            .field("login_rate_window", &self.login_rate_window)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Configuration with the service defaults for everything but the
    /// backend locations and the signing secret.
    pub fn new(
        database_url: impl Into<String>,
        redis_url: impl Into<String>,
        jwt_secret: impl Into<String>,
    ) -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            environment: "development".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            allowed_origins: vec!["http://localhost:3000".to_string()],
            trusted_proxies: Vec::new(),
            database_url: database_url.into(),
            redis_url: redis_url.into(),
            cache_timeout: Duration::from_millis(3_000),
            database_timeout: Duration::from_millis(5_000),
            jwt_secret: jwt_secret.into(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_cookie_max_age: Duration::from_secs(30 * 24 * 60 * 60),
            refresh_cookie_secure: true,
            revoke_on_refresh_reuse: false,
            login_rate_limit: 3,
            login_rate_window: Duration::from_secs(60),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // .env is optional; production sets variables directly
        let _ = dotenvy::dotenv();

        let database_url = required("DATABASE_URL")?;
        let redis_url = required("REDIS_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let mut config = Self::new(database_url, redis_url, jwt_secret);

        if let Ok(addr) = env::var("BIND_ADDRESS") {
            config.bind_address = addr;
        }
        if let Ok(environment) = env::var("APP_ENV") {
            config.environment = environment;
        }
        if let Ok(version) = env::var("APP_VERSION") {
            config.version = version;
        }
        if let Ok(origins) = env::var("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(proxies) = env::var("TRUSTED_PROXIES") {
            config.trusted_proxies = parse_ip_list("TRUSTED_PROXIES", &proxies)?;
        }

        config.cache_timeout = Duration::from_millis(parse_env_or_default(
            "CACHE_TIMEOUT_MS",
            config.cache_timeout.as_millis() as u64,
        )?);
        config.database_timeout = Duration::from_millis(parse_env_or_default(
            "DATABASE_TIMEOUT_MS",
            config.database_timeout.as_millis() as u64,
        )?);
        config.access_token_ttl = Duration::from_secs(parse_env_or_default(
            "JWT_EXPIRATION_SECS",
            config.access_token_ttl.as_secs(),
        )?);
        config.refresh_token_ttl = Duration::from_secs(parse_env_or_default(
            "JWT_REFRESH_TTL_SECS",
            config.refresh_token_ttl.as_secs(),
        )?);
        config.refresh_cookie_max_age = Duration::from_secs(parse_env_or_default(
            "REFRESH_COOKIE_MAX_AGE_SECS",
            config.refresh_cookie_max_age.as_secs(),
        )?);
        config.refresh_cookie_secure =
            parse_env_or_default("REFRESH_COOKIE_SECURE", config.refresh_cookie_secure)?;
        config.revoke_on_refresh_reuse = parse_env_or_default(
            "REFRESH_REUSE_REVOKES_SESSION",
            config.revoke_on_refresh_reuse,
        )?;
        config.login_rate_limit = parse_env_or_default("LOGIN_RATE_LIMIT", config.login_rate_limit)?;
        config.login_rate_window = Duration::from_secs(parse_env_or_default(
            "LOGIN_RATE_WINDOW_SECS",
            config.login_rate_window.as_secs(),
        )?);

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the token lifecycle unsafe or unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
            ));
        }
        if self.access_token_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "JWT_EXPIRATION_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        // The session index lives as long as the refresh token and must
        // outlive the access token.
        if self.refresh_token_ttl <= self.access_token_ttl {
            return Err(ConfigError::InvalidValue(
                "JWT_REFRESH_TTL_SECS".to_string(),
                "must be greater than JWT_EXPIRATION_SECS".to_string(),
            ));
        }
        if self.login_rate_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "LOGIN_RATE_LIMIT".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.login_rate_window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "LOGIN_RATE_WINDOW_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        if self.cache_timeout.is_zero() || self.database_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CACHE_TIMEOUT_MS/DATABASE_TIMEOUT_MS".to_string(),
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "cannot be empty".to_string(),
        ));
    }
    Ok(value)
}

fn parse_ip_list(name: &str, raw: &str) -> Result<Vec<IpAddr>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|e| ConfigError::ParseError(name.to_string(), format!("{s}: {e}")))
        })
        .collect()
}

fn parse_env_or_default<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "REDIS_URL",
        "JWT_SECRET",
        "BIND_ADDRESS",
        "JWT_EXPIRATION_SECS",
        "JWT_REFRESH_TTL_SECS",
        "LOGIN_RATE_LIMIT",
        "REFRESH_COOKIE_SECURE",
        "ALLOWED_ORIGINS",
        "TRUSTED_PROXIES",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    fn set_required() {
        env::set_var("DATABASE_URL", "postgres://localhost/tollgate");
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var("JWT_SECRET", SECRET);
    }

    #[test]
    fn test_defaults() {
        let config = Config::new("postgres://db", "redis://cache", SECRET);
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(86_400));
        assert_eq!(config.refresh_cookie_max_age, Duration::from_secs(2_592_000));
        assert_eq!(config.login_rate_limit, 3);
        assert_eq!(config.login_rate_window, Duration::from_secs(60));
        assert!(config.trusted_proxies.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::new("postgres://user:pw@db", "redis://:pw@cache", SECRET);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(SECRET));
        assert!(!rendered.contains("user:pw"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_short_secret_rejected() {
        let config = Config::new("postgres://db", "redis://cache", "short");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(name, _)) if name == "JWT_SECRET"
        ));
    }

    #[test]
    fn test_refresh_ttl_must_exceed_access_ttl() {
        let mut config = Config::new("postgres://db", "redis://cache", SECRET);
        config.refresh_token_ttl = config.access_token_ttl;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_missing_required() {
        clear_env();
        env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        env::set_var("JWT_SECRET", SECRET);

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar(name)) if name == "DATABASE_URL"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        set_required();
        env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
        env::set_var("JWT_EXPIRATION_SECS", "300");
        env::set_var("JWT_REFRESH_TTL_SECS", "3600");
        env::set_var("LOGIN_RATE_LIMIT", "5");
        env::set_var("REFRESH_COOKIE_SECURE", "false");
        env::set_var("ALLOWED_ORIGINS", "https://a.example, https://b.example");
        env::set_var("TRUSTED_PROXIES", "10.0.0.1, ::1");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.access_token_ttl, Duration::from_secs(300));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.login_rate_limit, 5);
        assert!(!config.refresh_cookie_secure);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(
            config.trusted_proxies,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "::1".parse::<IpAddr>().unwrap()
            ]
        );
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_parse_error() {
        clear_env();
        set_required();
        env::set_var("LOGIN_RATE_LIMIT", "three");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::ParseError(name, _)) if name == "LOGIN_RATE_LIMIT"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_bad_proxy_address() {
        clear_env();
        set_required();
        env::set_var("TRUSTED_PROXIES", "10.0.0.1,proxy.internal");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::ParseError(name, _)) if name == "TRUSTED_PROXIES"));
        clear_env();
    }
}
