use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub supabase: SupabaseConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_version: String,
}

/// Hosted auth + row store. Both fields are required at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
    pub anon_key: Option<String>,
}

// Keys stay out of logs.
impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &"<redacted>")
            .field("anon_key", &self.anon_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Direct Postgres access to the `profiles` table. When unset, rows go through PostgREST.
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub cors_origins: Vec<String>,
    pub permissive_cors: bool,
    pub require_https: bool,
    pub csrf_secret: Option<String>,
}

/// Per-client-IP budgets. `max_requests` covers everything under the API
/// prefix; `auth_max_requests` additionally covers the credential endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_ms: u64,
    pub max_requests: u32,
    pub auth_max_requests: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let supabase = SupabaseConfig {
            url: required(&lookup, "SUPABASE_URL")?,
            service_role_key: required(&lookup, "SUPABASE_SERVICE_ROLE_KEY")?,
            anon_key: lookup("SUPABASE_ANON_KEY").filter(|v| !v.is_empty()),
        };
        url::Url::parse(&supabase.url).map_err(|_| ConfigError::InvalidValue {
            name: "SUPABASE_URL",
            value: supabase.url.clone(),
        })?;

        // Set defaults based on environment, then override with specific env vars
        let config = match environment {
            Environment::Production => Self::production(supabase),
            Environment::Staging => Self::staging(supabase),
            Environment::Development => Self::development(supabase),
        };

        config.with_overrides(&lookup)
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "PORT", value: v })?;
        }
        if let Some(v) = lookup("API_VERSION") {
            self.server.api_version = v;
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = Some(v);
        }
        if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Some(v) = lookup("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Some(v) = lookup("ALLOWED_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            self.security.permissive_cors = false;
        }
        if let Some(v) = lookup("SECURITY_REQUIRE_HTTPS") {
            self.security.require_https = v.parse().unwrap_or(self.security.require_https);
        }
        if let Some(v) = lookup("CSRF_SECRET").filter(|v| !v.is_empty()) {
            self.security.csrf_secret = Some(v);
        }

        // Rate limit overrides
        if let Some(v) = lookup("RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = v.parse().unwrap_or(self.rate_limit.enabled);
        }
        if let Some(v) = lookup("RATE_LIMIT_WINDOW_MS") {
            self.rate_limit.window_ms = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "RATE_LIMIT_WINDOW_MS", value: v })?;
        }
        if let Some(v) = lookup("RATE_LIMIT_MAX_REQUESTS") {
            self.rate_limit.max_requests = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "RATE_LIMIT_MAX_REQUESTS", value: v })?;
        }
        if let Some(v) = lookup("RATE_LIMIT_AUTH_MAX_REQUESTS") {
            self.rate_limit.auth_max_requests = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "RATE_LIMIT_AUTH_MAX_REQUESTS", value: v })?;
        }

        // Logging overrides
        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }

        Ok(self)
    }

    fn development(supabase: SupabaseConfig) -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
                api_version: "v1".to_string(),
            },
            supabase,
            database: DatabaseConfig {
                url: None,
                max_connections: 5,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                cors_origins: vec!["http://localhost:5173".to_string()],
                permissive_cors: true,
                require_https: false,
                csrf_secret: None,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                window_ms: 60_000,
                max_requests: 1000,
                auth_max_requests: 100,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
            },
        }
    }

    fn staging(supabase: SupabaseConfig) -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
                api_version: "v1".to_string(),
            },
            supabase,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://staging.u-recover.app".to_string()],
                permissive_cors: false,
                require_https: true,
                csrf_secret: None,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                window_ms: 900_000,
                max_requests: 100,
                auth_max_requests: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    fn production(supabase: SupabaseConfig) -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
                api_version: "v1".to_string(),
            },
            supabase,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                cors_origins: vec!["https://u-recover.app".to_string()],
                permissive_cors: false,
                require_https: true,
                csrf_secret: None,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                window_ms: 900_000,
                max_requests: 100,
                auth_max_requests: 5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }

    /// Path prefix every API router is nested under, e.g. `/api/v1`.
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.server.api_version)
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingEnvVar(name))
}

// Global config - initialized once at startup by the server binary
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// Load the configuration from the environment and install it process-wide.
pub fn init() -> Result<&'static AppConfig, ConfigError> {
    CONFIG.get_or_try_init(AppConfig::from_env)
}

#[macro_export]
macro_rules! is_production {
    ($config:expr) => {
        matches!($config.environment, $crate::config::Environment::Production)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 2] = [
        ("SUPABASE_URL", "https://project.supabase.co"),
        ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
    ];

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::from_lookup(lookup_from(&BASE)).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.api_prefix(), "/api/v1");
        assert!(config.security.permissive_cors);
        assert!(config.database.url.is_none());
        assert!(config.security.csrf_secret.is_none());
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_default_production_config() {
        let mut pairs = BASE.to_vec();
        pairs.push(("APP_ENV", "production"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(is_production!(config));
        assert!(config.security.require_https);
        assert!(!config.security.permissive_cors);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.window_ms, 900_000);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.auth_max_requests, 5);
    }

    #[test]
    fn test_rate_limit_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("RATE_LIMIT_ENABLED", "true"),
            ("RATE_LIMIT_WINDOW_MS", "60000"),
            ("RATE_LIMIT_MAX_REQUESTS", "20"),
            ("RATE_LIMIT_AUTH_MAX_REQUESTS", "3"),
        ]);
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.rate_limit.max_requests, 20);
        assert_eq!(config.rate_limit.auth_max_requests, 3);

        pairs.push(("RATE_LIMIT_MAX_REQUESTS", "lots"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "RATE_LIMIT_MAX_REQUESTS", .. }));
    }

    #[test]
    fn test_missing_supabase_url_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("SUPABASE_SERVICE_ROLE_KEY", "k")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("SUPABASE_URL")));
    }

    #[test]
    fn test_missing_service_key_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x.supabase.co")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("SUPABASE_SERVICE_ROLE_KEY")));
    }

    #[test]
    fn test_env_overrides() {
        let mut pairs = BASE.to_vec();
        pairs.extend([
            ("PORT", "8080"),
            ("API_VERSION", "v2"),
            ("ALLOWED_ORIGINS", "https://a.test, https://b.test"),
            ("CSRF_SECRET", "shh"),
            ("DATABASE_URL", "postgres://localhost/urecover"),
        ]);
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.api_prefix(), "/api/v2");
        assert_eq!(config.security.cors_origins, vec!["https://a.test", "https://b.test"]);
        assert!(!config.security.permissive_cors);
        assert_eq!(config.security.csrf_secret.as_deref(), Some("shh"));
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/urecover"));
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let mut pairs = BASE.to_vec();
        pairs.push(("PORT", "not-a-port"));
        let err = AppConfig::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "PORT", .. }));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = AppConfig::from_lookup(lookup_from(&BASE)).unwrap();
        let debug = format!("{:?}", config.supabase);
        assert!(!debug.contains("service-key"));
        assert!(debug.contains("<redacted>"));
    }
}
