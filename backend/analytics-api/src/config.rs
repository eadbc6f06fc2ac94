use serde::Deserialize;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    /// `username:password` guarding `/metrics`.
    pub metrics_auth: String,
    pub analytics: AnalyticsConfig,
}

/// Tunables of the analytics engine, read from the `[analytics]` table.
/// Defaults match the behavior the study app shipped with; overriding them is
/// mostly useful in staging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub cache_ttl_secs: u64,
    pub history_retention_days: i64,
    pub monthly_window_months: usize,
    pub study_time_window_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            history_retention_days: 30,
            monthly_window_months: 6,
            study_time_window_days: 7,
        }
    }
}

impl AnalyticsConfig {
    /// Clamps every tunable into a range the engine can work with.
    pub fn normalized(self) -> Self {
        Self {
            cache_ttl_secs: self.cache_ttl_secs.max(1),
            history_retention_days: self.history_retention_days.clamp(1, 3650),
            monthly_window_months: self.monthly_window_months.clamp(1, 120),
            study_time_window_days: self.study_time_window_days.clamp(1, 366),
        }
    }

    fn from_settings(settings: &config::Config) -> Result<Self, config::ConfigError> {
        match settings.get::<AnalyticsConfig>("analytics") {
            Ok(analytics) => Ok(analytics.normalized()),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Resolves a secret that must be configured in production. Other
/// environments fall back to `dev_default` with a warning.
fn required_secret(
    value: Option<String>,
    env: &str,
    name: &str,
    dev_default: &str,
) -> Result<String, config::ConfigError> {
    match value {
        Some(secret) if !secret.is_empty() => Ok(secret),
        _ if env == "prod" => Err(config::ConfigError::Message(format!(
            "{} must be set in production",
            name
        ))),
        _ => {
            eprintln!("WARNING: Using default {} (dev mode only!)", name);
            Ok(dev_default.to_string())
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let listen_addr = settings
            .get_string("server.listen_addr")
            .or_else(|_| env::var("LISTEN_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                format!("redis://{}:{}/0", host, port)
            });

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "examprep".to_string());

        let jwt_secret = required_secret(
            settings
                .get_string("auth.jwt_secret")
                .or_else(|_| env::var("JWT_SECRET"))
                .ok(),
            &env,
            "JWT_SECRET",
            "dev-secret-only-for-local-testing",
        )?;

        let metrics_auth = required_secret(
            settings
                .get_string("metrics.auth")
                .or_else(|_| env::var("METRICS_AUTH"))
                .ok(),
            &env,
            "METRICS_AUTH",
            "metrics:dev-only",
        )?;

        let analytics = AnalyticsConfig::from_settings(&settings)?;

        Ok(Config {
            listen_addr,
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            metrics_auth,
            analytics,
        })
    }

    /// Configuration for tests that never touch a real backend.
    pub fn for_tests() -> Self {
        Config {
            listen_addr: "127.0.0.1:0".to_string(),
            mongo_uri: "mongodb://localhost:27017".to_string(),
            redis_uri: "redis://127.0.0.1:6379/0".to_string(),
            mongo_database: "examprep_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            metrics_auth: "metrics:test-secret".to_string(),
            analytics: AnalyticsConfig::default(),
        }
    }
}
