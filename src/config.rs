use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub smtp: SmtpConfig,
    pub push: GatewayConfig,
    pub sms: GatewayConfig,
    pub worker: WorkerRetryConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub relay_host: String,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    pub api_key: String,
    /// Only meaningful for the SMS gateway; left empty for push.
    pub from_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerRetryConfig {
    pub workers_per_channel: usize,
    pub poll_interval_ms: u64,
    pub reclaim_interval_secs: u64,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// How long a popped job may go unreported before the stalled-job sweep
    /// reassigns it (§4.4).
    pub stalled_interval_secs: u64,
    /// How many times a job may be reassigned before it is declared dead.
    pub max_stalled_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub template_capacity: usize,
    pub template_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/notify.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            },
            smtp: SmtpConfig {
                relay_host: env::var("SMTP_RELAY_HOST").unwrap_or_else(|_| "localhost".to_string()),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_address: env::var("SMTP_FROM_ADDRESS")
                    .unwrap_or_else(|_| "no-reply@example.com".to_string()),
            },
            push: GatewayConfig {
                url: env::var("PUSH_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:9100/push".to_string()),
                api_key: env::var("PUSH_GATEWAY_API_KEY").unwrap_or_default(),
                from_number: String::new(),
            },
            sms: GatewayConfig {
                url: env::var("SMS_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:9200/sms".to_string()),
                api_key: env::var("SMS_GATEWAY_API_KEY").unwrap_or_default(),
                from_number: env::var("SMS_FROM_NUMBER").unwrap_or_default(),
            },
            worker: WorkerRetryConfig {
                workers_per_channel: env::var("WORKER_CONCURRENCY_PER_CHANNEL")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
                poll_interval_ms: env::var("WORKER_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500),
                reclaim_interval_secs: env::var("WORKER_RECLAIM_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                initial_backoff_secs: env::var("WORKER_INITIAL_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
                max_backoff_secs: env::var("WORKER_MAX_BACKOFF_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                stalled_interval_secs: env::var("WORKER_STALLED_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                max_stalled_count: env::var("WORKER_MAX_STALLED_COUNT")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .unwrap_or(1),
            },
            cache: CacheConfig {
                template_capacity: env::var("TEMPLATE_CACHE_CAPACITY")
                    .unwrap_or_else(|_| "256".to_string())
                    .parse()
                    .unwrap_or(256),
                template_ttl_secs: env::var("TEMPLATE_CACHE_TTL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://data/notify.db".to_string(),
                max_connections: 5,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
            },
            smtp: SmtpConfig {
                relay_host: "localhost".to_string(),
                username: String::new(),
                password: String::new(),
                from_address: "no-reply@example.com".to_string(),
            },
            push: GatewayConfig {
                url: "http://localhost:9100/push".to_string(),
                api_key: String::new(),
                from_number: String::new(),
            },
            sms: GatewayConfig {
                url: "http://localhost:9200/sms".to_string(),
                api_key: String::new(),
                from_number: String::new(),
            },
            worker: WorkerRetryConfig {
                workers_per_channel: 2,
                poll_interval_ms: 500,
                reclaim_interval_secs: 5,
                initial_backoff_secs: 1,
                max_backoff_secs: 300,
                stalled_interval_secs: 5,
                max_stalled_count: 1,
            },
            cache: CacheConfig {
                template_capacity: 256,
                template_ttl_secs: 300,
            },
        }
    }
}
