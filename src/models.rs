use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Redis connection pool size
    pub pool_size: u32,
}

/// Request inspection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionConfig {
    /// Whether the inspection middleware is part of the pipeline
    pub enabled: bool,
    /// In-window violation count that triggers a temporary block
    pub block_threshold: u32,
    /// How long a temporary block lasts (minutes)
    pub block_duration_minutes: i64,
    /// Trailing window used to count violations (minutes)
    pub track_window_minutes: i64,
    /// Additional path patterns on top of the built-in catalog
    #[serde(default)]
    pub extra_path_rules: Vec<String>,
    /// Additional query string patterns on top of the built-in catalog
    #[serde(default)]
    pub extra_query_rules: Vec<String>,
    /// Additional user-agent patterns on top of the built-in catalog
    #[serde(default)]
    pub extra_user_agent_rules: Vec<String>,
}

/// Quota for one route category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteQuota {
    /// Requests allowed per minute
    pub per_minute: u32,
    /// Requests allowed per hour
    pub per_hour: u32,
}

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether the admission middleware is part of the pipeline
    pub enabled: bool,
    /// Counter storage backend ("memory" or "redis")
    pub storage: String,
    /// Quota applied to routes without a named override
    pub default_quota: RouteQuota,
    /// Per-route-category overrides, keyed by category name
    #[serde(default)]
    pub routes: HashMap<String, RouteQuota>,
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Whether alerts are delivered (a no-op transport is used otherwise)
    pub enabled: bool,
    /// Minimum interval between alerts sharing a throttle key (minutes)
    pub cooldown_minutes: i64,
    /// Email API endpoint
    pub api_url: String,
    /// Email API token
    pub api_key: String,
    /// Sender address
    pub from_email: String,
    /// Operator address receiving security alerts
    pub alert_email: String,
}

/// Housekeeping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Interval between sweeps of tracker and throttle state (seconds)
    pub interval_seconds: u64,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Request inspection configuration
    pub inspection: InspectionConfig,
    /// Rate limit configuration
    pub rate_limit: RateLimitConfig,
    /// Alerting configuration
    pub alerts: AlertConfig,
    /// Housekeeping configuration
    pub housekeeping: HousekeepingConfig,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_threshold: 10,
            block_duration_minutes: 60,
            track_window_minutes: 5,
            extra_path_rules: Vec::new(),
            extra_query_rules: Vec::new(),
            extra_user_agent_rules: Vec::new(),
        }
    }
}

impl Default for RouteQuota {
    fn default() -> Self {
        Self {
            per_minute: 200,
            per_hour: 5000,
        }
    }
}

/// Built-in per-category quota overrides. Authentication endpoints get
/// strict limits to slow brute force; bulk admin operations and file
/// uploads get moderate ones.
pub fn default_route_quotas() -> HashMap<String, RouteQuota> {
    let mut routes = HashMap::new();
    routes.insert(
        "login".to_string(),
        RouteQuota {
            per_minute: 5,
            per_hour: 100,
        },
    );
    routes.insert(
        "password_reset".to_string(),
        RouteQuota {
            per_minute: 3,
            per_hour: 50,
        },
    );
    routes.insert(
        "register".to_string(),
        RouteQuota {
            per_minute: 10,
            per_hour: 200,
        },
    );
    routes.insert(
        "token_refresh".to_string(),
        RouteQuota {
            per_minute: 30,
            per_hour: 1000,
        },
    );
    routes.insert(
        "admin".to_string(),
        RouteQuota {
            per_minute: 100,
            per_hour: 2000,
        },
    );
    routes.insert(
        "admin_bulk".to_string(),
        RouteQuota {
            per_minute: 10,
            per_hour: 300,
        },
    );
    routes.insert(
        "upload".to_string(),
        RouteQuota {
            per_minute: 20,
            per_hour: 400,
        },
    );
    routes.insert(
        "health".to_string(),
        RouteQuota {
            per_minute: 100,
            per_hour: 5000,
        },
    );
    routes
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: "memory".to_string(),
            default_quota: RouteQuota::default(),
            routes: default_route_quotas(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown_minutes: 60,
            api_url: "https://api.resend.com/emails".to_string(),
            api_key: String::new(),
            from_email: "security@example.com".to_string(),
            alert_email: "ops@example.com".to_string(),
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                pool_size: 10,
            },
            inspection: InspectionConfig::default(),
            rate_limit: RateLimitConfig::default(),
            alerts: AlertConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}
