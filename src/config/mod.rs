use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub hooks: HookConfig,
    pub query: QueryConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    /// Row identifier column used to correlate pre- and post-images
    pub id_field: String,
    /// Warn when a column hook is registered after the model's relevance set was cached
    pub warn_on_stale_relevance: bool,
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub max_limit: Option<u32>,
    pub debug_logging: bool,
}

impl Default for HookConfig {
    fn default() -> Self {
        AppConfig::development().hooks
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        AppConfig::development().query
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Hook overrides
        if let Ok(v) = env::var("HOOKS_ID_FIELD") {
            if !v.trim().is_empty() {
                self.hooks.id_field = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var("HOOKS_WARN_ON_STALE_RELEVANCE") {
            self.hooks.warn_on_stale_relevance = v.parse().unwrap_or(self.hooks.warn_on_stale_relevance);
        }
        if let Ok(v) = env::var("HOOKS_DEBUG_LOGGING") {
            self.hooks.debug_logging = v.parse().unwrap_or(self.hooks.debug_logging);
        }

        // Query overrides
        if let Ok(v) = env::var("QUERY_MAX_LIMIT") {
            self.query.max_limit = v.parse().ok();
        }
        if let Ok(v) = env::var("QUERY_DEBUG_LOGGING") {
            self.query.debug_logging = v.parse().unwrap_or(self.query.debug_logging);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            hooks: HookConfig {
                id_field: "id".to_string(),
                warn_on_stale_relevance: true,
                debug_logging: true,
            },
            query: QueryConfig {
                max_limit: Some(1000),
                debug_logging: true,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            hooks: HookConfig {
                id_field: "id".to_string(),
                warn_on_stale_relevance: true,
                debug_logging: false,
            },
            query: QueryConfig {
                max_limit: Some(500),
                debug_logging: false,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            hooks: HookConfig {
                id_field: "id".to_string(),
                warn_on_stale_relevance: false,
                debug_logging: false,
            },
            query: QueryConfig {
                max_limit: Some(100),
                debug_logging: false,
            },
        }
    }
}

// Global singleton config - initialized once at first use
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.hooks.id_field, "id");
        assert_eq!(config.query.max_limit, Some(1000));
        assert!(config.hooks.warn_on_stale_relevance);
    }

    #[test]
    fn test_default_production_config() {
        let config = AppConfig::production();
        assert_eq!(config.query.max_limit, Some(100));
        assert!(!config.hooks.debug_logging);
    }
}
