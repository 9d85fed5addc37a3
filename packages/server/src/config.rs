use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use email_extraction::PipelineConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string; `None` keeps jobs and quotas in memory.
    pub database_url: Option<String>,
    /// CORS origins; empty allows any origin.
    pub allowed_origins: Vec<String>,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment, or a map in tests).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = PipelineConfig::default();

        let mut pipeline = PipelineConfig::default()
            .with_worker_pool_size(parse(&get, "WORKER_POOL_SIZE")?.unwrap_or(defaults.worker_pool_size))
            .with_sufficiency_threshold(
                parse(&get, "SUFFICIENCY_THRESHOLD")?.unwrap_or(defaults.sufficiency_threshold),
            )
            .with_stage_timeout(secs(&get, "STAGE_TIMEOUT_SECS")?.unwrap_or(defaults.stage_timeout))
            .with_headless_timeout(
                secs(&get, "HEADLESS_TIMEOUT_SECS")?.unwrap_or(defaults.headless_timeout),
            )
            .with_whois_timeout(secs(&get, "WHOIS_TIMEOUT_SECS")?.unwrap_or(defaults.whois_timeout))
            .with_max_retries(parse(&get, "STAGE_MAX_RETRIES")?.unwrap_or(defaults.max_retries))
            .with_requests_per_second(
                parse(&get, "REQUESTS_PER_SECOND")?.unwrap_or(defaults.requests_per_second),
            );

        if let Some(url) = non_empty(&get, "WEBDRIVER_URL") {
            pipeline = pipeline.with_webdriver_url(url);
        }
        if let Some(server) = non_empty(&get, "WHOIS_SERVER") {
            pipeline = pipeline.with_whois_server(server);
        }
        if let Some(user_agent) = non_empty(&get, "CRAWLER_USER_AGENT") {
            pipeline = pipeline.with_user_agent(user_agent);
        }

        Ok(Self {
            port: parse(&get, "PORT")?.unwrap_or(8080),
            database_url: non_empty(&get, "DATABASE_URL"),
            allowed_origins: non_empty(&get, "ALLOWED_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            pipeline,
        })
    }
}

fn non_empty(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty(get, key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("{key} must be a valid number, got {raw:?}"))
        })
        .transpose()
}

fn secs(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>> {
    Ok(parse::<u64>(get, key)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert!(config.database_url.is_none());
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.pipeline.worker_pool_size, 4);
        assert_eq!(config.pipeline.sufficiency_threshold, 1);
    }

    #[test]
    fn reads_pipeline_knobs() {
        let config = config(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/extraction"),
            ("ALLOWED_ORIGINS", "https://app.example, https://admin.example"),
            ("WORKER_POOL_SIZE", "8"),
            ("SUFFICIENCY_THRESHOLD", "3"),
            ("STAGE_TIMEOUT_SECS", "5"),
            ("STAGE_MAX_RETRIES", "0"),
            ("WEBDRIVER_URL", "http://localhost:9515"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/extraction"));
        assert_eq!(
            config.allowed_origins,
            vec!["https://app.example", "https://admin.example"]
        );
        assert_eq!(config.pipeline.worker_pool_size, 8);
        assert_eq!(config.pipeline.sufficiency_threshold, 3);
        assert_eq!(config.pipeline.stage_timeout, Duration::from_secs(5));
        assert_eq!(config.pipeline.max_retries, 0);
        assert_eq!(
            config.pipeline.webdriver_url.as_deref(),
            Some("http://localhost:9515")
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config(&[("WORKER_POOL_SIZE", "many")]).unwrap_err();
        assert!(err.to_string().contains("WORKER_POOL_SIZE"));
    }
}
