use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraper: ScraperConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    pub max_concurrent_checks: usize,
    pub retry_attempts: u32,
    pub request_delay_secs: u64,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub request_timeout: u64,
    pub user_agent: String,
    pub selectors: SelectorPolicy,
}

/// Where to look for a price on a product page: the expected container, and
/// price selectors tried in priority order with the first match winning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorPolicy {
    pub container: String,
    pub price_selectors: Vec<String>,
}

impl Default for SelectorPolicy {
    fn default() -> Self {
        Self {
            container: "div.a-box-group".to_string(),
            price_selectors: vec![
                "span.a-offscreen".to_string(),
                "#priceblock_ourprice".to_string(),
                "#priceblock_dealprice".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression the watch mode runs cycles on.
    pub check_interval: String,
}

impl SchedulerConfig {
    /// Plausibility check for a 5 or 6 field cron expression.
    pub fn is_valid_cron(cron_expr: &str) -> bool {
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        if !(5..=6).contains(&parts.len()) {
            return false;
        }

        for part in parts {
            if part.is_empty() {
                return false;
            }
            // Allow numbers, ranges, lists, wildcards, and steps
            if !part
                .chars()
                .all(|c| c.is_ascii_digit() || c == '*' || c == '-' || c == ',' || c == '/')
            {
                return false;
            }
        }

        true
    }

    /// The expression in the 6-field form the job scheduler expects: a
    /// classic 5-field expression gets a seconds field prepended.
    pub fn cron_expression(&self) -> String {
        if self.check_interval.split_whitespace().count() == 5 {
            format!("0 {}", self.check_interval)
        } else {
            self.check_interval.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub smtp: SmtpConfig,
    pub recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: String,
    pub use_tls: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default"))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "PRICEWATCH_"
            .add_source(Environment::with_prefix("PRICEWATCH").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Message(
                "Database max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Message(
                "Database min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.scraper.max_concurrent_checks == 0 {
            return Err(ConfigError::Message(
                "Scraper max_concurrent_checks must be greater than 0".into(),
            ));
        }

        if self.scraper.retry_attempts == 0 {
            return Err(ConfigError::Message(
                "Scraper retry_attempts must be greater than 0".into(),
            ));
        }

        if self.scraper.jitter_min_ms > self.scraper.jitter_max_ms {
            return Err(ConfigError::Message(
                "Scraper jitter_min_ms cannot exceed jitter_max_ms".into(),
            ));
        }

        if self.scraper.user_agent.is_empty() {
            return Err(ConfigError::Message("Scraper user_agent must not be empty".into()));
        }

        if self.scraper.selectors.container.is_empty() || self.scraper.selectors.price_selectors.is_empty() {
            return Err(ConfigError::Message(
                "Scraper selector policy needs a container and at least one price selector".into(),
            ));
        }

        if !SchedulerConfig::is_valid_cron(&self.scheduler.check_interval) {
            return Err(ConfigError::Message(
                "Invalid cron expression in scheduler.check_interval".into(),
            ));
        }

        if self.notifications.smtp.port == 0 {
            return Err(ConfigError::Message("SMTP port must be greater than 0".into()));
        }

        Ok(())
    }

}
