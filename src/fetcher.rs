use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::extractor::PriceExtractor;
use crate::utils::error::ScrapeError;
use crate::Result;

/// Sleep seam so retry behavior is testable without real timers.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total fetch attempts before the item's price is declared unavailable.
    pub max_attempts: u32,
    /// Fixed delay imposed after every HTTP attempt, success or failure.
    pub request_delay: Duration,
    /// Uniform jitter range added before each retry.
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_delay: Duration::from_secs(3),
            jitter_min: Duration::from_secs(1),
            jitter_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts,
            request_delay: Duration::from_secs(config.request_delay_secs),
            jitter_min: Duration::from_millis(config.jitter_min_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
        }
    }

    /// Randomized delay before a retry, to avoid synchronized retry storms.
    fn jitter(&self) -> Duration {
        let min = self.jitter_min.as_millis() as u64;
        let max = self.jitter_max.as_millis() as u64;
        if max <= min {
            return self.jitter_min;
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Retrieves a product page and extracts its price, retrying transient
/// failures within the attempt budget.
pub struct PriceFetcher {
    client: reqwest::Client,
    extractor: PriceExtractor,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl PriceFetcher {
    pub fn new(config: &ScraperConfig, extractor: PriceExtractor) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            client,
            extractor,
            policy: RetryPolicy::from_config(config),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Fetch the current price for `url`.
    ///
    /// Network errors, missing structure and missing price nodes are retried
    /// up to the budget; an unparsable price text is a data problem and is
    /// returned immediately. An exhausted budget yields `PriceUnavailable`.
    pub async fn fetch_price(&self, url: &str) -> std::result::Result<Decimal, ScrapeError> {
        for attempt in 1..=self.policy.max_attempts {
            let outcome = self.attempt(url).await;

            // Fixed delay after every request to respect remote rate limits.
            self.sleeper.sleep(self.policy.request_delay).await;

            match outcome {
                Ok(price) => {
                    debug!(url, attempt, %price, "price fetched");
                    return Ok(price);
                }
                Err(err) if err.is_retryable() => {
                    warn!(url, attempt, error = %err, "fetch attempt failed");
                    if attempt < self.policy.max_attempts {
                        self.sleeper.sleep(self.policy.jitter()).await;
                    }
                }
                Err(err) => {
                    warn!(url, attempt, error = %err, "terminal fetch failure");
                    return Err(err);
                }
            }
        }

        Err(ScrapeError::PriceUnavailable {
            attempts: self.policy.max_attempts,
        })
    }

    async fn attempt(&self, url: &str) -> std::result::Result<Decimal, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Network(e.to_string()))?
            .error_for_status()
            .map_err(|e| ScrapeError::Network(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::Network(e.to_string()))?;

        self.extractor.extract(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorPolicy;
    use std::str::FromStr;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Records requested sleeps instead of waiting.
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl RecordingSleeper {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sleeps: Mutex::new(Vec::new()),
            })
        }

        fn count(&self) -> usize {
            self.sleeps.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn test_config() -> ScraperConfig {
        ScraperConfig {
            max_concurrent_checks: 1,
            retry_attempts: 3,
            request_delay_secs: 3,
            jitter_min_ms: 1000,
            jitter_max_ms: 3000,
            request_timeout: 10,
            user_agent: "PricewatchTest/1.0".to_string(),
            selectors: SelectorPolicy::default(),
        }
    }

    fn test_fetcher(sleeper: Arc<dyn Sleeper>) -> PriceFetcher {
        let config = test_config();
        let extractor = PriceExtractor::new(&config.selectors).unwrap();
        PriceFetcher::new(&config, extractor)
            .unwrap()
            .with_sleeper(sleeper)
    }

    fn product_page(price_text: &str) -> String {
        format!(
            r#"<html><body><div class="a-box-group"><span class="a-offscreen">{price_text}</span></div></body></html>"#
        )
    }

    #[tokio::test]
    async fn test_fetch_success_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$520.00")))
            .expect(1)
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let fetcher = test_fetcher(sleeper.clone());
        let price = fetcher.fetch_price(&format!("{}/item", server.uri())).await.unwrap();

        assert_eq!(price, Decimal::from_str("520.00").unwrap());
        // One fixed delay after the single request, no jitter.
        assert_eq!(sleeper.count(), 1);
    }

    #[tokio::test]
    async fn test_network_error_retried_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$480.00")))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(RecordingSleeper::new());
        let price = fetcher.fetch_price(&format!("{}/item", server.uri())).await.unwrap();
        assert_eq!(price, Decimal::from_str("480.00").unwrap());
    }

    #[tokio::test]
    async fn test_budget_exhausted_is_price_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let sleeper = RecordingSleeper::new();
        let fetcher = test_fetcher(sleeper.clone());
        let result = fetcher.fetch_price(&format!("{}/item", server.uri())).await;

        assert_eq!(result, Err(ScrapeError::PriceUnavailable { attempts: 3 }));
        // Three fixed delays plus jitter before the two retries.
        assert_eq!(sleeper.count(), 5);
    }

    #[tokio::test]
    async fn test_structure_not_found_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("<html><body>mid-render</body></html>"),
            )
            .expect(3)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(RecordingSleeper::new());
        let result = fetcher.fetch_price(&format!("{}/item", server.uri())).await;
        assert_eq!(result, Err(ScrapeError::PriceUnavailable { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_parse_error_is_terminal_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/item"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(product_page("Currently unavailable")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher(RecordingSleeper::new());
        let result = fetcher.fetch_price(&format!("{}/item", server.uri())).await;
        assert!(matches!(result, Err(ScrapeError::Parse { .. })));
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.request_delay, Duration::from_secs(3));
        assert_eq!(policy.jitter_min, Duration::from_secs(1));
        assert_eq!(policy.jitter_max, Duration::from_secs(3));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let jitter = policy.jitter();
            assert!(jitter >= policy.jitter_min && jitter <= policy.jitter_max);
        }
    }

    #[test]
    fn test_degenerate_jitter_range() {
        let policy = RetryPolicy {
            jitter_min: Duration::from_secs(2),
            jitter_max: Duration::from_secs(2),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.jitter(), Duration::from_secs(2));
    }
}
