//! HTTP client for the KRX market-data gateway.
//!
//! Implements [`DataProvider`] and [`GateDataSource`] over a JSON gateway.
//! Requests are rate-limited with a sliding window and retried on 429.
//! Absence of data (404 or an empty payload) is an empty sequence, never an
//! error.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use screener_core::{
    Bar, Candidate, DataProvider, GateDataSource, Market, NewsItem, ScreenerConfig, ScreenerError,
    SupplyFlow,
};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const DEFAULT_BASE_URL: &str = "http://localhost:8090";

/// Static source-credibility weights in [0, 1]; unknown outlets get 0.5.
const SOURCE_CREDIBILITY: &[(&str, f64)] = &[
    ("연합뉴스", 0.95),
    ("한국경제", 0.9),
    ("매일경제", 0.9),
    ("서울경제", 0.85),
    ("이데일리", 0.8),
    ("머니투데이", 0.8),
    ("파이낸셜뉴스", 0.75),
    ("아시아경제", 0.7),
];

fn source_credibility(source: &str) -> f64 {
    SOURCE_CREDIBILITY
        .iter()
        .find(|(name, _)| *name == source)
        .map(|(_, weight)| *weight)
        .unwrap_or(0.5)
}

/// Sliding-window rate limiter: at most `max_requests` per `window`.
/// A zero limit would never admit a request, so it is clamped to one.
#[derive(Clone)]
struct RateLimiter {
    sent_at: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            sent_at: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let wait = {
                let mut sent_at = self.sent_at.lock().await;
                let now = Instant::now();

                // Expire timestamps that have left the window
                while sent_at
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    sent_at.pop_front();
                }

                if sent_at.len() < self.max_requests {
                    sent_at.push_back(now);
                    return;
                }

                // Sleep until the oldest in-window request expires
                let oldest = sent_at[0];
                self.window.saturating_sub(now.duration_since(oldest))
                    + Duration::from_millis(50)
            };

            tracing::debug!(
                "Rate limiter: waiting {:.1}s for gateway slot",
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Clone)]
pub struct KrxClient {
    base_url: String,
    token: Option<String>,
    client: Client,
    rate_limiter: RateLimiter,
    config: ScreenerConfig,
}

impl KrxClient {
    pub fn new(config: ScreenerConfig) -> Self {
        let base_url =
            std::env::var("KRX_GATEWAY_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let token = std::env::var("KRX_GATEWAY_TOKEN").ok().filter(|t| !t.is_empty());

        let rate_limit: usize = std::env::var("KRX_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url,
            token,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
            config,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// GET a JSON payload with rate limiting and 429 retry. A 404 is
    /// "no data" and deserializes as None.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ScreenerError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;

            let mut request = self.client.get(&url).query(query);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ScreenerError::ApiError(e.to_string()))?;

            match response.status() {
                StatusCode::NOT_FOUND => return Ok(None),
                StatusCode::TOO_MANY_REQUESTS => {
                    let wait_secs = 5u64 * (attempt as u64 + 1);
                    tracing::warn!(
                        "Gateway 429, waiting {}s before retry {}/3",
                        wait_secs,
                        attempt + 1
                    );
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    continue;
                }
                status if !status.is_success() => {
                    return Err(ScreenerError::ApiError(format!(
                        "HTTP {}: {}",
                        status,
                        response.text().await.unwrap_or_default()
                    )));
                }
                _ => {
                    return response
                        .json::<T>()
                        .await
                        .map(Some)
                        .map_err(|e| ScreenerError::ApiError(e.to_string()));
                }
            }
        }

        Err(ScreenerError::ApiError(
            "Rate limited by gateway after 3 retries".to_string(),
        ))
    }
}

#[derive(Deserialize)]
struct RankingResponse {
    items: Vec<RankingRow>,
}

#[derive(Deserialize)]
struct RankingRow {
    code: String,
    name: String,
    close: f64,
    #[serde(default)]
    open: f64,
    #[serde(default)]
    high: f64,
    #[serde(default)]
    low: f64,
    change_pct: f64,
    #[serde(default)]
    volume: i64,
    trading_value: i64,
    #[serde(default)]
    high_52w: f64,
    #[serde(default)]
    low_52w: f64,
}

#[derive(Deserialize)]
struct BarsResponse {
    bars: Vec<Bar>,
}

#[derive(Deserialize)]
struct FlowsResponse {
    flows: Vec<FlowRow>,
}

#[derive(Deserialize)]
struct FlowRow {
    date: NaiveDate,
    foreign_net: i64,
    inst_net: i64,
}

#[derive(Deserialize)]
struct NewsResponse {
    articles: Vec<NewsRow>,
}

#[derive(Deserialize)]
struct NewsRow {
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    published_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Base candidate filters: change band, price band, minimum turnover and
/// name-keyword exclusions (SPAC / fund / preferred markers).
fn passes_base_filters(row: &RankingRow, config: &ScreenerConfig) -> bool {
    if row.change_pct < config.min_change_pct || row.change_pct > config.max_change_pct {
        return false;
    }
    if row.close < config.min_price || row.close > config.max_price {
        return false;
    }
    if row.trading_value < config.min_trading_value {
        return false;
    }
    if config
        .exclude_keywords
        .iter()
        .any(|kw| row.name.contains(kw.as_str()))
    {
        return false;
    }
    true
}

#[async_trait]
impl DataProvider for KrxClient {
    async fn list_top_movers(
        &self,
        market: Market,
        limit: usize,
    ) -> Result<Vec<Candidate>, ScreenerError> {
        let response: Option<RankingResponse> = self
            .get_json(
                "/v1/ranking/gainers",
                &[
                    ("market", market.as_str().to_string()),
                    ("limit", "100".to_string()),
                ],
            )
            .await?;

        let rows = match response {
            Some(r) => r.items,
            None => return Ok(Vec::new()),
        };

        let mut candidates: Vec<Candidate> = rows
            .into_iter()
            .filter(|row| passes_base_filters(row, &self.config))
            .map(|row| Candidate {
                code: row.code,
                name: row.name,
                market,
                close: row.close,
                open: row.open,
                high: row.high,
                low: row.low,
                change_pct: row.change_pct,
                volume: row.volume,
                trading_value: row.trading_value,
                high_52w: row.high_52w,
                low_52w: row.low_52w,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.change_pct
                .partial_cmp(&a.change_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);

        tracing::info!(
            market = market.as_str(),
            count = candidates.len(),
            "Fetched top movers"
        );
        Ok(candidates)
    }

    async fn chart_history(&self, code: &str, days: u32) -> Result<Vec<Bar>, ScreenerError> {
        let response: Option<BarsResponse> = self
            .get_json(
                &format!("/v1/stocks/{}/daily", code),
                &[("days", days.to_string())],
            )
            .await?;
        Ok(response.map(|r| r.bars).unwrap_or_default())
    }

    async fn supply_series(
        &self,
        code: &str,
        days: u32,
    ) -> Result<Vec<SupplyFlow>, ScreenerError> {
        let response: Option<FlowsResponse> = self
            .get_json(
                &format!("/v1/stocks/{}/investor-flows", code),
                &[("days", days.to_string())],
            )
            .await?;

        Ok(response
            .map(|r| {
                r.flows
                    .into_iter()
                    .map(|f| SupplyFlow {
                        date: f.date,
                        foreign_net: f.foreign_net,
                        inst_net: f.inst_net,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn news(&self, code: &str, limit: usize) -> Result<Vec<NewsItem>, ScreenerError> {
        let response: Option<NewsResponse> = self
            .get_json(
                &format!("/v1/stocks/{}/news", code),
                &[("limit", limit.to_string())],
            )
            .await?;

        Ok(response
            .map(|r| {
                r.articles
                    .into_iter()
                    .map(|a| NewsItem {
                        credibility: source_credibility(&a.source),
                        title: a.title,
                        summary: a.summary,
                        source: a.source,
                        url: a.url,
                        published_at: a.published_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl GateDataSource for KrxClient {
    async fn index_history(&self, market: Market, days: u32) -> Result<Vec<Bar>, ScreenerError> {
        let response: Option<BarsResponse> = self
            .get_json(
                &format!("/v1/index/{}/daily", market.as_str()),
                &[("days", days.to_string())],
            )
            .await?;
        Ok(response.map(|r| r.bars).unwrap_or_default())
    }

    async fn fx_history(&self, days: u32) -> Result<Vec<Bar>, ScreenerError> {
        let response: Option<BarsResponse> = self
            .get_json("/v1/fx/usdkrw/daily", &[("days", days.to_string())])
            .await?;
        Ok(response.map(|r| r.bars).unwrap_or_default())
    }

    async fn sector_history(&self, ticker: &str, days: u32) -> Result<Vec<Bar>, ScreenerError> {
        let response: Option<BarsResponse> = self
            .get_json(
                &format!("/v1/etf/{}/daily", ticker),
                &[("days", days.to_string())],
            )
            .await?;
        Ok(response.map(|r| r.bars).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, change_pct: f64, close: f64, trading_value: i64) -> RankingRow {
        RankingRow {
            code: "000000".to_string(),
            name: name.to_string(),
            close,
            open: close,
            high: close,
            low: close,
            change_pct,
            volume: 0,
            trading_value,
            high_52w: close,
            low_52w: close,
        }
    }

    #[test]
    fn base_filters_enforce_bands() {
        let config = ScreenerConfig::default();

        assert!(passes_base_filters(
            &row("삼성전자", 7.0, 70_000.0, 100_000_000_000),
            &config
        ));
        // Below minimum move
        assert!(!passes_base_filters(
            &row("삼성전자", 3.0, 70_000.0, 100_000_000_000),
            &config
        ));
        // Limit-up excluded
        assert!(!passes_base_filters(
            &row("삼성전자", 30.0, 70_000.0, 100_000_000_000),
            &config
        ));
        // Penny price
        assert!(!passes_base_filters(
            &row("삼성전자", 7.0, 500.0, 100_000_000_000),
            &config
        ));
        // Thin turnover
        assert!(!passes_base_filters(
            &row("삼성전자", 7.0, 70_000.0, 1_000_000_000),
            &config
        ));
    }

    #[test]
    fn base_filters_exclude_funds_and_spacs() {
        let config = ScreenerConfig::default();
        assert!(!passes_base_filters(
            &row("KODEX 레버리지", 7.0, 20_000.0, 100_000_000_000),
            &config
        ));
        assert!(!passes_base_filters(
            &row("하나스팩29호", 7.0, 2_000.0, 100_000_000_000),
            &config
        ));
    }

    #[test]
    fn credibility_defaults_for_unknown_outlets() {
        assert_eq!(source_credibility("연합뉴스"), 0.95);
        assert_eq!(source_credibility("알수없는매체"), 0.5);
    }

    #[tokio::test]
    async fn rate_limiter_clamps_zero_limit_to_one() {
        // A zero limit must still admit requests one at a time instead of
        // hanging or panicking on an empty window
        let limiter = RateLimiter::new(0, Duration::from_millis(10));
        limiter.acquire().await;
        limiter.acquire().await;
    }

    #[tokio::test]
    async fn rate_limiter_delays_once_window_is_full() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        let started = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
