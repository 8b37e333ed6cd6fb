use crate::{Bar, Candidate, Market, NewsClassification, NewsItem, ScreenerError, SupplyFlow};
use async_trait::async_trait;

/// Per-candidate market data source. Absence of data is signalled with an
/// empty sequence, never an error.
#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn list_top_movers(
        &self,
        market: Market,
        limit: usize,
    ) -> Result<Vec<Candidate>, ScreenerError>;

    async fn chart_history(&self, code: &str, days: u32) -> Result<Vec<Bar>, ScreenerError>;

    async fn supply_series(&self, code: &str, days: u32)
        -> Result<Vec<SupplyFlow>, ScreenerError>;

    async fn news(&self, code: &str, limit: usize) -> Result<Vec<NewsItem>, ScreenerError>;
}

/// Index / FX / sector series consumed by the market gate
#[async_trait]
pub trait GateDataSource: Send + Sync {
    async fn index_history(&self, market: Market, days: u32) -> Result<Vec<Bar>, ScreenerError>;

    async fn fx_history(&self, days: u32) -> Result<Vec<Bar>, ScreenerError>;

    async fn sector_history(&self, ticker: &str, days: u32) -> Result<Vec<Bar>, ScreenerError>;
}

/// Headline favorability classifier. Implementations must be substitutable:
/// the LLM-backed strategy and the deterministic keyword fallback share this
/// contract and are selected at construction time.
#[async_trait]
pub trait NewsClassifier: Send + Sync {
    async fn classify(
        &self,
        stock_name: &str,
        news: &[NewsItem],
    ) -> Result<NewsClassification, ScreenerError>;
}
