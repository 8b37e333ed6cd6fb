//! Screening orchestrator: candidate collection, scoring, grading, sizing
//! and result assembly.
//!
//! Candidates are processed strictly sequentially with a fixed
//! inter-candidate delay (a courtesy to rate-limited upstreams). Each
//! candidate is isolated: per-feed fetch failures degrade to empty data,
//! and any candidate-level fault is recorded as a [`SkipReason`] and
//! skipped, never aborting the batch.

use chrono::Utc;
use position_sizer::PositionSizer;
use screener_core::{
    Candidate, DataProvider, Grade, NewsClassifier, NewsRef, ScreenerConfig, ScreenerResult,
    Signal, SignalStatus, SupplyAnalysis, SupplySnapshot,
};
use signal_scorer::Scorer;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Chart history window per candidate
const CHART_DAYS: u32 = 60;
/// Supply series window per candidate
const SUPPLY_DAYS: u32 = 30;
/// News headlines per candidate
const NEWS_LIMIT: usize = 5;
/// News references carried on a Signal
const NEWS_REFS: usize = 3;

/// Why a candidate produced no Signal. Kept explicit so skip causes are
/// inspectable and testable rather than silently suppressed.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Graded C: do not trade
    GradeTooLow { grade: Grade, total: u8 },
    /// Unexpected candidate-level fault; the batch continues
    Fault(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::GradeTooLow { grade, total } => {
                write!(f, "grade {} ({} pts)", grade.as_str(), total)
            }
            SkipReason::Fault(msg) => write!(f, "fault: {}", msg),
        }
    }
}

pub struct ScreenerEngine {
    provider: Arc<dyn DataProvider>,
    classifier: Arc<dyn NewsClassifier>,
    scorer: Scorer,
    config: ScreenerConfig,
}

impl ScreenerEngine {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        classifier: Arc<dyn NewsClassifier>,
        config: ScreenerConfig,
    ) -> Self {
        Self {
            provider,
            classifier,
            scorer: Scorer::new(config.clone()),
            config,
        }
    }

    /// Run one screening pass over both markets and return the ranked result.
    /// A run with zero analyzable candidates still returns a well-formed
    /// empty result.
    pub async fn run(&self, capital: f64) -> ScreenerResult {
        let started = Instant::now();
        let today = Utc::now().date_naive();

        tracing::info!(capital, "Starting screener run");

        let sizer = PositionSizer::new(
            capital,
            self.config.risk_ratio,
            self.config.stop_loss_pct,
            self.config.take_profit_pct,
        );

        let candidates = self.collect_candidates().await;
        let total_candidates = candidates.len();
        if candidates.is_empty() {
            tracing::warn!("No candidates to analyze");
            return ScreenerResult::empty(today);
        }

        let mut signals: Vec<Signal> = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            match self.process_candidate(candidate, &sizer).await {
                Ok(signal) => {
                    tracing::info!(
                        "[{}/{}] {} {}: grade {} ({} pts)",
                        i + 1,
                        total_candidates,
                        candidate.code,
                        candidate.name,
                        signal.grade.as_str(),
                        signal.score.total()
                    );
                    signals.push(signal);
                }
                Err(reason) => {
                    tracing::debug!(
                        "[{}/{}] {} {} skipped: {}",
                        i + 1,
                        total_candidates,
                        candidate.code,
                        candidate.name,
                        reason
                    );
                }
            }

            if self.config.candidate_delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.candidate_delay_ms,
                ))
                .await;
            }
        }

        let mut by_grade: HashMap<String, usize> = HashMap::new();
        let mut by_market: HashMap<String, usize> = HashMap::new();
        for signal in &signals {
            *by_grade.entry(signal.grade.as_str().to_string()).or_insert(0) += 1;
            *by_market
                .entry(signal.market.as_str().to_string())
                .or_insert(0) += 1;
        }

        sort_signals(&mut signals);

        let result = ScreenerResult {
            date: today,
            total_candidates,
            filtered_count: signals.len(),
            signals,
            by_grade,
            by_market,
            processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        tracing::info!(
            total = result.total_candidates,
            filtered = result.filtered_count,
            elapsed_ms = result.processing_time_ms,
            "Screener run complete"
        );

        result
    }

    /// Bounded top-movers from both market segments. A failed listing is an
    /// empty contribution, not a run failure.
    async fn collect_candidates(&self) -> Vec<Candidate> {
        let kospi = self
            .provider
            .list_top_movers(screener_core::Market::Kospi, self.config.kospi_limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("KOSPI listing failed: {}", e);
                Vec::new()
            });
        let kosdaq = self
            .provider
            .list_top_movers(screener_core::Market::Kosdaq, self.config.kosdaq_limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("KOSDAQ listing failed: {}", e);
                Vec::new()
            });

        let mut candidates = kospi;
        candidates.extend(kosdaq);
        candidates
    }

    /// Collect, score, grade and size one candidate. Every per-feed fetch is
    /// best-effort: a failure yields empty data for that feed only.
    pub async fn process_candidate(
        &self,
        candidate: &Candidate,
        sizer: &PositionSizer,
    ) -> Result<Signal, SkipReason> {
        if candidate.close <= 0.0 {
            return Err(SkipReason::Fault("non-positive close price".to_string()));
        }

        let bars = self
            .provider
            .chart_history(&candidate.code, CHART_DAYS)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("{} chart fetch failed: {}", candidate.code, e);
                Vec::new()
            });

        let flows = self
            .provider
            .supply_series(&candidate.code, SUPPLY_DAYS)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("{} supply fetch failed: {}", candidate.code, e);
                Vec::new()
            });
        let supply = (!flows.is_empty()).then(|| SupplySnapshot::from_series(&flows));
        let supply_analysis = supply.as_ref().map(SupplyAnalysis::from_snapshot);

        let news = self
            .provider
            .news(&candidate.code, NEWS_LIMIT)
            .await
            .unwrap_or_else(|e| {
                tracing::debug!("{} news fetch failed: {}", candidate.code, e);
                Vec::new()
            });

        let classification = if news.is_empty() {
            None
        } else {
            self.classifier
                .classify(&candidate.name, &news)
                .await
                .map_err(|e| {
                    tracing::debug!("{} classification failed: {}", candidate.code, e);
                    e
                })
                .ok()
        };

        let (score, checklist) =
            self.scorer
                .score(candidate, &bars, &news, supply.as_ref(), classification.as_ref());
        let grade = self.scorer.determine_grade(candidate, &score);

        if grade == Grade::C {
            return Err(SkipReason::GradeTooLow {
                grade,
                total: score.total(),
            });
        }

        let entry_price = candidate.close;
        let stop_price = sizer.stop_loss(entry_price);
        let target_price = sizer.target_price(entry_price);
        let plan = sizer.calculate_position(entry_price, stop_price, grade);

        Ok(Signal {
            stock_code: candidate.code.clone(),
            stock_name: candidate.name.clone(),
            market: candidate.market,
            signal_date: Utc::now().date_naive(),
            grade,
            score,
            checklist,
            news_items: news
                .iter()
                .take(NEWS_REFS)
                .map(|n| NewsRef {
                    title: n.title.clone(),
                    source: n.source.clone(),
                    url: n.url.clone(),
                })
                .collect(),
            supply,
            supply_analysis,
            entry_price,
            stop_price,
            target_price,
            r_value: plan.r_value,
            position_value: plan.position_value,
            quantity: plan.quantity,
            r_multiplier: grade.risk_profile().r_multiplier,
            trading_value: candidate.trading_value,
            change_pct: candidate.change_pct,
            status: SignalStatus::Pending,
            created_at: Utc::now(),
        })
    }
}

/// Grade-major ascending (S before A before B), score-total descending.
pub fn sort_signals(signals: &mut [Signal]) {
    signals.sort_by(|a, b| {
        a.grade
            .rank()
            .cmp(&b.grade.rank())
            .then(b.score.total().cmp(&a.score.total()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use screener_core::{
        Bar, ChecklistFlags, Market, NewsClassification, NewsItem, ScoreBreakdown, ScreenerError,
        SupplyFlow,
    };

    fn candidate(code: &str, market: Market, close: f64, trading_value: i64) -> Candidate {
        Candidate {
            code: code.to_string(),
            name: format!("종목{}", code),
            market,
            close,
            open: close * 0.96,
            high: close * 1.005,
            low: close * 0.95,
            change_pct: 8.0,
            volume: 1_000_000,
            trading_value,
            high_52w: close,
            low_52w: close * 0.5,
        }
    }

    fn rising_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let price = 100.0 + i as f64;
                Bar {
                    date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
                        + chrono::Days::new(i as u64),
                    open: price,
                    high: price * 1.01,
                    low: price * 0.99,
                    close: price,
                    volume: 100_000,
                }
            })
            .collect()
    }

    struct RichProvider {
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl DataProvider for RichProvider {
        async fn list_top_movers(
            &self,
            market: Market,
            _limit: usize,
        ) -> Result<Vec<Candidate>, ScreenerError> {
            Ok(self
                .candidates
                .iter()
                .filter(|c| c.market == market)
                .cloned()
                .collect())
        }

        async fn chart_history(&self, _code: &str, _days: u32) -> Result<Vec<Bar>, ScreenerError> {
            Ok(rising_bars(80))
        }

        async fn supply_series(
            &self,
            _code: &str,
            _days: u32,
        ) -> Result<Vec<SupplyFlow>, ScreenerError> {
            Ok((1..=10)
                .map(|d| SupplyFlow {
                    date: NaiveDate::from_ymd_opt(2025, 1, d).unwrap(),
                    foreign_net: 1_000,
                    inst_net: 1_000,
                })
                .collect())
        }

        async fn news(&self, _code: &str, _limit: usize) -> Result<Vec<NewsItem>, ScreenerError> {
            Ok(vec![NewsItem {
                title: "대규모 수주 계약체결".to_string(),
                summary: String::new(),
                source: "연합뉴스".to_string(),
                url: "https://news.example/1".to_string(),
                credibility: 0.95,
                published_at: None,
            }])
        }
    }

    struct FailingProvider {
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl DataProvider for FailingProvider {
        async fn list_top_movers(
            &self,
            market: Market,
            _limit: usize,
        ) -> Result<Vec<Candidate>, ScreenerError> {
            Ok(self
                .candidates
                .iter()
                .filter(|c| c.market == market)
                .cloned()
                .collect())
        }

        async fn chart_history(&self, _code: &str, _days: u32) -> Result<Vec<Bar>, ScreenerError> {
            Err(ScreenerError::ApiError("chart down".to_string()))
        }

        async fn supply_series(
            &self,
            _code: &str,
            _days: u32,
        ) -> Result<Vec<SupplyFlow>, ScreenerError> {
            Err(ScreenerError::ApiError("supply down".to_string()))
        }

        async fn news(&self, _code: &str, _limit: usize) -> Result<Vec<NewsItem>, ScreenerError> {
            Err(ScreenerError::ApiError("news down".to_string()))
        }
    }

    struct FixedClassifier {
        score: u8,
    }

    #[async_trait]
    impl NewsClassifier for FixedClassifier {
        async fn classify(
            &self,
            _stock_name: &str,
            _news: &[NewsItem],
        ) -> Result<NewsClassification, ScreenerError> {
            Ok(NewsClassification {
                score: self.score,
                reason: "테스트".to_string(),
            })
        }
    }

    fn test_config() -> ScreenerConfig {
        ScreenerConfig {
            candidate_delay_ms: 0,
            ..ScreenerConfig::default()
        }
    }

    fn signal_stub(grade: Grade, news: u8, trading_value: u8) -> Signal {
        Signal {
            stock_code: "000000".to_string(),
            stock_name: "stub".to_string(),
            market: Market::Kospi,
            signal_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            grade,
            score: ScoreBreakdown {
                news,
                trading_value,
                chart: 2,
                candle: 1,
                consolidation: 1,
                supply: 2,
                rationale: None,
            },
            checklist: ChecklistFlags::default(),
            news_items: Vec::new(),
            supply: None,
            supply_analysis: None,
            entry_price: 0.0,
            stop_price: 0.0,
            target_price: 0.0,
            r_value: 0.0,
            position_value: 0.0,
            quantity: 0,
            r_multiplier: 0.0,
            trading_value: 0,
            change_pct: 0.0,
            status: SignalStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn strong_candidate_produces_s_grade_signal() {
        let provider = Arc::new(RichProvider {
            candidates: vec![candidate("005930", Market::Kospi, 100_000.0, 1_200_000_000_000)],
        });
        let engine = ScreenerEngine::new(
            provider,
            Arc::new(FixedClassifier { score: 3 }),
            test_config(),
        );

        let result = engine.run(100_000_000.0).await;

        // news 3 + value 3 + chart 2 + candle 1 + supply 2 >= 10, turnover > 1e12
        assert_eq!(result.total_candidates, 1);
        assert_eq!(result.filtered_count, 1);
        let signal = &result.signals[0];
        assert_eq!(signal.grade, Grade::S);
        assert_eq!(signal.status, SignalStatus::Pending);
        assert!(signal.quantity > 0);
        assert_eq!(result.by_grade.get("S"), Some(&1));
        assert_eq!(result.by_market.get("KOSPI"), Some(&1));
        assert_eq!(signal.news_items.len(), 1);

        // Ten days of steady foreign+inst buying: the smart-money read rides
        // along on the signal with the raw trailing windows
        let snapshot = signal.supply.as_ref().unwrap();
        assert_eq!(snapshot.foreign_net_20d, 10_000);
        assert_eq!(snapshot.foreign_streak, 10);
        let analysis = signal.supply_analysis.as_ref().unwrap();
        // 50 +5 (foreign net buy) +10 +5 (capped streaks) +10 (double buy)
        assert_eq!(analysis.score, 80.0);
        assert!(analysis.stage.is_accumulating());
    }

    #[tokio::test]
    async fn failing_feeds_degrade_to_c_grade_not_errors() {
        let provider = Arc::new(FailingProvider {
            candidates: vec![candidate("000100", Market::Kosdaq, 10_000.0, 60_000_000_000)],
        });
        let engine = ScreenerEngine::new(
            provider,
            Arc::new(FixedClassifier { score: 3 }),
            test_config(),
        );

        let result = engine.run(100_000_000.0).await;

        // Every per-candidate fetch fails; the run still completes cleanly
        assert_eq!(result.total_candidates, 1);
        assert_eq!(result.filtered_count, 0);
        assert!(result.signals.is_empty());
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_empty_result() {
        let provider = Arc::new(RichProvider { candidates: vec![] });
        let engine = ScreenerEngine::new(
            provider,
            Arc::new(FixedClassifier { score: 0 }),
            test_config(),
        );

        let result = engine.run(100_000_000.0).await;
        assert_eq!(result.total_candidates, 0);
        assert_eq!(result.filtered_count, 0);
    }

    #[tokio::test]
    async fn weak_candidate_is_skipped_with_inspectable_reason() {
        let provider = Arc::new(RichProvider {
            candidates: vec![candidate("000200", Market::Kosdaq, 10_000.0, 60_000_000_000)],
        });
        let engine = ScreenerEngine::new(
            provider.clone(),
            Arc::new(FixedClassifier { score: 0 }),
            test_config(),
        );
        let sizer = PositionSizer::default();

        let cand = candidate("000200", Market::Kosdaq, 10_000.0, 60_000_000_000);
        let reason = engine.process_candidate(&cand, &sizer).await.unwrap_err();
        assert!(matches!(reason, SkipReason::GradeTooLow { grade: Grade::C, .. }));
    }

    #[tokio::test]
    async fn degenerate_candidate_is_a_fault() {
        let provider = Arc::new(RichProvider { candidates: vec![] });
        let engine = ScreenerEngine::new(
            provider,
            Arc::new(FixedClassifier { score: 0 }),
            test_config(),
        );
        let sizer = PositionSizer::default();

        let cand = candidate("000300", Market::Kospi, 0.0, 60_000_000_000);
        let reason = engine.process_candidate(&cand, &sizer).await.unwrap_err();
        assert!(matches!(reason, SkipReason::Fault(_)));
    }

    #[test]
    fn signals_sort_grade_major_score_minor() {
        let mut signals = vec![
            signal_stub(Grade::A, 3, 3), // total 12
            signal_stub(Grade::S, 1, 3), // total 10
            signal_stub(Grade::B, 0, 3), // total 9
            signal_stub(Grade::S, 3, 3), // total 12
        ];
        sort_signals(&mut signals);

        let order: Vec<(Grade, u8)> = signals
            .iter()
            .map(|s| (s.grade, s.score.total()))
            .collect();
        assert_eq!(
            order,
            vec![
                (Grade::S, 12),
                (Grade::S, 10),
                (Grade::A, 12),
                (Grade::B, 9)
            ]
        );
    }
}
