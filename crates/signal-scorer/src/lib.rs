//! Composite 12-point scoring engine.
//!
//! `Scorer::score` is a pure function of its inputs: no I/O, no mutation.
//! Running it twice on identical inputs produces identical output.

use screener_core::{
    Bar, Candidate, ChecklistFlags, Grade, NewsClassification, NewsItem, ScoreBreakdown,
    ScreenerConfig, SupplySnapshot,
};

pub mod rules;

use rules::{
    evaluate, trading_value_score, CandleContext, ChartContext, ConsolidationContext, CANDLE_CAP,
    CANDLE_RULES, CHART_CAP, CHART_RULES, CONSOLIDATION_CAP, CONSOLIDATION_RULES, SUPPLY_CAP,
    SUPPLY_RULES,
};

/// Traded value above which the checklist marks a volume surge
const VOLUME_SURGE_KRW: i64 = 500_000_000_000;

/// Minimum bars for any chart-derived sub-score
const MIN_CHART_BARS: usize = 20;

/// Bars required before the moving-average alignment rule participates
const MA_ALIGNMENT_BARS: usize = 60;

pub struct Scorer {
    config: ScreenerConfig,
}

impl Scorer {
    pub fn new(config: ScreenerConfig) -> Self {
        Self { config }
    }

    /// Score a candidate against its chart history, news and supply data.
    /// `classification` carries an optional upstream sentiment verdict; when
    /// absent the keyword fallback runs over the news items directly.
    pub fn score(
        &self,
        candidate: &Candidate,
        bars: &[Bar],
        news: &[NewsItem],
        supply: Option<&SupplySnapshot>,
        classification: Option<&NewsClassification>,
    ) -> (ScoreBreakdown, ChecklistFlags) {
        let mut score = ScoreBreakdown::default();
        let mut checklist = ChecklistFlags::default();

        score.news = self.news_score(news, classification);
        checklist.has_news = !news.is_empty();
        checklist.news_sources = news
            .iter()
            .filter(|n| !n.source.is_empty())
            .map(|n| n.source.clone())
            .collect();
        if let Some(result) = classification {
            score.rationale = Some(result.reason.clone());
        }

        score.trading_value = trading_value_score(candidate.trading_value);
        checklist.volume_surge = candidate.trading_value >= VOLUME_SURGE_KRW;

        if bars.len() >= MIN_CHART_BARS {
            let ctx = chart_context(candidate, bars);
            score.chart = evaluate(CHART_RULES, &ctx, CHART_CAP);
            checklist.is_new_high = ctx.high_52w > 0.0 && ctx.close >= ctx.high_52w * 0.95;
            checklist.is_breakout = ctx.close > ctx.recent_high_20;
        }

        let candle_ctx = CandleContext {
            open: candidate.open,
            high: candidate.high,
            close: candidate.close,
        };
        score.candle = evaluate(CANDLE_RULES, &candle_ctx, CANDLE_CAP);

        if let Some(ctx) = consolidation_context(bars) {
            score.consolidation = evaluate(CONSOLIDATION_RULES, &ctx, CONSOLIDATION_CAP);
        }

        if let Some(snapshot) = supply {
            score.supply = evaluate(SUPPLY_RULES, snapshot, SUPPLY_CAP);
            checklist.supply_positive =
                snapshot.foreign_net_5d > 0 || snapshot.inst_net_5d > 0 || snapshot.double_buy;
        }

        (score, checklist)
    }

    /// Highest tier whose score AND traded-value thresholds both hold wins;
    /// a high score with thin turnover is demoted on purpose.
    pub fn determine_grade(&self, candidate: &Candidate, score: &ScoreBreakdown) -> Grade {
        let total = score.total();
        for grade in Grade::TIERS {
            let profile = grade.risk_profile();
            if total >= profile.min_score && candidate.trading_value >= profile.min_trading_value {
                return grade;
            }
        }
        Grade::C
    }

    fn news_score(&self, news: &[NewsItem], classification: Option<&NewsClassification>) -> u8 {
        if let Some(result) = classification {
            return result.score.min(3);
        }
        if news.is_empty() {
            return 0;
        }

        let mut score: i32 = 0;
        for item in news {
            let text = format!("{}{}", item.title, item.summary);

            if self
                .config
                .positive_keywords
                .iter()
                .any(|kw| text.contains(kw.as_str()))
            {
                score += 1;
            }
            if self
                .config
                .negative_keywords
                .iter()
                .any(|kw| text.contains(kw.as_str()))
            {
                score -= 1;
            }
        }

        // Presence-of-news floor: unmatched but existing news still counts 1
        if score == 0 {
            score = 1;
        }
        score.clamp(0, 3) as u8
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn chart_context(candidate: &Candidate, bars: &[Bar]) -> ChartContext {
    let recent_high_20 = bars[bars.len() - 20..]
        .iter()
        .map(|b| b.high)
        .fold(f64::MIN, f64::max);

    let ma_aligned = if bars.len() >= MA_ALIGNMENT_BARS {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ma5 = mean(&closes[closes.len() - 5..]);
        let ma20 = mean(&closes[closes.len() - 20..]);
        let ma60 = mean(&closes[closes.len() - 60..]);
        ma5 > ma20 && ma20 > ma60
    } else {
        false
    };

    ChartContext {
        close: candidate.close,
        high_52w: candidate.high_52w,
        recent_high_20,
        ma_aligned,
    }
}

/// Range of the 19 bars before today; None when history is too short or the
/// base low is degenerate.
fn consolidation_context(bars: &[Bar]) -> Option<ConsolidationContext> {
    if bars.len() < MIN_CHART_BARS {
        return None;
    }

    let today = bars.last()?;
    let base = &bars[bars.len() - 20..bars.len() - 1];

    let range_high = base.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let range_low = base.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    if range_low <= 0.0 {
        return None;
    }

    Some(ConsolidationContext {
        range_pct: (range_high - range_low) / range_low * 100.0,
        range_high,
        close: today.close,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use screener_core::Market;

    fn candidate(close: f64, trading_value: i64) -> Candidate {
        Candidate {
            code: "005930".to_string(),
            name: "삼성전자".to_string(),
            market: Market::Kospi,
            close,
            open: close * 0.96,
            high: close * 1.005,
            low: close * 0.95,
            change_pct: 7.5,
            volume: 1_000_000,
            trading_value,
            high_52w: close,
            low_52w: close * 0.5,
        }
    }

    fn flat_bars(count: usize, price: f64) -> Vec<Bar> {
        (0..count)
            .map(|i| Bar {
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap() + chrono::Days::new(i as u64),
                open: price,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume: 100_000,
            })
            .collect()
    }

    fn rising_bars(count: usize, start: f64, step: f64) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let price = start + i as f64 * step;
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

    fn news(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            summary: String::new(),
            source: "연합뉴스".to_string(),
            url: "https://news.example/1".to_string(),
            credibility: 0.9,
            published_at: None,
        }
    }

    fn scorer() -> Scorer {
        Scorer::new(ScreenerConfig::default())
    }

    #[test]
    fn empty_inputs_score_within_bounds() {
        let scorer = scorer();
        let cand = candidate(10_000.0, 0);
        let (score, checklist) = scorer.score(&cand, &[], &[], None, None);

        assert_eq!(score.news, 0);
        assert_eq!(score.chart, 0);
        assert_eq!(score.supply, 0);
        assert!(score.total() <= 12);
        assert!(!checklist.has_news);
    }

    #[test]
    fn news_floor_applies_to_unmatched_headlines() {
        let scorer = scorer();
        let cand = candidate(10_000.0, 0);
        let items = vec![news("오늘의 시황 정리")];
        let (score, checklist) = scorer.score(&cand, &[], &items, None, None);

        assert_eq!(score.news, 1);
        assert!(checklist.has_news);
        assert_eq!(checklist.news_sources, vec!["연합뉴스".to_string()]);
    }

    #[test]
    fn news_keywords_add_and_subtract() {
        let scorer = scorer();
        let cand = candidate(10_000.0, 0);
        let items = vec![
            news("대규모 수주 계약체결 공시"),
            news("신약개발 임상성공 발표"),
            news("전 대표 횡령 혐의 수사"),
        ];
        let (score, _) = scorer.score(&cand, &[], &items, None, None);
        // +1 +1 -1 = 1
        assert_eq!(score.news, 1);
    }

    #[test]
    fn classification_overrides_keywords() {
        let scorer = scorer();
        let cand = candidate(10_000.0, 0);
        let items = vec![news("전 대표 횡령 혐의 수사")];
        let verdict = NewsClassification {
            score: 3,
            reason: "대규모 수주".to_string(),
        };
        let (score, _) = scorer.score(&cand, &[], &items, None, Some(&verdict));

        assert_eq!(score.news, 3);
        assert_eq!(score.rationale.as_deref(), Some("대규모 수주"));
    }

    #[test]
    fn chart_score_capped_at_two_with_all_conditions() {
        let scorer = scorer();
        // 80 rising bars: aligned MAs, close above trailing high, at 52w high
        let bars = rising_bars(80, 100.0, 1.0);
        let mut cand = candidate(200.0, 0);
        cand.high_52w = 200.0;
        let (score, checklist) = scorer.score(&cand, &bars, &[], None, None);

        assert_eq!(score.chart, 2);
        assert!(checklist.is_new_high);
        assert!(checklist.is_breakout);
    }

    #[test]
    fn chart_score_needs_twenty_bars() {
        let scorer = scorer();
        let bars = rising_bars(19, 100.0, 1.0);
        let cand = candidate(200.0, 0);
        let (score, _) = scorer.score(&cand, &bars, &[], None, None);
        assert_eq!(score.chart, 0);
    }

    #[test]
    fn consolidation_breakout_scores() {
        let scorer = scorer();
        // 19 tight bars then a breakout close
        let mut bars = flat_bars(19, 100.0);
        bars.push(Bar {
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            open: 101.0,
            high: 108.0,
            low: 100.0,
            close: 107.0,
            volume: 500_000,
        });
        let cand = candidate(107.0, 0);
        let (score, _) = scorer.score(&cand, &bars, &[], None, None);
        assert_eq!(score.consolidation, 1);
    }

    #[test]
    fn wide_base_is_not_consolidation() {
        let scorer = scorer();
        let mut bars = rising_bars(19, 100.0, 3.0); // ~50% range
        bars.push(Bar {
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            open: 160.0,
            high: 170.0,
            low: 158.0,
            close: 169.0,
            volume: 500_000,
        });
        let cand = candidate(169.0, 0);
        let (score, _) = scorer.score(&cand, &bars, &[], None, None);
        assert_eq!(score.consolidation, 0);
    }

    #[test]
    fn grade_requires_both_score_and_turnover() {
        let scorer = scorer();
        let score = ScoreBreakdown {
            news: 3,
            trading_value: 3,
            chart: 2,
            candle: 1,
            consolidation: 1,
            supply: 2,
            rationale: None,
        };
        assert_eq!(score.total(), 12);

        // Perfect score, thin turnover: demoted below S/A
        let thin = candidate(10_000.0, 100_000_000_000);
        assert_eq!(scorer.determine_grade(&thin, &score), Grade::B);

        let deep = candidate(10_000.0, 1_000_000_000_000);
        assert_eq!(scorer.determine_grade(&deep, &score), Grade::S);
    }

    #[test]
    fn grade_is_monotonic_in_score() {
        let scorer = scorer();
        let cand = candidate(10_000.0, 1_000_000_000_000);

        let mut prev_rank = Grade::C.rank();
        for total in 0..=12u8 {
            let score = ScoreBreakdown {
                news: total.min(3),
                trading_value: (total.saturating_sub(3)).min(3),
                chart: (total.saturating_sub(6)).min(2),
                candle: (total.saturating_sub(8)).min(1),
                consolidation: (total.saturating_sub(9)).min(1),
                supply: (total.saturating_sub(10)).min(2),
                rationale: None,
            };
            assert_eq!(score.total(), total);
            let rank = scorer.determine_grade(&cand, &score).rank();
            // Higher score never yields a strictly lower tier
            assert!(rank <= prev_rank);
            prev_rank = rank;
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let scorer = scorer();
        let bars = rising_bars(80, 100.0, 1.0);
        let cand = candidate(200.0, 600_000_000_000);
        let items = vec![news("대규모 수주 계약체결")];
        let supply = SupplySnapshot {
            foreign_net_5d: 10,
            inst_net_5d: 10,
            double_buy: true,
            ..Default::default()
        };

        let (first, _) = scorer.score(&cand, &bars, &items, Some(&supply), None);
        let (second, _) = scorer.score(&cand, &bars, &items, Some(&supply), None);
        assert_eq!(first, second);
    }
}
