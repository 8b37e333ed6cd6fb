use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Market segment of a listed instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Kospi => "KOSPI",
            Market::Kosdaq => "KOSDAQ",
        }
    }
}

/// OHLCV bar data (daily), ordered oldest to newest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// One tradable instrument snapshot, immutable once fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub code: String,
    pub name: String,
    pub market: Market,
    pub close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub change_pct: f64,
    pub volume: i64,
    /// Traded value in KRW (close * volume aggregated by the venue)
    pub trading_value: i64,
    pub high_52w: f64,
    pub low_52w: f64,
}

/// One day of net purchases by investor class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyFlow {
    pub date: NaiveDate,
    pub foreign_net: i64,
    pub inst_net: i64,
}

/// Institutional/foreign net-purchase aggregates over trailing windows.
/// Derived purely from a raw net-purchase series, recomputed each pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplySnapshot {
    pub foreign_net_5d: i64,
    pub foreign_net_20d: i64,
    pub inst_net_5d: i64,
    pub inst_net_20d: i64,
    pub foreign_streak: u32,
    pub inst_streak: u32,
    /// Both investor classes net-buying over the trailing 5-day window
    pub double_buy: bool,
}

impl SupplySnapshot {
    /// Build a snapshot from a daily net-purchase series (oldest to newest).
    pub fn from_series(series: &[SupplyFlow]) -> Self {
        let tail = |n: usize| &series[series.len().saturating_sub(n)..];

        let foreign_net_5d: i64 = tail(5).iter().map(|f| f.foreign_net).sum();
        let inst_net_5d: i64 = tail(5).iter().map(|f| f.inst_net).sum();
        let foreign_net_20d: i64 = tail(20).iter().map(|f| f.foreign_net).sum();
        let inst_net_20d: i64 = tail(20).iter().map(|f| f.inst_net).sum();

        let streak = |pick: fn(&SupplyFlow) -> i64| {
            series
                .iter()
                .rev()
                .take_while(|f| pick(f) > 0)
                .count() as u32
        };

        Self {
            foreign_net_5d,
            foreign_net_20d,
            inst_net_5d,
            inst_net_20d,
            foreign_streak: streak(|f| f.foreign_net),
            inst_streak: streak(|f| f.inst_net),
            double_buy: foreign_net_5d > 0 && inst_net_5d > 0,
        }
    }
}

/// Share-count thresholds for net-purchase trend classification
const FOREIGN_STRONG_BUY: i64 = 5_000_000;
const FOREIGN_BUY: i64 = 2_000_000;
const FOREIGN_SELL: i64 = -2_000_000;
const FOREIGN_STRONG_SELL: i64 = -5_000_000;
const INST_STRONG_BUY: i64 = 3_000_000;
const INST_BUY: i64 = 1_000_000;
const INST_STRONG_SELL: i64 = -3_000_000;

/// Streak days counted toward the supply score
const STREAK_CAP: u32 = 5;

/// Accumulation/distribution phase of the smart-money flow, driven by the
/// foreign 5-day sum (institutions only upgrade the strongest phase)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyStage {
    StrongAccumulation,
    Accumulation,
    WeakAccumulation,
    Neutral,
    WeakDistribution,
    Distribution,
    StrongDistribution,
}

impl SupplyStage {
    pub fn label(&self) -> &'static str {
        match self {
            SupplyStage::StrongAccumulation => "강한매집",
            SupplyStage::Accumulation => "매집",
            SupplyStage::WeakAccumulation => "약매집",
            SupplyStage::Neutral => "중립",
            SupplyStage::WeakDistribution => "약분산",
            SupplyStage::Distribution => "분산",
            SupplyStage::StrongDistribution => "강한분산",
        }
    }

    /// Any accumulation phase, however weak
    pub fn is_accumulating(&self) -> bool {
        matches!(
            self,
            SupplyStage::StrongAccumulation
                | SupplyStage::Accumulation
                | SupplyStage::WeakAccumulation
        )
    }
}

/// Smart-money read over a [`SupplySnapshot`]: a 0-100 score and a discrete
/// accumulation stage. Pure and recomputed each pass, like the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyAnalysis {
    /// 0-100, centered at 50
    pub score: f64,
    pub stage: SupplyStage,
}

impl SupplyAnalysis {
    pub fn from_snapshot(snapshot: &SupplySnapshot) -> Self {
        let mut score: f64 = 50.0;

        // Foreign tier, up to +/-15
        if snapshot.foreign_net_5d > FOREIGN_STRONG_BUY {
            score += 15.0;
        } else if snapshot.foreign_net_5d > FOREIGN_BUY {
            score += 10.0;
        } else if snapshot.foreign_net_5d > 0 {
            score += 5.0;
        } else if snapshot.foreign_net_5d < FOREIGN_STRONG_SELL {
            score -= 15.0;
        } else if snapshot.foreign_net_5d < FOREIGN_SELL {
            score -= 10.0;
        }

        // Institutional tier, up to +/-10
        if snapshot.inst_net_5d > INST_STRONG_BUY {
            score += 10.0;
        } else if snapshot.inst_net_5d > INST_BUY {
            score += 5.0;
        } else if snapshot.inst_net_5d < INST_STRONG_SELL {
            score -= 10.0;
        }

        // Streak bonuses, capped at 5 days each
        score += snapshot.foreign_streak.min(STREAK_CAP) as f64 * 2.0;
        score += snapshot.inst_streak.min(STREAK_CAP) as f64;

        if snapshot.double_buy {
            score += 10.0;
        }

        let stage = if snapshot.foreign_net_5d > FOREIGN_STRONG_BUY && snapshot.inst_net_5d > 0 {
            SupplyStage::StrongAccumulation
        } else if snapshot.foreign_net_5d > FOREIGN_BUY {
            SupplyStage::Accumulation
        } else if snapshot.foreign_net_5d > 0 {
            SupplyStage::WeakAccumulation
        } else if snapshot.foreign_net_5d < FOREIGN_STRONG_SELL {
            SupplyStage::StrongDistribution
        } else if snapshot.foreign_net_5d < FOREIGN_SELL {
            SupplyStage::Distribution
        } else if snapshot.foreign_net_5d < 0 {
            SupplyStage::WeakDistribution
        } else {
            SupplyStage::Neutral
        };

        Self {
            score: score.clamp(0.0, 100.0),
            stage,
        }
    }
}

/// News article attached to a candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    /// Static source-credibility weight in [0, 1]
    #[serde(default)]
    pub credibility: f64,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

/// Compact news reference carried on a Signal (top-3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsRef {
    pub title: String,
    pub source: String,
    pub url: String,
}

/// Classifier verdict over a candidate's headlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsClassification {
    /// Favorability score, 0..=3
    pub score: u8,
    pub reason: String,
}

/// Six bounded sub-scores; total is always in [0, 12]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// News/catalyst (0-3)
    pub news: u8,
    /// Traded value (0-3)
    pub trading_value: u8,
    /// Chart pattern (0-2)
    pub chart: u8,
    /// Candle shape (0-1)
    pub candle: u8,
    /// Consolidation breakout (0-1)
    pub consolidation: u8,
    /// Investor supply (0-2)
    pub supply: u8,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        self.news + self.trading_value + self.chart + self.candle + self.consolidation + self.supply
    }
}

/// Boolean conditions mirrored from scoring, for display and filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecklistFlags {
    pub has_news: bool,
    pub news_sources: Vec<String>,
    pub is_new_high: bool,
    pub is_breakout: bool,
    pub supply_positive: bool,
    pub volume_surge: bool,
}

/// Per-grade constants: thresholds and the R multiplier applied when sizing
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GradeRiskProfile {
    pub min_trading_value: i64,
    pub min_score: u8,
    pub min_change_pct: f64,
    pub max_change_pct: f64,
    pub r_multiplier: f64,
}

/// Trade-eligibility tier. C means "do not trade".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    S,
    A,
    B,
    C,
}

impl Grade {
    /// Tiers evaluated when grading, highest first (C is the fallback)
    pub const TIERS: [Grade; 3] = [Grade::S, Grade::A, Grade::B];

    pub const fn risk_profile(&self) -> GradeRiskProfile {
        match self {
            Grade::S => GradeRiskProfile {
                min_trading_value: 1_000_000_000_000,
                min_score: 10,
                min_change_pct: 10.0,
                max_change_pct: 20.0,
                r_multiplier: 1.5,
            },
            Grade::A => GradeRiskProfile {
                min_trading_value: 500_000_000_000,
                min_score: 8,
                min_change_pct: 8.0,
                max_change_pct: 15.0,
                r_multiplier: 1.0,
            },
            Grade::B => GradeRiskProfile {
                min_trading_value: 100_000_000_000,
                min_score: 6,
                min_change_pct: 5.0,
                max_change_pct: 12.0,
                r_multiplier: 0.5,
            },
            Grade::C => GradeRiskProfile {
                min_trading_value: 50_000_000_000,
                min_score: 0,
                min_change_pct: 5.0,
                max_change_pct: 29.9,
                r_multiplier: 0.0,
            },
        }
    }

    /// Sort rank, best tier first
    pub fn rank(&self) -> u8 {
        match self {
            Grade::S => 0,
            Grade::A => 1,
            Grade::B => 2,
            Grade::C => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
        }
    }
}

/// Risk-bounded sizing output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionPlan {
    /// R-unit currency amount (capital x risk ratio x grade multiplier)
    pub r_value: f64,
    pub risk_per_share: f64,
    pub quantity: i64,
    pub position_value: f64,
    /// Percent of capital deployed, rounded to 2 decimals
    pub position_pct: f64,
}

/// Signal lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    Pending,
    Active,
    Closed,
    Expired,
}

/// The terminal per-candidate artifact, assembled by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub stock_code: String,
    pub stock_name: String,
    pub market: Market,
    pub signal_date: NaiveDate,
    pub grade: Grade,
    pub score: ScoreBreakdown,
    pub checklist: ChecklistFlags,
    pub news_items: Vec<NewsRef>,
    /// Raw net-purchase aggregates, carried for downstream diffing
    pub supply: Option<SupplySnapshot>,
    pub supply_analysis: Option<SupplyAnalysis>,
    pub entry_price: f64,
    pub stop_price: f64,
    pub target_price: f64,
    pub r_value: f64,
    pub position_value: f64,
    pub quantity: i64,
    pub r_multiplier: f64,
    pub trading_value: i64,
    pub change_pct: f64,
    pub status: SignalStatus,
    pub created_at: DateTime<Utc>,
}

/// Batch-level aggregate, written once per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerResult {
    pub date: NaiveDate,
    pub total_candidates: usize,
    pub filtered_count: usize,
    pub signals: Vec<Signal>,
    pub by_grade: HashMap<String, usize>,
    pub by_market: HashMap<String, usize>,
    pub processing_time_ms: f64,
}

impl ScreenerResult {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_candidates: 0,
            filtered_count: 0,
            signals: Vec::new(),
            by_grade: HashMap::new(),
            by_market: HashMap::new(),
            processing_time_ms: 0.0,
        }
    }
}
