//! Market regime gate: classifies the whole market as GREEN/YELLOW/RED with
//! a 0-100 health score, from index alignment/RSI, the USD/KRW rate, and
//! sector-ETF strength. The three collection stages are independent and run
//! concurrently; gate determination is a pure function over their outputs.
//! A missing stage contributes nothing and never aborts the run.

use chrono::{DateTime, Utc};
use screener_core::{GateDataSource, Market};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod metrics;

use metrics::{analyze_fx, analyze_index, analyze_sector};

/// Tracked KODEX sector ETFs (name, ticker)
pub const SECTOR_ETFS: &[(&str, &str)] = &[
    ("반도체", "091160"),
    ("2차전지", "305720"),
    ("자동차", "091180"),
    ("바이오", "244580"),
    ("금융", "091170"),
    ("철강", "117700"),
];

const INDEX_DAYS: u32 = 180;
const FX_DAYS: u32 = 30;
const SECTOR_DAYS: u32 = 90;

/// Trading-permission verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateVerdict {
    Green,
    Yellow,
    Red,
}

impl GateVerdict {
    /// Bucket boundaries are closed above: 70.0 is GREEN, 40.0 is YELLOW.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            GateVerdict::Green
        } else if score >= 40.0 {
            GateVerdict::Yellow
        } else {
            GateVerdict::Red
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateVerdict::Green => "GREEN",
            GateVerdict::Yellow => "YELLOW",
            GateVerdict::Red => "RED",
        }
    }
}

/// Moving-average ordering of an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaAlignment {
    /// close > ma5 > ma20 > ma60
    Aligned,
    /// close < ma5 < ma20 < ma60
    Inverted,
    Mixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetrics {
    pub name: String,
    pub close: f64,
    pub change: f64,
    pub change_pct: f64,
    pub ma5: f64,
    pub ma20: f64,
    pub ma60: f64,
    pub alignment: MaAlignment,
    pub rsi: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FxMetrics {
    pub rate: f64,
    pub change_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorMetrics {
    pub name: String,
    pub ticker: String,
    pub close: f64,
    pub change_pct: f64,
    pub vs_ma20: f64,
    /// 0-100, centered at 50 on the 20-day mean
    pub score: f64,
}

/// Rationale for the verdict: every triggered rule leaves a reason
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateAnalysis {
    pub reasons: Vec<String>,
    pub kospi_alignment: Option<MaAlignment>,
    pub kosdaq_alignment: Option<MaAlignment>,
    pub usd_krw_rate: f64,
    pub strong_sectors: Vec<String>,
    pub weak_sectors: Vec<String>,
}

/// One regime classification, immutable once produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeSnapshot {
    pub timestamp: DateTime<Utc>,
    pub gate: GateVerdict,
    pub score: f64,
    pub kospi: Option<IndexMetrics>,
    pub kosdaq: Option<IndexMetrics>,
    pub usd_krw: Option<FxMetrics>,
    pub sectors: Vec<SectorMetrics>,
    pub analysis: GateAnalysis,
}

pub struct MarketGate {
    source: Arc<dyn GateDataSource>,
}

impl MarketGate {
    pub fn new(source: Arc<dyn GateDataSource>) -> Self {
        Self { source }
    }

    /// Run the three analysis stages concurrently, then determine the gate.
    pub async fn analyze(&self) -> RegimeSnapshot {
        tracing::info!("Running market gate analysis");

        let (indices, usd_krw, sectors) = tokio::join!(
            self.collect_indices(),
            self.collect_fx(),
            self.collect_sectors(),
        );
        let (kospi, kosdaq) = indices;

        let (gate, score, analysis) = determine_gate(
            kospi.as_ref(),
            kosdaq.as_ref(),
            usd_krw.as_ref(),
            &sectors,
        );

        tracing::info!(gate = gate.as_str(), score, "Market gate determined");

        RegimeSnapshot {
            timestamp: Utc::now(),
            gate,
            score,
            kospi,
            kosdaq,
            usd_krw,
            sectors,
            analysis,
        }
    }

    async fn collect_indices(&self) -> (Option<IndexMetrics>, Option<IndexMetrics>) {
        let (kospi_bars, kosdaq_bars) = tokio::join!(
            self.source.index_history(Market::Kospi, INDEX_DAYS),
            self.source.index_history(Market::Kosdaq, INDEX_DAYS),
        );

        let kospi = match kospi_bars {
            Ok(bars) => analyze_index("KOSPI", &bars),
            Err(e) => {
                tracing::warn!("KOSPI index fetch failed: {}", e);
                None
            }
        };
        let kosdaq = match kosdaq_bars {
            Ok(bars) => analyze_index("KOSDAQ", &bars),
            Err(e) => {
                tracing::warn!("KOSDAQ index fetch failed: {}", e);
                None
            }
        };

        (kospi, kosdaq)
    }

    async fn collect_fx(&self) -> Option<FxMetrics> {
        match self.source.fx_history(FX_DAYS).await {
            Ok(bars) => analyze_fx(&bars),
            Err(e) => {
                tracing::warn!("USD/KRW fetch failed: {}", e);
                None
            }
        }
    }

    async fn collect_sectors(&self) -> Vec<SectorMetrics> {
        let mut sectors = Vec::with_capacity(SECTOR_ETFS.len());

        for (name, ticker) in SECTOR_ETFS {
            match self.source.sector_history(ticker, SECTOR_DAYS).await {
                Ok(bars) => {
                    if let Some(metrics) = analyze_sector(name, ticker, &bars) {
                        sectors.push(metrics);
                    }
                }
                Err(e) => {
                    tracing::warn!("Sector {} fetch failed: {}", name, e);
                }
            }
        }

        // Ranked strongest first
        sectors.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        sectors
    }
}

/// Additive rule table over the collected metrics, starting from a neutral 50.
/// Missing inputs skip their rules entirely.
pub fn determine_gate(
    kospi: Option<&IndexMetrics>,
    kosdaq: Option<&IndexMetrics>,
    usd_krw: Option<&FxMetrics>,
    sectors: &[SectorMetrics],
) -> (GateVerdict, f64, GateAnalysis) {
    let mut score: f64 = 50.0;
    let mut analysis = GateAnalysis::default();

    if let Some(kospi) = kospi {
        analysis.kospi_alignment = Some(kospi.alignment);
        match kospi.alignment {
            MaAlignment::Aligned => {
                score += 10.0;
                analysis.reasons.push("KOSPI 정배열".to_string());
            }
            MaAlignment::Inverted => {
                score -= 15.0;
                analysis.reasons.push("KOSPI 역배열".to_string());
            }
            MaAlignment::Mixed => {}
        }

        if kospi.rsi > 70.0 {
            score -= 5.0;
            analysis.reasons.push("KOSPI RSI 과매수".to_string());
        } else if kospi.rsi < 30.0 {
            score += 5.0;
            analysis.reasons.push("KOSPI RSI 과매도 반등 기대".to_string());
        }

        if kospi.change_pct > 1.0 {
            score += 5.0;
        } else if kospi.change_pct < -1.0 {
            score -= 5.0;
        }
    }

    if let Some(kosdaq) = kosdaq {
        analysis.kosdaq_alignment = Some(kosdaq.alignment);
        match kosdaq.alignment {
            MaAlignment::Aligned => score += 5.0,
            MaAlignment::Inverted => score -= 10.0,
            MaAlignment::Mixed => {}
        }
    }

    if let Some(fx) = usd_krw {
        analysis.usd_krw_rate = fx.rate;
        if fx.rate > 1450.0 {
            score -= 15.0;
            analysis.reasons.push("환율 위험 (>1450)".to_string());
        } else if fx.rate > 1400.0 {
            score -= 10.0;
            analysis.reasons.push("환율 경고 (>1400)".to_string());
        } else if fx.rate < 1300.0 {
            score += 5.0;
            analysis.reasons.push("환율 안정 (<1300)".to_string());
        }
    }

    if !sectors.is_empty() {
        let strong = sectors.iter().filter(|s| s.score > 60.0).count();
        let weak = sectors.iter().filter(|s| s.score < 40.0).count();

        if strong >= 4 {
            score += 10.0;
            analysis.reasons.push(format!("강세 섹터 {}개", strong));
        } else if weak >= 4 {
            score -= 10.0;
            analysis.reasons.push(format!("약세 섹터 {}개", weak));
        }

        analysis.strong_sectors = sectors
            .iter()
            .filter(|s| s.score > 60.0)
            .take(3)
            .map(|s| s.name.clone())
            .collect();
        analysis.weak_sectors = sectors
            .iter()
            .filter(|s| s.score < 40.0)
            .take(3)
            .map(|s| s.name.clone())
            .collect();
    }

    let score = score.clamp(0.0, 100.0);
    (GateVerdict::from_score(score), score, analysis)
}
