//! Per-series analysis for the market gate: index metrics with moving-average
//! alignment and RSI, FX rate, and sector scores anchored to the 20-day mean.

use crate::{FxMetrics, IndexMetrics, MaAlignment, SectorMetrics};
use screener_core::Bar;

const RSI_PERIOD: usize = 14;

/// Mean of the trailing `n` values (all values when fewer are available)
fn tail_mean(values: &[f64], n: usize) -> f64 {
    let tail = &values[values.len().saturating_sub(n)..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// Last RSI value with Wilder smoothing; 50.0 when history is too short.
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for w in closes.windows(2) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

fn classify_alignment(close: f64, ma5: f64, ma20: f64, ma60: f64) -> MaAlignment {
    if close > ma5 && ma5 > ma20 && ma20 > ma60 {
        MaAlignment::Aligned
    } else if close < ma5 && ma5 < ma20 && ma20 < ma60 {
        MaAlignment::Inverted
    } else {
        MaAlignment::Mixed
    }
}

/// Analyze an index series. None when the series is empty.
pub fn analyze_index(name: &str, bars: &[Bar]) -> Option<IndexMetrics> {
    let latest = bars.last()?;
    let prev = if bars.len() > 1 {
        &bars[bars.len() - 2]
    } else {
        latest
    };

    let close = latest.close;
    let change = close - prev.close;
    let change_pct = if prev.close != 0.0 {
        change / prev.close * 100.0
    } else {
        0.0
    };

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ma5 = tail_mean(&closes, 5);
    let ma20 = tail_mean(&closes, 20);
    let ma60 = tail_mean(&closes, 60);

    Some(IndexMetrics {
        name: name.to_string(),
        close: round2(close),
        change: round2(change),
        change_pct: round2(change_pct),
        ma5: round2(ma5),
        ma20: round2(ma20),
        ma60: round2(ma60),
        alignment: classify_alignment(close, ma5, ma20, ma60),
        rsi: round2(rsi(&closes, RSI_PERIOD)),
    })
}

/// FX rate and day-over-day change. None when the series is empty.
pub fn analyze_fx(bars: &[Bar]) -> Option<FxMetrics> {
    let latest = bars.last()?;
    let prev = if bars.len() > 1 {
        &bars[bars.len() - 2]
    } else {
        latest
    };

    let rate = latest.close;
    let change_pct = if prev.close != 0.0 {
        (rate - prev.close) / prev.close * 100.0
    } else {
        0.0
    };

    Some(FxMetrics {
        rate: round2(rate),
        change_pct: round2(change_pct),
    })
}

/// Sector score: distance to the 20-day mean mapped onto 0-100, centered at 50.
pub fn analyze_sector(name: &str, ticker: &str, bars: &[Bar]) -> Option<SectorMetrics> {
    let latest = bars.last()?;
    let prev = if bars.len() > 1 {
        &bars[bars.len() - 2]
    } else {
        latest
    };

    let close = latest.close;
    let change_pct = if prev.close != 0.0 {
        (close - prev.close) / prev.close * 100.0
    } else {
        0.0
    };

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let ma20 = tail_mean(&closes, 20);
    if ma20 == 0.0 {
        return None;
    }

    let score = ((close - ma20) / ma20 * 100.0 + 50.0).clamp(0.0, 100.0);

    Some(SectorMetrics {
        name: name.to_string(),
        ticker: ticker.to_string(),
        close: close.round(),
        change_pct: round2(change_pct),
        vs_ma20: round2((close / ma20 - 1.0) * 100.0),
        score: round1(score),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
