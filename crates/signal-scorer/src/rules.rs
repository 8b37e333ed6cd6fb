//! Scoring rules as data: each sub-score is an ordered table of
//! (name, weight, predicate) entries reduced under a cap, so thresholds can
//! be inspected and unit-tested rule by rule instead of living in branches.

use screener_core::SupplySnapshot;

pub struct Rule<Ctx> {
    pub name: &'static str,
    pub weight: i8,
    pub applies: fn(&Ctx) -> bool,
}

/// Sum the weights of matching rules, clamped to [0, cap].
pub fn evaluate<Ctx>(rules: &[Rule<Ctx>], ctx: &Ctx, cap: u8) -> u8 {
    let raw: i8 = rules
        .iter()
        .filter(|rule| (rule.applies)(ctx))
        .map(|rule| rule.weight)
        .sum();
    raw.clamp(0, cap as i8) as u8
}

/// Traded-value step thresholds in KRW, highest first
pub const TRADING_VALUE_STEPS: &[(i64, u8)] = &[
    (1_000_000_000_000, 3),
    (500_000_000_000, 2),
    (100_000_000_000, 1),
];

pub fn trading_value_score(trading_value: i64) -> u8 {
    TRADING_VALUE_STEPS
        .iter()
        .find(|(threshold, _)| trading_value >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0)
}

/// Derived chart facts the chart rules are evaluated against
pub struct ChartContext {
    pub close: f64,
    pub high_52w: f64,
    /// Max high of the trailing 20 bars
    pub recent_high_20: f64,
    /// ma5 > ma20 > ma60, only meaningful with >= 60 bars
    pub ma_aligned: bool,
}

/// Three conditions feed a cap of 2. The cap is intentional: alignment is a
/// tie-breaker on top of the first two, not a third point.
pub const CHART_CAP: u8 = 2;

pub const CHART_RULES: &[Rule<ChartContext>] = &[
    Rule {
        name: "near_52w_high",
        weight: 1,
        applies: |c| c.high_52w > 0.0 && c.close >= c.high_52w * 0.95,
    },
    Rule {
        name: "breakout_20d",
        weight: 1,
        applies: |c| c.close > c.recent_high_20,
    },
    Rule {
        name: "ma_aligned",
        weight: 1,
        applies: |c| c.ma_aligned,
    },
];

pub struct CandleContext {
    pub open: f64,
    pub high: f64,
    pub close: f64,
}

pub const CANDLE_CAP: u8 = 1;

pub const CANDLE_RULES: &[Rule<CandleContext>] = &[Rule {
    name: "strong_bullish_candle",
    weight: 1,
    applies: |c| {
        if c.open <= 0.0 || c.close <= 0.0 {
            return false;
        }
        let body = c.close - c.open;
        if body <= 0.0 {
            return false;
        }
        let body_pct = body / c.open * 100.0;
        let upper_wick_pct = (c.high - c.close) / c.close * 100.0;
        body_pct >= 3.0 && upper_wick_pct <= 1.5
    },
}];

pub struct ConsolidationContext {
    /// High/low range of the 19 bars before today, as percent of the low
    pub range_pct: f64,
    pub range_high: f64,
    pub close: f64,
}

pub const CONSOLIDATION_CAP: u8 = 1;

pub const CONSOLIDATION_RULES: &[Rule<ConsolidationContext>] = &[Rule {
    name: "base_breakout",
    weight: 1,
    applies: |c| c.range_pct <= 15.0 && c.close > c.range_high,
}];

pub const SUPPLY_CAP: u8 = 2;

pub const SUPPLY_RULES: &[Rule<SupplySnapshot>] = &[
    Rule {
        name: "foreign_net_buy_5d",
        weight: 1,
        applies: |s| s.foreign_net_5d > 0,
    },
    Rule {
        name: "inst_net_buy_5d",
        weight: 1,
        applies: |s| s.inst_net_5d > 0,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reducer_clamps_to_cap() {
        let ctx = ChartContext {
            close: 100.0,
            high_52w: 100.0,
            recent_high_20: 90.0,
            ma_aligned: true,
        };
        // All three rules match, cap keeps the score at 2
        assert_eq!(evaluate(CHART_RULES, &ctx, CHART_CAP), 2);
    }

    #[test]
    fn reducer_floors_at_zero() {
        struct Ctx;
        const RULES: &[Rule<Ctx>] = &[Rule {
            name: "penalty",
            weight: -2,
            applies: |_| true,
        }];
        assert_eq!(evaluate(RULES, &Ctx, 3), 0);
    }

    #[test]
    fn trading_value_steps() {
        assert_eq!(trading_value_score(1_000_000_000_000), 3);
        assert_eq!(trading_value_score(999_999_999_999), 2);
        assert_eq!(trading_value_score(500_000_000_000), 2);
        assert_eq!(trading_value_score(100_000_000_000), 1);
        assert_eq!(trading_value_score(99_999_999_999), 0);
    }

    #[test]
    fn candle_rule_rejects_long_upper_wick() {
        let ctx = CandleContext {
            open: 100.0,
            close: 104.0,
            high: 110.0,
        };
        assert_eq!(evaluate(CANDLE_RULES, &ctx, CANDLE_CAP), 0);

        let tight = CandleContext {
            open: 100.0,
            close: 104.0,
            high: 104.5,
        };
        assert_eq!(evaluate(CANDLE_RULES, &tight, CANDLE_CAP), 1);
    }

    #[test]
    fn supply_rules_fire_independently() {
        let both = SupplySnapshot {
            foreign_net_5d: 1,
            inst_net_5d: 1,
            ..Default::default()
        };
        assert_eq!(evaluate(SUPPLY_RULES, &both, SUPPLY_CAP), 2);

        let foreign_only = SupplySnapshot {
            foreign_net_5d: 1,
            inst_net_5d: -5,
            ..Default::default()
        };
        assert_eq!(evaluate(SUPPLY_RULES, &foreign_only, SUPPLY_CAP), 1);
    }
}
