//! R-based position sizing.
//!
//! One R is the fixed fraction of capital risked per trade before grade
//! adjustment. The grade's R multiplier scales the risk budget; the stop
//! distance converts it into a share quantity. All calculations are pure
//! and deterministic.

use screener_core::{Grade, PositionPlan};
use serde::{Deserialize, Serialize};

/// Position calculator bound to a capital amount and risk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSizer {
    /// Trading capital in KRW
    pub capital: f64,

    /// Fraction of capital risked per R (e.g. 0.005 = 0.5%)
    pub risk_ratio: f64,

    /// Stop distance below entry (e.g. 0.03 = -3%)
    pub stop_loss_pct: f64,

    /// Target distance above entry (e.g. 0.05 = +5%)
    pub take_profit_pct: f64,
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self {
            capital: 100_000_000.0,
            risk_ratio: 0.005,
            stop_loss_pct: 0.03,
            take_profit_pct: 0.05,
        }
    }
}

impl PositionSizer {
    pub fn new(capital: f64, risk_ratio: f64, stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        Self {
            capital,
            risk_ratio,
            stop_loss_pct,
            take_profit_pct,
        }
    }

    pub fn with_capital(mut self, capital: f64) -> Self {
        self.capital = capital;
        self
    }

    /// Convert a grade and a stop distance into a bounded share quantity.
    ///
    /// Grade C never trades and returns an all-zero plan. A stop at or above
    /// entry has no valid per-share risk: the plan keeps its R value but
    /// carries zero quantity, surfacing the anomaly instead of erroring.
    pub fn calculate_position(&self, entry_price: f64, stop_price: f64, grade: Grade) -> PositionPlan {
        let r_multiplier = grade.risk_profile().r_multiplier;
        let r_value = self.capital * self.risk_ratio * r_multiplier;

        if grade == Grade::C {
            return PositionPlan::default();
        }

        let risk_per_share = entry_price - stop_price;
        if risk_per_share <= 0.0 {
            return PositionPlan {
                r_value,
                ..Default::default()
            };
        }

        let quantity = (r_value / risk_per_share).floor() as i64;
        let position_value = quantity as f64 * entry_price;
        let position_pct = if self.capital > 0.0 {
            round2(position_value / self.capital * 100.0)
        } else {
            0.0
        };

        PositionPlan {
            r_value,
            risk_per_share,
            quantity,
            position_value,
            position_pct,
        }
    }

    pub fn stop_loss(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_pct)
    }

    pub fn target_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.take_profit_pct)
    }

    /// Reward per unit of risk; 0 when the stop leaves no risk to measure.
    pub fn risk_reward(&self, entry_price: f64, stop_price: f64, target_price: f64) -> f64 {
        let risk = entry_price - stop_price;
        if risk <= 0.0 {
            return 0.0;
        }
        round2((target_price - entry_price) / risk)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
