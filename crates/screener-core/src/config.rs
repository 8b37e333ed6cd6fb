use serde::{Deserialize, Serialize};

/// Screener configuration. Compiled defaults mirror the production rule set;
/// selected knobs can be overridden from the environment.
///
/// Invariant (pre-condition, not runtime-checked): grade thresholds in
/// [`crate::Grade::risk_profile`] are monotonic across tiers, and the base
/// filters below are at least as permissive as the loosest tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    // Base candidate filters
    pub min_trading_value: i64,
    pub min_change_pct: f64,
    pub max_change_pct: f64,
    pub min_price: f64,
    pub max_price: f64,
    /// Name fragments excluding funds, SPACs, preferred shares and leverage products
    pub exclude_keywords: Vec<String>,

    // Candidate list caps per market
    pub kospi_limit: usize,
    pub kosdaq_limit: usize,

    // Trade parameters
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub gap_target_pct: f64,
    pub gap_stop_pct: f64,

    // Risk management
    pub risk_ratio: f64,
    pub max_positions: usize,
    pub daily_loss_limit_r: f64,
    pub weekly_loss_limit_r: f64,

    /// Pause between candidates, a courtesy to rate-limited upstreams
    pub candidate_delay_ms: u64,

    // News keyword tables used by the scorer's fallback path
    pub positive_keywords: Vec<String>,
    pub negative_keywords: Vec<String>,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            min_trading_value: 50_000_000_000,
            min_change_pct: 5.0,
            max_change_pct: 29.9, // limit-up excluded
            min_price: 1_000.0,
            max_price: 500_000.0,
            exclude_keywords: to_strings(&[
                "스팩", "SPAC", "ETF", "ETN", "리츠", "우B", "우C", "1우", "2우", "3우",
                "인버스", "레버리지",
            ]),
            kospi_limit: 20,
            kosdaq_limit: 30,
            stop_loss_pct: 0.03,
            take_profit_pct: 0.05,
            gap_target_pct: 0.03,
            gap_stop_pct: -0.02,
            risk_ratio: 0.005,
            max_positions: 2,
            daily_loss_limit_r: 2.0,
            weekly_loss_limit_r: 4.0,
            candidate_delay_ms: 100,
            positive_keywords: to_strings(&[
                // Earnings
                "흑자전환", "실적개선", "어닝서프라이즈", "사상최대", "호실적", "매출증가",
                "영업이익", "순이익", "분기최대",
                // Contracts / orders
                "수주", "계약체결", "공급계약", "납품계약", "MOU", "LOI", "대규모계약",
                "독점계약", "장기공급",
                // New business / technology
                "신약개발", "임상성공", "FDA승인", "CE인증", "특허취득", "기술이전",
                "라이선스", "신제품", "양산", "상용화",
                // Investment / M&A
                "지분투자", "인수합병", "자회사편입", "지분확대",
                // Policy / themes
                "정부지원", "국책사업", "수혜주", "관련주", "테마",
                // Supply
                "외국인매수", "기관매수", "프로그램매수",
            ]),
            negative_keywords: to_strings(&[
                "횡령", "배임", "분식", "상장폐지", "관리종목", "감사의견거절", "자본잠식",
                "부도", "파산", "워크아웃", "법정관리", "검찰", "수사", "구속", "기소",
                "적자전환", "적자확대", "실적악화", "매출감소", "대량매도", "공매도급증",
                "외국인매도",
            ]),
        }
    }
}

impl ScreenerConfig {
    /// Defaults layered with environment overrides. Call after dotenvy has
    /// loaded the `.env` file.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_parse("SCREENER_RISK_RATIO") {
            config.risk_ratio = v;
        }
        if let Some(v) = env_parse("SCREENER_STOP_LOSS_PCT") {
            config.stop_loss_pct = v;
        }
        if let Some(v) = env_parse("SCREENER_TAKE_PROFIT_PCT") {
            config.take_profit_pct = v;
        }
        if let Some(v) = env_parse("SCREENER_KOSPI_LIMIT") {
            config.kospi_limit = v;
        }
        if let Some(v) = env_parse("SCREENER_KOSDAQ_LIMIT") {
            config.kosdaq_limit = v;
        }
        if let Some(v) = env_parse("SCREENER_CANDIDATE_DELAY_MS") {
            config.candidate_delay_ms = v;
        }

        config
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
