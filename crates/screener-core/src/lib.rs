pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ScreenerConfig;
pub use error::ScreenerError;
pub use traits::{DataProvider, GateDataSource, NewsClassifier};
pub use types::{
    Bar, Candidate, ChecklistFlags, Grade, GradeRiskProfile, Market, NewsClassification, NewsItem,
    NewsRef, PositionPlan, ScoreBreakdown, ScreenerResult, Signal, SignalStatus, SupplyAnalysis,
    SupplyFlow, SupplySnapshot, SupplyStage,
};
