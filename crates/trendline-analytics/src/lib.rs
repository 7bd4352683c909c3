//! 증분 EMA 지표 엔진.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 단계별 반올림 EMA 계산 (`indicators`)
//! - TrendSignal / CrossoverSignal 판정 (`signal`)
//! - 전체 재계산, 증분 계산, 교차 종목 조회 (`engine`)
//! - 신호 성과 집계 (`metrics`)

pub mod engine;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod signal;

pub use engine::{EmaEngine, HistoryReport, PeriodLocks};
pub use error::{EngineError, EngineResult};
pub use indicators::{ema_series, EmaParams, EmaState};
pub use metrics::{compute_signal_metrics, SignalMetrics};
pub use signal::{SignalEvaluator, SignalKind};
