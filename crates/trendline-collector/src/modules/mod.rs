//! 배치 작업 모듈.

pub mod indicator_sync;
pub mod signal_report;

pub use indicator_sync::{recalc_history, sync_indicators, sync_period, PeriodOutcome};
pub use signal_report::{crossover_report, metrics_report, parse_trade_date};
