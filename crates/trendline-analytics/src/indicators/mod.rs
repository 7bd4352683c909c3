//! 기술적 지표 모듈.
//!
//! # 지원 지표
//!
//! - **EMA**: 지수 이동평균 (Exponential Moving Average), 단계별 반올림
//!
//! # 사용 예시
//!
//! ```ignore
//! use trendline_analytics::indicators::{ema_series, EmaParams};
//!
//! let ema = ema_series(&closes, EmaParams { period: EmaPeriod::EMA_50 });
//! ```

pub mod ema;

pub use ema::{ema_series, EmaParams, EmaState};
