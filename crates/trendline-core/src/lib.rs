//! # Trendline Core
//!
//! 증분 지표 엔진의 핵심 도메인 타입을 제공합니다:
//! - 일봉(`Bar`) 및 지표 행 타입
//! - EMA 기간(`EmaPeriod`)과 가격 반올림 규칙
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
