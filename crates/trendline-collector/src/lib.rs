//! 증분 EMA 엔진 배치 실행기.
//!
//! 이 crate는 지표 엔진을 명령줄에서 실행하는 바이너리를 제공합니다:
//! - 스키마 마이그레이션
//! - 기간별 전체 재계산 / 증분 계산
//! - 교차 종목 조회 및 신호 성과 리포트

pub mod error;
pub mod modules;
pub mod stats;

pub use error::{CollectorError, Result};
pub use stats::RunStats;
