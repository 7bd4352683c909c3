//! 엔진 오류 타입.

use thiserror::Error;
use trendline_core::{CoreError, EmaPeriod};
use trendline_data::DataError;

/// 지표 엔진 오류.
#[derive(Debug, Error)]
pub enum EngineError {
    /// 증분 계산의 시드가 없음 (전체 재계산 필요)
    #[error("{period} 전체 재계산이 필요합니다 (종목: {})", .instrument_id.as_deref().unwrap_or("-"))]
    NeedsHistory {
        period: EmaPeriod,
        instrument_id: Option<String>,
    },

    /// 도메인 값 오류
    #[error(transparent)]
    Core(#[from] CoreError),

    /// 저장소 오류 (원본 그대로 전달)
    #[error(transparent)]
    Data(#[from] DataError),
}

impl EngineError {
    /// 같은 호출을 다시 시도해서 해결될 수 있는 오류인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Data(e) => e.is_retryable(),
            EngineError::NeedsHistory { .. } | EngineError::Core(_) => false,
        }
    }

    /// 전체 재계산이 필요한 오류인지 확인합니다.
    pub fn needs_history(&self) -> bool {
        matches!(self, EngineError::NeedsHistory { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
