//! 에러 타입 정의.

use std::fmt;

use trendline_analytics::EngineError;
use trendline_core::CoreError;
use trendline_data::DataError;

/// Collector 에러 타입
#[derive(Debug)]
pub enum CollectorError {
    /// 지표 엔진 에러
    Engine(EngineError),
    /// 저장소 에러
    Data(DataError),
    /// 설정 에러
    Config(String),
    /// 잘못된 명령 인자
    InvalidArgument(String),
}

impl fmt::Display for CollectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "Engine error: {}", e),
            Self::Data(e) => write!(f, "Store error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for CollectorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            Self::Data(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineError> for CollectorError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<DataError> for CollectorError {
    fn from(err: DataError) -> Self {
        Self::Data(err)
    }
}

impl From<CoreError> for CollectorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidPeriod(msg) => Self::InvalidArgument(msg),
            CoreError::Config(msg) => Self::Config(msg),
        }
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, CollectorError>;
