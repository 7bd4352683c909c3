//! 핵심 에러 타입.

use thiserror::Error;

/// 도메인 값 검증 및 설정 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 잘못된 EMA 기간
    #[error("잘못된 기간: {0}")]
    InvalidPeriod(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidPeriod("0".to_string());
        assert_eq!(err.to_string(), "잘못된 기간: 0");
    }
}
