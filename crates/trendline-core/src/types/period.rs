//! EMA 기간 타입.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// EMA 계산 기간 (span).
///
/// 1 이상의 값만 허용되며, 지표/신호 컬럼 이름을 결정합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct EmaPeriod(u32);

impl EmaPeriod {
    /// 50일 EMA.
    pub const EMA_50: EmaPeriod = EmaPeriod::from_const(50);
    /// 100일 EMA.
    pub const EMA_100: EmaPeriod = EmaPeriod::from_const(100);

    const fn from_const(period: u32) -> Self {
        assert!(period > 0);
        Self(period)
    }

    /// 새 기간을 생성합니다.
    pub fn new(period: u32) -> Result<Self, CoreError> {
        if period == 0 {
            return Err(CoreError::InvalidPeriod(
                "기간은 0보다 커야 합니다".to_string(),
            ));
        }
        Ok(Self(period))
    }

    /// 기간 값을 반환합니다.
    pub fn get(&self) -> u32 {
        self.0
    }

    /// 지표 컬럼 이름 (예: `ema_100`).
    pub fn column_name(&self) -> String {
        format!("ema_{}", self.0)
    }

    /// 신호 컬럼 이름 (예: `score_ema_100`).
    pub fn signal_column_name(&self) -> String {
        format!("score_ema_{}", self.0)
    }
}

impl fmt::Display for EmaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EMA{}", self.0)
    }
}

impl TryFrom<u32> for EmaPeriod {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmaPeriod> for u32 {
    fn from(period: EmaPeriod) -> Self {
        period.0
    }
}

impl FromStr for EmaPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidPeriod(format!("숫자가 아닙니다: {}", s)))?;
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_rejects_zero() {
        assert!(EmaPeriod::new(0).is_err());
        assert!("0".parse::<EmaPeriod>().is_err());
        assert!("abc".parse::<EmaPeriod>().is_err());
    }

    #[test]
    fn test_column_names() {
        let period: EmaPeriod = " 100 ".parse().unwrap();
        assert_eq!(period.column_name(), "ema_100");
        assert_eq!(period.signal_column_name(), "score_ema_100");
        assert_eq!(period.to_string(), "EMA100");
    }
}
