//! 지수 이동평균 (EMA).
//!
//! EMA1 = c1, EMAt = α × ct + (1 - α) × EMAt-1, α = 2 / (p + 1)
//!
//! α는 대부분의 기간에서 유한 소수로 표현되지 않으므로 한 단계는
//! (2 × ct + (p - 1) × EMAt-1) / (p + 1) 로 한 번만 나누어 계산합니다.
//!
//! 매 단계의 결과는 저장 정밀도로 반올림된 뒤 다음 단계의 입력이 됩니다.
//! 따라서 전체 재계산과 저장된 시드에서 이어서 계산한 결과가 정확히 같습니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trendline_core::{round_price, EmaPeriod};

/// EMA 파라미터.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmaParams {
    /// 이동평균 기간.
    pub period: EmaPeriod,
}

/// 한 종목의 EMA 진행 상태.
#[derive(Debug, Clone, Copy)]
pub struct EmaState {
    period: u64,
    value: Option<Decimal>,
}

impl EmaState {
    /// 첫 일봉부터 시작하는 상태.
    pub fn new(params: EmaParams) -> Self {
        Self {
            period: u64::from(params.period.get()),
            value: None,
        }
    }

    /// 저장된 직전 EMA에서 이어가는 상태.
    pub fn seeded(params: EmaParams, previous: Decimal) -> Self {
        Self {
            period: u64::from(params.period.get()),
            value: Some(previous),
        }
    }

    /// 종가 하나를 반영하고 반올림된 EMA를 반환합니다.
    pub fn update(&mut self, close: Decimal) -> Decimal {
        let next = match self.value {
            None => round_price(close),
            Some(prev) => {
                let numerator = Decimal::TWO * close + Decimal::from(self.period - 1) * prev;
                round_price(numerator / Decimal::from(self.period + 1))
            }
        };
        self.value = Some(next);
        next
    }

    /// 마지막으로 계산된 EMA.
    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// 종가 시계열 전체의 EMA를 계산합니다 (입력과 같은 길이).
pub fn ema_series(closes: &[Decimal], params: EmaParams) -> Vec<Decimal> {
    let mut state = EmaState::new(params);
    closes.iter().map(|close| state.update(*close)).collect()
}
