//! EMA 기반 신호 판정.
//!
//! 두 신호는 별개의 계약입니다:
//! - `Trend`: 저가 ≤ EMA ≤ 종가. 지표가 계산될 때마다 함께 저장됩니다.
//! - `Crossover`: 시가 ≤ EMA ≤ 종가. 가장 최근 거래일에만 판정하며 저장하지 않습니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trendline_core::{Bar, DecimalExt};

/// 신호 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// 저가와 종가 사이에 EMA가 위치
    Trend,
    /// 시가와 종가 사이에 EMA가 위치 (양봉 돌파)
    Crossover,
}

/// 신호 판정기.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalEvaluator;

impl SignalEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 주어진 종류의 신호를 판정합니다 (경계 포함).
    pub fn evaluate(&self, kind: SignalKind, bar: &Bar, ema: Decimal) -> bool {
        match kind {
            SignalKind::Trend => ema.is_within(bar.low, bar.close),
            SignalKind::Crossover => ema.is_within(bar.open, bar.close),
        }
    }

    /// TrendSignal: `low <= ema <= close`.
    pub fn trend(&self, bar: &Bar, ema: Decimal) -> bool {
        self.evaluate(SignalKind::Trend, bar, ema)
    }

    /// CrossoverSignal: `open <= ema <= close`.
    pub fn crossover(&self, bar: &Bar, ema: Decimal) -> bool {
        self.evaluate(SignalKind::Crossover, bar, ema)
    }
}
