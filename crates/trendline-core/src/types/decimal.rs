//! 가격 정밀도 유틸리티.
//!
//! 저장소의 지표 컬럼은 `NUMERIC(10, 2)`이므로 모든 계산 결과는
//! 소수점 2자리로 반올림된 뒤 다음 계산의 입력이 됩니다.

use rust_decimal::{Decimal, RoundingStrategy};

/// 가격 타입.
pub type Price = Decimal;

/// 저장되는 지표 값의 소수점 자릿수.
pub const PRICE_SCALE: u32 = 2;

/// 지표 값을 저장 정밀도로 반올림합니다 (0.5는 0에서 먼 쪽으로).
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Decimal 연산을 위한 확장 트레이트.
pub trait DecimalExt {
    /// `low <= self <= high` 인지 확인합니다.
    fn is_within(&self, low: Decimal, high: Decimal) -> bool;

    /// 퍼센트로 변환하여 반올림합니다 (0.0525 → 5.25).
    fn to_percentage(&self) -> Decimal;
}

impl DecimalExt for Decimal {
    fn is_within(&self, low: Decimal, high: Decimal) -> bool {
        low <= *self && *self <= high
    }

    fn to_percentage(&self) -> Decimal {
        round_price(*self * Decimal::ONE_HUNDRED)
    }
}
