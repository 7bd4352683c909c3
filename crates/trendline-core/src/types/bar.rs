//! 일봉 및 지표 행 타입.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 종목의 일봉 데이터.
///
/// `(instrument_id, trade_date)`가 기본 키이며, 생성 후 OHLC 값은 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// 종목 코드 (예: "000001.SZ")
    pub instrument_id: String,
    /// 거래일
    pub trade_date: NaiveDate,
    /// 시가
    pub open: Decimal,
    /// 종가
    pub close: Decimal,
    /// 저가
    pub low: Decimal,
    /// 고가
    pub high: Decimal,
    /// 거래량
    pub volume: Option<Decimal>,
    /// 거래대금
    pub amount: Option<Decimal>,
}

impl Bar {
    /// 거래량/거래대금 없이 새 일봉을 생성합니다.
    pub fn new(
        instrument_id: impl Into<String>,
        trade_date: NaiveDate,
        open: Decimal,
        close: Decimal,
        low: Decimal,
        high: Decimal,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            trade_date,
            open,
            close,
            low,
            high,
            volume: None,
            amount: None,
        }
    }

    /// 저장소 기본 키.
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.instrument_id, self.trade_date)
    }
}

/// 특정 기간의 지표/신호 컬럼과 함께 조회된 일봉.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorBar {
    pub bar: Bar,
    /// EMA 값 (미계산 시 None)
    pub ema: Option<Decimal>,
    /// TrendSignal 값 (미계산 시 None)
    pub trend: Option<bool>,
}

impl IndicatorBar {
    pub fn new(bar: Bar, ema: Option<Decimal>, trend: Option<bool>) -> Self {
        Self { bar, ema, trend }
    }
}

/// 저장소에 기록할 지표 행.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub instrument_id: String,
    pub trade_date: NaiveDate,
    /// 소수점 2자리로 반올림된 EMA 값
    pub ema: Decimal,
    /// TrendSignal (있을 경우 함께 기록)
    pub trend: Option<bool>,
}

impl IndicatorRow {
    pub fn new(
        instrument_id: impl Into<String>,
        trade_date: NaiveDate,
        ema: Decimal,
        trend: Option<bool>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            trade_date,
            ema,
            trend,
        }
    }

    /// 저장소 기본 키.
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.instrument_id, self.trade_date)
    }
}
