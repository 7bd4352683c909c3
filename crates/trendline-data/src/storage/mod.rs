//! 시계열 저장소.
//!
//! 일봉은 append-only로 저장되고, 지표/신호 컬럼은 기간별로 나중에 채워집니다.
//! 엔진은 [`SeriesStore`] trait만 알며, 구현은 다음 두 가지입니다:
//! - [`postgres::PgSeriesStore`]: PostgreSQL `daily_prices` 테이블
//! - [`memory::MemorySeriesStore`]: 프로세스 내 저장소 (테스트/임베딩용)

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use trendline_core::{Bar, EmaPeriod, IndicatorBar, IndicatorRow};

use crate::error::Result;

/// 스키마 협상 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaCapabilities {
    /// 지표 컬럼 존재 여부
    pub has_indicator: bool,
    /// 신호 컬럼 존재 여부
    pub has_signal: bool,
    /// 이번 호출에서 컬럼을 새로 추가했는지 여부
    pub created: bool,
}

/// 일봉 시계열 저장소.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// 기간의 지표/신호 컬럼을 없을 때만 추가합니다 (멱등).
    async fn ensure_indicator_columns(&self, period: EmaPeriod) -> Result<SchemaCapabilities>;

    /// 컬럼 존재 여부를 조회합니다.
    async fn has_column(&self, name: &str) -> Result<bool>;

    /// 모든 종목의 전체 일봉 (거래일, 종목 순).
    async fn get_full_history(&self) -> Result<Vec<Bar>>;

    /// 지표가 아직 계산되지 않은 일봉 (거래일 순).
    async fn get_rows_missing(&self, period: EmaPeriod) -> Result<Vec<Bar>>;

    /// `before` 이전에서 지표가 계산된 해당 종목의 가장 최근 일봉.
    async fn get_seed(
        &self,
        period: EmaPeriod,
        instrument_id: &str,
        before: NaiveDate,
    ) -> Result<Option<IndicatorBar>>;

    /// 특정 거래일의 모든 종목 일봉.
    async fn get_bars_on(&self, period: EmaPeriod, date: NaiveDate) -> Result<Vec<IndicatorBar>>;

    /// 한 종목의 기간 조회 (양 끝 포함).
    async fn get_range(
        &self,
        period: EmaPeriod,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorBar>>;

    /// 모든 종목의 기간 조회 (양 끝 포함, 거래일/종목 순).
    async fn get_between(
        &self,
        period: EmaPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorBar>>;

    /// 저장소 전체의 가장 최근 거래일.
    async fn latest_trade_date(&self) -> Result<Option<NaiveDate>>;

    /// 새 일봉을 추가합니다. 이미 있는 키가 하나라도 있으면 전체가 거부됩니다.
    async fn insert_bars(&self, bars: &[Bar]) -> Result<u64>;

    /// 기간의 지표를 전체 교체합니다 (전체 재계산 전용).
    ///
    /// 모든 행의 지표/신호를 비운 뒤 `rows`를 기록하며, 하나의 트랜잭션으로 처리됩니다.
    async fn replace_indicator(&self, period: EmaPeriod, rows: &[IndicatorRow]) -> Result<u64>;

    /// 스테이징 기반 병합 세션을 시작합니다.
    async fn begin_merge(&self, period: EmaPeriod) -> Result<Box<dyn MergeSession>>;
}

/// 기본 저장소와 분리된 스테이징 영역을 통한 병합 세션.
///
/// `commit` 전까지 기본 저장소에는 아무 변경도 보이지 않으며,
/// `discard`는 스테이징 영역과 적용 중이던 변경을 모두 버립니다.
#[async_trait]
pub trait MergeSession: Send {
    /// 배치를 스테이징 영역에 기록합니다.
    async fn stage(&mut self, rows: &[IndicatorRow]) -> Result<usize>;

    /// 기본 저장소에 없는 스테이징 키를 하나 찾습니다.
    async fn find_unmatched(&mut self) -> Result<Option<(String, NaiveDate)>>;

    /// 스테이징 값을 기본 저장소의 일치하는 행에 복사합니다.
    async fn apply(&mut self) -> Result<u64>;

    /// 변경을 확정하고 스테이징 영역을 제거합니다.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// 변경을 버리고 스테이징 영역을 제거합니다.
    async fn discard(self: Box<Self>) -> Result<()>;
}
