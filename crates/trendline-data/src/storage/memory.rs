//! 프로세스 내 시계열 저장소.
//!
//! PostgreSQL 구현과 같은 의미론을 갖습니다. 병합 세션은 저장소의 쓰기 잠금을
//! 세션이 끝날 때까지 보유하고, 변경 사항을 `commit` 시점에만 반영합니다.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, warn};
use trendline_core::{Bar, EmaPeriod, IndicatorBar, IndicatorRow};

use super::{MergeSession, SchemaCapabilities, SeriesStore};
use crate::error::{DataError, Result};

type BarKey = (String, NaiveDate);

#[derive(Debug, Clone)]
struct StoredBar {
    bar: Bar,
    ema: HashMap<EmaPeriod, Decimal>,
    trend: HashMap<EmaPeriod, bool>,
}

impl StoredBar {
    fn view(&self, period: EmaPeriod) -> IndicatorBar {
        IndicatorBar::new(
            self.bar.clone(),
            self.ema.get(&period).copied(),
            self.trend.get(&period).copied(),
        )
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    rows: BTreeMap<BarKey, StoredBar>,
    columns: BTreeSet<String>,
    /// 다음 병합의 apply 단계에서 n개 행을 처리한 뒤 실패시킴
    merge_fault: Option<usize>,
    writes: u64,
}

impl MemoryInner {
    fn require_columns(&self, period: EmaPeriod) -> Result<()> {
        let column = period.column_name();
        if self.columns.contains(&column) {
            Ok(())
        } else {
            Err(DataError::StoreUnavailable(format!(
                "column \"{}\" does not exist",
                column
            )))
        }
    }

    fn sorted_views<F>(&self, period: EmaPeriod, filter: F) -> Vec<IndicatorBar>
    where
        F: Fn(&StoredBar) -> bool,
    {
        let mut views: Vec<IndicatorBar> = self
            .rows
            .values()
            .filter(|stored| filter(stored))
            .map(|stored| stored.view(period))
            .collect();
        views.sort_by(|a, b| {
            (a.bar.trade_date, &a.bar.instrument_id).cmp(&(b.bar.trade_date, &b.bar.instrument_id))
        });
        views
    }
}

/// 메모리 기반 [`SeriesStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySeriesStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemorySeriesStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 병합이 `rows`개 행을 적용한 뒤 저장소 장애로 실패하도록 설정합니다.
    pub async fn fail_next_merge_after(&self, rows: usize) {
        self.inner.write().await.merge_fault = Some(rows);
    }

    /// 지금까지 확정된 쓰기 작업 수.
    pub async fn write_count(&self) -> u64 {
        self.inner.read().await.writes
    }
}

#[async_trait]
impl SeriesStore for MemorySeriesStore {
    async fn ensure_indicator_columns(&self, period: EmaPeriod) -> Result<SchemaCapabilities> {
        let mut inner = self.inner.write().await;
        let created = inner.columns.insert(period.column_name());
        inner.columns.insert(period.signal_column_name());
        if created {
            inner.writes += 1;
            debug!(period = %period, "지표 컬럼 추가");
        }
        Ok(SchemaCapabilities {
            has_indicator: true,
            has_signal: true,
            created,
        })
    }

    async fn has_column(&self, name: &str) -> Result<bool> {
        Ok(self.inner.read().await.columns.contains(name))
    }

    async fn get_full_history(&self) -> Result<Vec<Bar>> {
        let inner = self.inner.read().await;
        let mut bars: Vec<Bar> = inner.rows.values().map(|s| s.bar.clone()).collect();
        bars.sort_by(|a, b| (a.trade_date, &a.instrument_id).cmp(&(b.trade_date, &b.instrument_id)));
        Ok(bars)
    }

    async fn get_rows_missing(&self, period: EmaPeriod) -> Result<Vec<Bar>> {
        let inner = self.inner.read().await;
        inner.require_columns(period)?;
        Ok(inner
            .sorted_views(period, |s| !s.ema.contains_key(&period))
            .into_iter()
            .map(|v| v.bar)
            .collect())
    }

    async fn get_seed(
        &self,
        period: EmaPeriod,
        instrument_id: &str,
        before: NaiveDate,
    ) -> Result<Option<IndicatorBar>> {
        let inner = self.inner.read().await;
        inner.require_columns(period)?;
        let start = (instrument_id.to_string(), NaiveDate::MIN);
        let end = (instrument_id.to_string(), before);
        Ok(inner
            .rows
            .range(start..end)
            .rev()
            .map(|(_, stored)| stored)
            .find(|stored| stored.ema.contains_key(&period))
            .map(|stored| stored.view(period)))
    }

    async fn get_bars_on(&self, period: EmaPeriod, date: NaiveDate) -> Result<Vec<IndicatorBar>> {
        let inner = self.inner.read().await;
        inner.require_columns(period)?;
        Ok(inner.sorted_views(period, |s| s.bar.trade_date == date))
    }

    async fn get_range(
        &self,
        period: EmaPeriod,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorBar>> {
        let inner = self.inner.read().await;
        inner.require_columns(period)?;
        Ok(inner.sorted_views(period, |s| {
            s.bar.instrument_id == instrument_id
                && s.bar.trade_date >= start
                && s.bar.trade_date <= end
        }))
    }

    async fn get_between(
        &self,
        period: EmaPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<IndicatorBar>> {
        let inner = self.inner.read().await;
        inner.require_columns(period)?;
        Ok(inner.sorted_views(period, |s| {
            s.bar.trade_date >= start && s.bar.trade_date <= end
        }))
    }

    async fn latest_trade_date(&self) -> Result<Option<NaiveDate>> {
        let inner = self.inner.read().await;
        Ok(inner.rows.keys().map(|(_, date)| *date).max())
    }

    async fn insert_bars(&self, bars: &[Bar]) -> Result<u64> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.write().await;
        let mut seen = HashSet::with_capacity(bars.len());
        for bar in bars {
            let key = (bar.instrument_id.clone(), bar.trade_date);
            if inner.rows.contains_key(&key) || !seen.insert(key) {
                return Err(DataError::DuplicateBar(format!(
                    "({}, {})",
                    bar.instrument_id, bar.trade_date
                )));
            }
        }

        for bar in bars {
            inner.rows.insert(
                (bar.instrument_id.clone(), bar.trade_date),
                StoredBar {
                    bar: bar.clone(),
                    ema: HashMap::new(),
                    trend: HashMap::new(),
                },
            );
        }
        inner.writes += 1;
        Ok(bars.len() as u64)
    }

    async fn replace_indicator(&self, period: EmaPeriod, rows: &[IndicatorRow]) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.require_columns(period)?;

        if let Some(row) = rows
            .iter()
            .find(|row| !inner.rows.contains_key(&(row.instrument_id.clone(), row.trade_date)))
        {
            return Err(DataError::KeyMismatch {
                instrument_id: row.instrument_id.clone(),
                trade_date: row.trade_date,
            });
        }

        for stored in inner.rows.values_mut() {
            stored.ema.remove(&period);
            stored.trend.remove(&period);
        }

        for row in rows {
            if let Some(stored) = inner.rows.get_mut(&(row.instrument_id.clone(), row.trade_date)) {
                stored.ema.insert(period, row.ema);
                if let Some(trend) = row.trend {
                    stored.trend.insert(period, trend);
                }
            }
        }
        inner.writes += 1;
        Ok(rows.len() as u64)
    }

    async fn begin_merge(&self, period: EmaPeriod) -> Result<Box<dyn MergeSession>> {
        let guard = self.inner.clone().write_owned().await;
        guard.require_columns(period)?;
        Ok(Box::new(MemoryMergeSession {
            guard,
            period,
            staging: BTreeMap::new(),
            pending: Vec::new(),
        }))
    }
}

/// 메모리 저장소의 병합 세션.
pub struct MemoryMergeSession {
    guard: OwnedRwLockWriteGuard<MemoryInner>,
    period: EmaPeriod,
    staging: BTreeMap<BarKey, (Decimal, Option<bool>)>,
    pending: Vec<(BarKey, Decimal, Option<bool>)>,
}

#[async_trait]
impl MergeSession for MemoryMergeSession {
    async fn stage(&mut self, rows: &[IndicatorRow]) -> Result<usize> {
        for row in rows {
            let key = (row.instrument_id.clone(), row.trade_date);
            if self.staging.insert(key, (row.ema, row.trend)).is_some() {
                return Err(DataError::InvalidData(format!(
                    "duplicate staging key ({}, {})",
                    row.instrument_id, row.trade_date
                )));
            }
        }
        Ok(self.staging.len())
    }

    async fn find_unmatched(&mut self) -> Result<Option<(String, NaiveDate)>> {
        Ok(self
            .staging
            .keys()
            .find(|key| !self.guard.rows.contains_key(*key))
            .cloned())
    }

    async fn apply(&mut self) -> Result<u64> {
        let fault = self.guard.merge_fault.take();
        self.pending.clear();

        for (key, (ema, trend)) in &self.staging {
            if fault == Some(self.pending.len()) {
                warn!(applied = self.pending.len(), "병합 중 저장소 장애 발생 (주입)");
                return Err(DataError::StoreUnavailable(format!(
                    "injected fault after {} rows",
                    self.pending.len()
                )));
            }
            if self.guard.rows.contains_key(key) {
                self.pending.push((key.clone(), *ema, *trend));
            }
        }
        Ok(self.pending.len() as u64)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryMergeSession {
            mut guard,
            period,
            pending,
            ..
        } = *self;

        for (key, ema, trend) in pending {
            if let Some(stored) = guard.rows.get_mut(&key) {
                stored.ema.insert(period, ema);
                match trend {
                    Some(trend) => stored.trend.insert(period, trend),
                    None => stored.trend.remove(&period),
                };
            }
        }
        guard.writes += 1;
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<()> {
        debug!(
            period = %self.period,
            staged = self.staging.len(),
            "병합 세션 폐기"
        );
        Ok(())
    }
}
