//! 증분 EMA 엔진.
//!
//! - `calc_history`: 전체 일봉으로 지표를 처음부터 다시 계산
//! - `update`: 저장된 직전 EMA를 시드로 비어 있는 일봉만 이어서 계산
//! - `find_crossover`: 가장 최근 거래일의 CrossoverSignal 종목 조회
//!
//! 같은 기간에 대한 쓰기 작업은 기간별 잠금으로 직렬화됩니다.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn, Instrument};
use trendline_core::{indicator_span, Bar, EmaPeriod, IndicatorRow};
use trendline_data::{DataError, MergeCoordinator, SeriesStore};

use crate::error::{EngineError, EngineResult};
use crate::indicators::{EmaParams, EmaState};
use crate::metrics::{compute_signal_metrics, SignalMetrics};
use crate::signal::SignalEvaluator;

/// 기간별 쓰기 잠금 맵.
#[derive(Debug, Clone, Default)]
pub struct PeriodLocks {
    locks: Arc<RwLock<HashMap<EmaPeriod, Arc<Mutex<()>>>>>,
}

impl PeriodLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기간의 잠금을 가져오거나 생성합니다.
    pub async fn get_or_create(&self, period: EmaPeriod) -> Arc<Mutex<()>> {
        let locks = self.locks.read().await;
        if let Some(lock) = locks.get(&period) {
            return lock.clone();
        }
        drop(locks);

        let mut locks = self.locks.write().await;
        locks
            .entry(period)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// 전체 재계산 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReport {
    pub period: EmaPeriod,
    /// 계산된 종목 수
    pub instruments: usize,
    /// 기록된 행 수
    pub rows: u64,
    /// 이번 실행에서 지표 컬럼을 새로 추가했는지 여부
    pub columns_created: bool,
    pub elapsed: Duration,
}

/// 증분 EMA 엔진.
#[derive(Clone)]
pub struct EmaEngine {
    store: Arc<dyn SeriesStore>,
    merger: MergeCoordinator,
    evaluator: SignalEvaluator,
    locks: PeriodLocks,
}

impl EmaEngine {
    /// 저장소로 엔진을 생성합니다.
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self {
            merger: MergeCoordinator::new(store.clone()),
            store,
            evaluator: SignalEvaluator::new(),
            locks: PeriodLocks::new(),
        }
    }

    /// 기간의 지표를 전체 일봉으로 다시 계산합니다.
    ///
    /// 기존 지표/신호 값은 모두 교체되며, 변경되지 않은 저장소에서 다시 실행하면
    /// 같은 결과를 기록합니다.
    pub async fn calc_history(&self, period: EmaPeriod) -> EngineResult<HistoryReport> {
        let lock = self.locks.get_or_create(period).await;
        let _guard = lock.lock().await;

        async {
            let started = Instant::now();
            let capabilities = self.store.ensure_indicator_columns(period).await?;
            let bars = self.store.get_full_history().await?;

            let groups = group_by_instrument(&bars);
            let params = EmaParams { period };
            let mut rows = Vec::with_capacity(bars.len());
            for (instrument_id, series) in &groups {
                let mut state = EmaState::new(params);
                for bar in series {
                    let ema = state.update(bar.close);
                    rows.push(IndicatorRow::new(
                        *instrument_id,
                        bar.trade_date,
                        ema,
                        Some(self.evaluator.trend(bar, ema)),
                    ));
                }
            }

            let written = self.store.replace_indicator(period, &rows).await?;
            let report = HistoryReport {
                period,
                instruments: groups.len(),
                rows: written,
                columns_created: capabilities.created,
                elapsed: started.elapsed(),
            };

            info!(
                instruments = report.instruments,
                rows = report.rows,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "전체 재계산 완료"
            );
            Ok::<_, EngineError>(report)
        }
        .instrument(indicator_span!("calc_history", period))
        .await
    }

    /// 비어 있는 일봉의 지표를 저장된 시드에서 이어서 계산합니다.
    ///
    /// 새로 계산한 행이 있으면 `true`, 이미 최신이면 `false`(쓰기 없음)를 반환합니다.
    /// 시드가 없는 종목이 하나라도 있으면 아무것도 기록하지 않고
    /// [`EngineError::NeedsHistory`]를 반환합니다.
    pub async fn update(&self, period: EmaPeriod) -> EngineResult<bool> {
        let lock = self.locks.get_or_create(period).await;
        let _guard = lock.lock().await;

        async {
            if !self.store.has_column(&period.column_name()).await? {
                warn!("지표 컬럼 없음, 전체 재계산 필요");
                return Err(EngineError::NeedsHistory {
                    period,
                    instrument_id: None,
                });
            }

            let missing = self.store.get_rows_missing(period).await?;
            if missing.is_empty() {
                debug!("계산할 일봉 없음");
                return Ok(false);
            }

            let groups = group_by_instrument(&missing);
            let params = EmaParams { period };

            // 모든 시드를 먼저 확인해 쓰기 전에 실패하도록 함
            let mut seeded = Vec::with_capacity(groups.len());
            for (instrument_id, series) in &groups {
                let first_missing = series[0].trade_date;
                let seed = self
                    .store
                    .get_seed(period, instrument_id, first_missing)
                    .await?
                    .and_then(|seed| seed.ema);
                match seed {
                    Some(ema) => seeded.push((*instrument_id, EmaState::seeded(params, ema), series)),
                    None => {
                        warn!(
                            instrument_id = %instrument_id,
                            first_missing = %first_missing,
                            "시드 없음, 전체 재계산 필요"
                        );
                        return Err(EngineError::NeedsHistory {
                            period,
                            instrument_id: Some(instrument_id.to_string()),
                        });
                    }
                }
            }

            let mut rows = Vec::with_capacity(missing.len());
            for (instrument_id, mut state, series) in seeded {
                for bar in series {
                    let ema = state.update(bar.close);
                    rows.push(IndicatorRow::new(
                        instrument_id,
                        bar.trade_date,
                        ema,
                        Some(self.evaluator.trend(bar, ema)),
                    ));
                }
            }

            let outcome = self.merger.merge_columns(period, &rows).await?;
            info!(
                instruments = groups.len(),
                rows = outcome.applied,
                "증분 계산 완료"
            );
            Ok(true)
        }
        .instrument(indicator_span!("update", period))
        .await
    }

    /// 가장 최근 거래일에 CrossoverSignal이 참인 종목 코드 (정렬, 중복 제거).
    pub async fn find_crossover(&self, period: EmaPeriod) -> EngineResult<Vec<String>> {
        let Some(latest) = self.store.latest_trade_date().await? else {
            debug!(period = %period, "빈 저장소, 교차 종목 없음");
            return Ok(Vec::new());
        };
        if !self.store.has_column(&period.column_name()).await? {
            debug!(period = %period, "지표 컬럼 없음, 교차 종목 없음");
            return Ok(Vec::new());
        }

        let bars = self.store.get_bars_on(period, latest).await?;
        let crossed: BTreeSet<String> = bars
            .into_iter()
            .filter_map(|row| {
                let ema = row.ema?;
                self.evaluator
                    .crossover(&row.bar, ema)
                    .then_some(row.bar.instrument_id)
            })
            .collect();

        info!(
            period = %period,
            trade_date = %latest,
            count = crossed.len(),
            "교차 종목 조회 완료"
        );
        Ok(crossed.into_iter().collect())
    }

    /// 구간 안의 TrendSignal 성과를 종목별로 집계합니다.
    pub async fn signal_metrics(
        &self,
        period: EmaPeriod,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<SignalMetrics>> {
        if start > end {
            return Err(DataError::InvalidData(format!(
                "start {} is after end {}",
                start, end
            ))
            .into());
        }

        let bars = self.store.get_between(period, start, end).await?;
        let metrics = compute_signal_metrics(&bars);
        debug!(
            period = %period,
            instruments = metrics.len(),
            "신호 성과 집계 완료"
        );
        Ok(metrics)
    }
}

/// 종목별로 묶고 각 종목 안에서 거래일 순으로 정렬합니다.
fn group_by_instrument(bars: &[Bar]) -> BTreeMap<&str, Vec<&Bar>> {
    let mut groups: BTreeMap<&str, Vec<&Bar>> = BTreeMap::new();
    for bar in bars {
        groups.entry(bar.instrument_id.as_str()).or_default().push(bar);
    }
    for series in groups.values_mut() {
        series.sort_by_key(|bar| bar.trade_date);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, day).unwrap()
    }

    #[test]
    fn test_group_by_instrument_orders_dates() {
        let bars = vec![
            Bar::new("B", date(2), dec!(1), dec!(1), dec!(1), dec!(1)),
            Bar::new("A", date(3), dec!(1), dec!(1), dec!(1), dec!(1)),
            Bar::new("A", date(1), dec!(1), dec!(1), dec!(1), dec!(1)),
        ];
        let groups = group_by_instrument(&bars);
        assert_eq!(groups.keys().copied().collect::<Vec<_>>(), vec!["A", "B"]);
        let a_dates: Vec<NaiveDate> = groups["A"].iter().map(|b| b.trade_date).collect();
        assert_eq!(a_dates, vec![date(1), date(3)]);
    }

    #[tokio::test]
    async fn test_period_locks_are_shared_per_period() {
        let locks = PeriodLocks::new();
        let a = locks.get_or_create(EmaPeriod::EMA_50).await;
        let b = locks.get_or_create(EmaPeriod::EMA_50).await;
        let c = locks.get_or_create(EmaPeriod::EMA_100).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let _held = a.lock().await;
        assert!(b.try_lock().is_err());
        assert!(c.try_lock().is_ok());
    }
}
