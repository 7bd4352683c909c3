//! 엔진 통합 테스트 (메모리 저장소).
//!
//! 전체 재계산과 증분 계산이 같은 결과를 내는지, 실패 시 저장소가
//! 변경되지 않는지를 검증합니다.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use trendline_analytics::{EmaEngine, EngineError};
use trendline_core::{Bar, EmaPeriod, IndicatorBar};
use trendline_data::{DataError, MemorySeriesStore, SeriesStore};

const INSTRUMENTS: [&str; 3] = ["000001.SZ", "600000.SH", "600519.SH"];

fn date(offset: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(offset)
}

/// 결정적인 합성 일봉 (종가 10.00 ~ 11.99).
fn synthetic_bar(instrument_idx: usize, day: i64) -> Bar {
    let cents = 1000 + (day * 37 + instrument_idx as i64 * 53).rem_euclid(200);
    let close = Decimal::new(cents, 2);
    let open = if day % 3 == 0 { close - dec!(0.15) } else { close + dec!(0.07) };
    Bar::new(
        INSTRUMENTS[instrument_idx],
        date(day),
        open,
        close,
        open.min(close) - dec!(0.1),
        open.max(close) + dec!(0.1),
    )
}

fn bars_for_days(days: std::ops::Range<i64>) -> Vec<Bar> {
    days.flat_map(|day| (0..INSTRUMENTS.len()).map(move |idx| synthetic_bar(idx, day)))
        .collect()
}

fn engine_for(store: &MemorySeriesStore) -> EmaEngine {
    EmaEngine::new(Arc::new(store.clone()))
}

async fn snapshot(store: &MemorySeriesStore, period: EmaPeriod) -> Vec<IndicatorBar> {
    store.get_between(period, date(-1), date(1000)).await.unwrap()
}

#[tokio::test]
async fn test_incremental_updates_match_full_history() {
    let period = EmaPeriod::new(5).unwrap();

    let full = MemorySeriesStore::new();
    full.insert_bars(&bars_for_days(0..30)).await.unwrap();
    engine_for(&full).calc_history(period).await.unwrap();

    let incremental = MemorySeriesStore::new();
    let engine = engine_for(&incremental);
    incremental.insert_bars(&bars_for_days(0..10)).await.unwrap();
    engine.calc_history(period).await.unwrap();

    // 하루, 여러 날, 다시 하루 간격으로 이어서 계산
    for days in [10..11, 11..18, 18..19, 19..30] {
        incremental.insert_bars(&bars_for_days(days)).await.unwrap();
        assert!(engine.update(period).await.unwrap());
    }

    let expected = snapshot(&full, period).await;
    let actual = snapshot(&incremental, period).await;
    assert_eq!(expected.len(), 30 * INSTRUMENTS.len());
    assert_eq!(actual, expected);
    assert!(actual.iter().all(|row| row.ema.is_some() && row.trend.is_some()));
}

#[tokio::test]
async fn test_update_without_new_rows_is_noop() {
    let period = EmaPeriod::EMA_50;
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    store.insert_bars(&bars_for_days(0..5)).await.unwrap();
    engine.calc_history(period).await.unwrap();

    store.insert_bars(&bars_for_days(5..6)).await.unwrap();
    assert!(engine.update(period).await.unwrap());

    let writes = store.write_count().await;
    let before = snapshot(&store, period).await;
    assert!(!engine.update(period).await.unwrap());
    assert_eq!(store.write_count().await, writes);
    assert_eq!(snapshot(&store, period).await, before);
}

#[tokio::test]
async fn test_calc_history_is_repeatable() {
    let period = EmaPeriod::new(7).unwrap();
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    store.insert_bars(&bars_for_days(0..12)).await.unwrap();

    let first = engine.calc_history(period).await.unwrap();
    let before = snapshot(&store, period).await;
    let second = engine.calc_history(period).await.unwrap();

    assert!(first.columns_created);
    assert!(!second.columns_created);
    assert_eq!(first.rows, second.rows);
    assert_eq!(first.instruments, INSTRUMENTS.len());
    assert_eq!(snapshot(&store, period).await, before);
}

#[tokio::test]
async fn test_period_one_tracks_close() {
    let period = EmaPeriod::new(1).unwrap();
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    store.insert_bars(&bars_for_days(0..4)).await.unwrap();
    engine.calc_history(period).await.unwrap();
    store.insert_bars(&bars_for_days(4..8)).await.unwrap();
    engine.update(period).await.unwrap();

    for row in snapshot(&store, period).await {
        assert_eq!(row.ema, Some(row.bar.close));
        // low <= close <= close
        assert_eq!(row.trend, Some(true));
    }
}

#[tokio::test]
async fn test_recursion_from_stored_seed() {
    let period = EmaPeriod::new(3).unwrap();
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    let closes = [dec!(10), dec!(12), dec!(11), dec!(13), dec!(14)];
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::new("A", date(i as i64), *c, *c, *c, *c))
        .collect();

    store.insert_bars(&bars[..3]).await.unwrap();
    engine.calc_history(period).await.unwrap();
    store.insert_bars(&bars[3..]).await.unwrap();
    assert!(engine.update(period).await.unwrap());

    let emas: Vec<Decimal> = store
        .get_range(period, "A", date(0), date(4))
        .await
        .unwrap()
        .into_iter()
        .filter_map(|row| row.ema)
        .collect();
    assert_eq!(emas, vec![dec!(10), dec!(11), dec!(11), dec!(12), dec!(13)]);
}

#[tokio::test]
async fn test_missing_seed_leaves_store_unchanged() {
    let period = EmaPeriod::new(4).unwrap();
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    store.insert_bars(&bars_for_days(0..6)).await.unwrap();
    engine.calc_history(period).await.unwrap();

    // 기존 종목의 새 일봉과 이력이 없는 신규 종목
    store
        .insert_bars(&[
            synthetic_bar(0, 6),
            Bar::new("688981.SH", date(6), dec!(50), dec!(51), dec!(49.5), dec!(51.2)),
        ])
        .await
        .unwrap();

    let writes = store.write_count().await;
    let before = snapshot(&store, period).await;

    let err = engine.update(period).await.unwrap_err();
    match &err {
        EngineError::NeedsHistory {
            period: p,
            instrument_id,
        } => {
            assert_eq!(*p, period);
            assert_eq!(instrument_id.as_deref(), Some("688981.SH"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(store.write_count().await, writes);
    assert_eq!(snapshot(&store, period).await, before);
    assert_eq!(store.get_rows_missing(period).await.unwrap().len(), 2);

    // 전체 재계산으로 복구
    engine.calc_history(period).await.unwrap();
    assert!(store.get_rows_missing(period).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_before_history_needs_history() {
    let store = MemorySeriesStore::new();
    store.insert_bars(&bars_for_days(0..3)).await.unwrap();

    let err = engine_for(&store).update(EmaPeriod::EMA_100).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::NeedsHistory {
            instrument_id: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_merge_is_atomic_and_retry_succeeds() {
    let period = EmaPeriod::new(5).unwrap();

    let reference = MemorySeriesStore::new();
    reference.insert_bars(&bars_for_days(0..12)).await.unwrap();
    engine_for(&reference).calc_history(period).await.unwrap();

    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    store.insert_bars(&bars_for_days(0..8)).await.unwrap();
    engine.calc_history(period).await.unwrap();
    store.insert_bars(&bars_for_days(8..12)).await.unwrap();

    let before = snapshot(&store, period).await;
    store.fail_next_merge_after(5).await;

    let err = engine.update(period).await.unwrap_err();
    assert!(matches!(err, EngineError::Data(DataError::StoreUnavailable(_))));
    assert!(err.is_retryable());
    assert_eq!(snapshot(&store, period).await, before);
    assert_eq!(store.get_rows_missing(period).await.unwrap().len(), 4 * INSTRUMENTS.len());

    assert!(engine.update(period).await.unwrap());
    assert_eq!(snapshot(&store, period).await, snapshot(&reference, period).await);
}

#[tokio::test]
async fn test_find_crossover_on_latest_date() {
    let period = EmaPeriod::new(1).unwrap();
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);

    assert!(engine.find_crossover(period).await.unwrap().is_empty());

    store
        .insert_bars(&[
            Bar::new("B", date(0), dec!(10), dec!(11), dec!(9), dec!(12)),
            Bar::new("C", date(0), dec!(10), dec!(11), dec!(9), dec!(12)),
            // 양봉: 시가 <= 종가(=EMA) <= 종가
            Bar::new("B", date(1), dec!(10), dec!(11), dec!(9.8), dec!(11.2)),
            Bar::new("A", date(1), dec!(10.2), dec!(10.2), dec!(10), dec!(10.5)),
            // 음봉: EMA가 시가보다 낮음
            Bar::new("D", date(1), dec!(12), dec!(11), dec!(10.9), dec!(12.1)),
        ])
        .await
        .unwrap();

    // 지표 계산 전에는 교차 종목 없음
    assert!(engine.find_crossover(period).await.unwrap().is_empty());

    engine.calc_history(period).await.unwrap();
    let crossed = engine.find_crossover(period).await.unwrap();
    assert_eq!(crossed, vec!["A".to_string(), "B".to_string()]);
}

#[tokio::test]
async fn test_signal_metrics_over_window() {
    let period = EmaPeriod::new(1).unwrap();
    let store = MemorySeriesStore::new();
    let engine = engine_for(&store);
    store
        .insert_bars(&[
            Bar::new("A", date(0), dec!(10), dec!(10), dec!(9.5), dec!(10.5)),
            Bar::new("A", date(1), dec!(10), dec!(11), dec!(9.9), dec!(11.1)),
            Bar::new("A", date(2), dec!(11), dec!(12), dec!(10.9), dec!(12.1)),
        ])
        .await
        .unwrap();
    engine.calc_history(period).await.unwrap();

    // 기간 1이면 모든 일봉의 TrendSignal이 참: 진입가 10, 11 → 청산가 12
    let metrics = engine.signal_metrics(period, date(0), date(2)).await.unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].signal_count, 2);
    assert_eq!(metrics[0].win_rate, dec!(100));
    assert_eq!(metrics[0].worst_return, dec!(0));
    assert_eq!(metrics[0].avg_return, dec!(14.55));

    let err = engine.signal_metrics(period, date(2), date(0)).await.unwrap_err();
    assert!(matches!(err, EngineError::Data(DataError::InvalidData(_))));
}
