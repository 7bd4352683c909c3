//! 전체 재계산과 임의 간격의 증분 계산이 항상 같은 값을 내는지 검증합니다.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

use trendline_analytics::{ema_series, EmaEngine, EmaParams};
use trendline_core::{Bar, EmaPeriod};
use trendline_data::{MemorySeriesStore, SeriesStore};

fn to_bars(closes: &[i64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2022, 6, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, cents)| {
            let close = Decimal::new(*cents, 2);
            Bar::new(
                "000001.SZ",
                start + chrono::Duration::days(i as i64),
                close,
                close,
                close,
                close,
            )
        })
        .collect()
}

/// 일봉을 `cuts` 지점에서 나눠 한 구간씩 추가하며 계산한 EMA.
async fn incremental_emas(period: EmaPeriod, bars: &[Bar], cuts: &[usize]) -> Vec<Decimal> {
    let store = MemorySeriesStore::new();
    let engine = EmaEngine::new(Arc::new(store.clone()));

    let mut bounds: Vec<usize> = cuts.iter().map(|c| c % bars.len()).filter(|c| *c > 0).collect();
    bounds.push(bars.len());
    bounds.sort_unstable();
    bounds.dedup();

    store.insert_bars(&bars[..bounds[0]]).await.unwrap();
    engine.calc_history(period).await.unwrap();
    for pair in bounds.windows(2) {
        store.insert_bars(&bars[pair[0]..pair[1]]).await.unwrap();
        assert!(engine.update(period).await.unwrap());
    }

    let first = bars[0].trade_date;
    let last = bars[bars.len() - 1].trade_date;
    store
        .get_range(period, "000001.SZ", first, last)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.ema.unwrap())
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_incremental_matches_full_pass(
        closes in prop::collection::vec(100i64..100_000, 2..40),
        period in 1u32..120,
        cuts in prop::collection::vec(1usize..40, 1..5),
    ) {
        let period = EmaPeriod::new(period).unwrap();
        let bars = to_bars(&closes);
        let expected = ema_series(
            &bars.iter().map(|b| b.close).collect::<Vec<_>>(),
            EmaParams { period },
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let actual = runtime.block_on(incremental_emas(period, &bars, &cuts));

        prop_assert_eq!(actual, expected);
    }
}
