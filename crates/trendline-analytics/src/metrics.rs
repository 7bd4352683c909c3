//! 신호 성과 지표.
//!
//! 구간 안에서 TrendSignal이 참인 일봉마다 다음 거래일 시가에 진입해
//! 구간 마지막 종가까지 보유했다고 가정하고 수익률을 집계합니다.
//! 최저 수익률은 손실 폭을 나타내므로 0을 넘지 않습니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trendline_core::{DecimalExt, IndicatorBar};

/// 종목별 신호 성과.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetrics {
    pub instrument_id: String,
    /// 진입 횟수
    pub signal_count: usize,
    /// 수익 진입 비율 (%)
    pub win_rate: Decimal,
    /// 최저 수익률 (%, 최대 0)
    pub worst_return: Decimal,
    /// 평균 수익률 (%)
    pub avg_return: Decimal,
}

impl SignalMetrics {
    fn empty(instrument_id: String) -> Self {
        Self {
            instrument_id,
            signal_count: 0,
            win_rate: Decimal::ZERO,
            worst_return: Decimal::ZERO,
            avg_return: Decimal::ZERO,
        }
    }
}

/// 구간 일봉으로 종목별 성과를 계산합니다 (종목 코드 순).
pub fn compute_signal_metrics(bars: &[IndicatorBar]) -> Vec<SignalMetrics> {
    let mut by_instrument: BTreeMap<&str, Vec<&IndicatorBar>> = BTreeMap::new();
    for bar in bars {
        by_instrument
            .entry(bar.bar.instrument_id.as_str())
            .or_default()
            .push(bar);
    }

    by_instrument
        .into_iter()
        .map(|(instrument_id, mut series)| {
            series.sort_by_key(|b| b.bar.trade_date);
            instrument_metrics(instrument_id, &series)
        })
        .collect()
}

fn instrument_metrics(instrument_id: &str, series: &[&IndicatorBar]) -> SignalMetrics {
    let Some(last) = series.last() else {
        return SignalMetrics::empty(instrument_id.to_string());
    };
    let exit = last.bar.close;

    let returns: Vec<Decimal> = series
        .windows(2)
        .filter(|pair| pair[0].trend == Some(true))
        .map(|pair| pair[1].bar.open)
        .filter(|entry| !entry.is_zero())
        .map(|entry| (exit - entry) / entry)
        .collect();

    if returns.is_empty() {
        return SignalMetrics::empty(instrument_id.to_string());
    }

    let count = Decimal::from(returns.len());
    let wins = returns.iter().filter(|r| r.is_sign_positive() && !r.is_zero()).count();
    let worst = returns
        .iter()
        .copied()
        .min()
        .unwrap_or_default()
        .min(Decimal::ZERO);
    let total: Decimal = returns.iter().copied().sum();

    SignalMetrics {
        instrument_id: instrument_id.to_string(),
        signal_count: returns.len(),
        win_rate: (Decimal::from(wins) / count).to_percentage(),
        worst_return: worst.to_percentage(),
        avg_return: (total / count).to_percentage(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use trendline_core::Bar;

    fn row(id: &str, day: u32, open: Decimal, close: Decimal, trend: bool) -> IndicatorBar {
        let bar = Bar::new(
            id,
            NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            open,
            close,
            open.min(close),
            open.max(close),
        );
        IndicatorBar::new(bar, Some(close), Some(trend))
    }

    #[test]
    fn test_entries_use_next_open_and_last_close() {
        let bars = vec![
            row("A", 1, dec!(10), dec!(10), true),
            row("A", 2, dec!(10), dec!(11), true),
            row("A", 3, dec!(12.5), dec!(12), false),
            row("A", 4, dec!(12), dec!(12), true),
        ];
        let metrics = compute_signal_metrics(&bars);
        assert_eq!(metrics.len(), 1);

        // 진입가 10 → +20%, 12.5 → -4%; 마지막 일봉 신호는 다음 거래일이 없어 제외
        let a = &metrics[0];
        assert_eq!(a.signal_count, 2);
        assert_eq!(a.win_rate, dec!(50));
        assert_eq!(a.worst_return, dec!(-4));
        assert_eq!(a.avg_return, dec!(8));
    }

    #[test]
    fn test_worst_return_never_positive() {
        let bars = vec![
            row("C", 1, dec!(10), dec!(10), true),
            row("C", 2, dec!(10), dec!(11), true),
            row("C", 3, dec!(11), dec!(12), false),
        ];
        let metrics = compute_signal_metrics(&bars);

        // 진입가 10 → +20%, 11 → +9.09%; 손실 진입이 없으므로 최저 수익률은 0
        let c = &metrics[0];
        assert_eq!(c.signal_count, 2);
        assert_eq!(c.win_rate, dec!(100));
        assert_eq!(c.worst_return, Decimal::ZERO);
        assert_eq!(c.avg_return, dec!(14.55));
    }

    #[test]
    fn test_instrument_without_signals_reports_zeros() {
        let bars = vec![
            row("B", 2, dec!(5), dec!(6), false),
            row("B", 1, dec!(5), dec!(5), false),
        ];
        let metrics = compute_signal_metrics(&bars);
        assert_eq!(metrics, vec![SignalMetrics::empty("B".to_string())]);
    }

    #[test]
    fn test_output_sorted_by_instrument() {
        let bars = vec![
            row("Z", 1, dec!(1), dec!(1), false),
            row("M", 1, dec!(1), dec!(1), false),
        ];
        let ids: Vec<String> = compute_signal_metrics(&bars)
            .into_iter()
            .map(|m| m.instrument_id)
            .collect();
        assert_eq!(ids, vec!["M".to_string(), "Z".to_string()]);
    }
}
