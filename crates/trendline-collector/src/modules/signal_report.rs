//! 신호 조회 모듈.
//!
//! 교차 종목 목록과 신호 성과를 JSON으로 만들어 알림/리포트 쪽에 넘깁니다.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use trendline_analytics::{EmaEngine, SignalMetrics};
use trendline_core::EmaPeriod;

use crate::error::CollectorError;
use crate::Result;

/// 신호 성과 리포트
#[derive(Debug, Serialize)]
pub struct MetricsReport {
    pub period: EmaPeriod,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub instruments: Vec<SignalMetrics>,
}

/// `YYYYMMDD` 형식의 거래일을 파싱합니다.
pub fn parse_trade_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").map_err(|e| {
        CollectorError::InvalidArgument(format!("날짜 형식 오류 ({}): {}", value, e))
    })
}

/// 가장 최근 거래일의 교차 종목 목록 (JSON 배열).
pub async fn crossover_report(engine: &EmaEngine, period: EmaPeriod) -> Result<String> {
    let instruments = engine.find_crossover(period).await?;
    info!(period = %period, count = instruments.len(), "교차 종목 조회");
    Ok(serde_json::to_string(&instruments)?)
}

/// 구간 신호 성과 리포트 (JSON).
pub async fn metrics_report(
    engine: &EmaEngine,
    period: EmaPeriod,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<String> {
    let instruments = engine.signal_metrics(period, start, end).await?;
    let report = MetricsReport {
        period,
        start,
        end,
        instruments,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use trendline_core::Bar;
    use trendline_data::{MemorySeriesStore, SeriesStore};

    #[test]
    fn test_parse_trade_date() {
        assert_eq!(
            parse_trade_date("20240105").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()
        );
        assert!(parse_trade_date("2024-01-05").is_err());
        assert!(parse_trade_date("20241305").is_err());
    }

    #[tokio::test]
    async fn test_crossover_report_is_json_list() {
        let store = MemorySeriesStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        store
            .insert_bars(&[
                Bar::new("600000.SH", date, dec!(10), dec!(10.4), dec!(9.9), dec!(10.5)),
                Bar::new("000001.SZ", date, dec!(10), dec!(10.4), dec!(9.9), dec!(10.5)),
            ])
            .await
            .unwrap();
        let engine = EmaEngine::new(Arc::new(store));
        let period = EmaPeriod::new(1).unwrap();

        assert_eq!(crossover_report(&engine, period).await.unwrap(), "[]");

        engine.calc_history(period).await.unwrap();
        assert_eq!(
            crossover_report(&engine, period).await.unwrap(),
            r#"["000001.SZ","600000.SH"]"#
        );
    }
}
