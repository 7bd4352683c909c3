//! 지표 동기화 모듈.
//!
//! 기간별로 증분 계산을 시도하고, 시드가 없으면 전체 재계산으로 전환합니다.

use std::time::Instant;
use tracing::{error, info, warn};

use trendline_analytics::{EmaEngine, EngineError};
use trendline_core::EmaPeriod;

use crate::stats::RunStats;
use crate::Result;

/// 한 기간의 동기화 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodOutcome {
    /// 새 일봉을 증분 계산함
    Updated,
    /// 이미 최신
    UpToDate,
    /// 전체 재계산함 (기록된 행 수)
    Recomputed(u64),
}

/// 한 기간을 동기화합니다.
///
/// 증분 계산이 `NeedsHistory`로 실패하면 전체 재계산을 실행합니다.
/// 그 밖의 오류는 그대로 반환됩니다.
pub async fn sync_period(engine: &EmaEngine, period: EmaPeriod) -> Result<PeriodOutcome> {
    match engine.update(period).await {
        Ok(true) => Ok(PeriodOutcome::Updated),
        Ok(false) => Ok(PeriodOutcome::UpToDate),
        Err(e @ EngineError::NeedsHistory { .. }) => {
            warn!(period = %period, reason = %e, "증분 계산 불가, 전체 재계산 실행");
            let report = engine.calc_history(period).await?;
            Ok(PeriodOutcome::Recomputed(report.rows))
        }
        Err(e) => Err(e.into()),
    }
}

/// 여러 기간을 순서대로 동기화합니다.
///
/// 한 기간의 실패는 기록만 하고 나머지 기간은 계속 처리합니다.
pub async fn sync_indicators(engine: &EmaEngine, periods: &[EmaPeriod]) -> RunStats {
    let start = Instant::now();
    let mut stats = RunStats::new();

    for period in periods {
        stats.total += 1;
        match sync_period(engine, *period).await {
            Ok(PeriodOutcome::Updated) => {
                stats.updated += 1;
                info!(period = %period, "증분 계산 완료");
            }
            Ok(PeriodOutcome::UpToDate) => {
                stats.skipped += 1;
                info!(period = %period, "이미 최신 상태");
            }
            Ok(PeriodOutcome::Recomputed(rows)) => {
                stats.recomputed += 1;
                stats.history_rows += rows;
            }
            Err(e) => {
                stats.errors += 1;
                error!(period = %period, error = %e, "지표 동기화 실패");
            }
        }
    }

    stats.elapsed = start.elapsed();
    stats
}

/// 기간들의 지표를 전체 재계산합니다.
pub async fn recalc_history(engine: &EmaEngine, periods: &[EmaPeriod]) -> Result<RunStats> {
    let start = Instant::now();
    let mut stats = RunStats::new();

    for period in periods {
        stats.total += 1;
        let report = engine.calc_history(*period).await?;
        stats.recomputed += 1;
        stats.history_rows += report.rows;
    }

    stats.elapsed = start.elapsed();
    Ok(stats)
}
