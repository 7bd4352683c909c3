//! 지표 배치의 원자적 병합.
//!
//! 배치는 먼저 스테이징 영역에 기록되고, 모든 키가 기본 저장소에 존재하는 것이
//! 확인된 뒤에만 한 번에 반영됩니다. 어느 단계에서 실패하든 기본 저장소는
//! 병합 이전 상태 그대로 남습니다.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use trendline_core::{EmaPeriod, IndicatorRow};

use crate::error::{DataError, Result};
use crate::storage::{MergeSession, SeriesStore};

/// 병합 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// 스테이징된 행 수
    pub staged: usize,
    /// 기본 저장소에 반영된 행 수
    pub applied: u64,
}

/// 스테이징 기반 병합 조정자.
#[derive(Clone)]
pub struct MergeCoordinator {
    store: Arc<dyn SeriesStore>,
}

impl MergeCoordinator {
    pub fn new(store: Arc<dyn SeriesStore>) -> Self {
        Self { store }
    }

    /// 기간의 지표/신호 컬럼에 배치를 병합합니다.
    ///
    /// 배치 안의 키는 유일해야 하며, 모든 키가 기본 저장소에 존재해야 합니다.
    /// 실패 시 반환되는 오류는 세션 정리 과정이 아닌 원래 단계의 오류입니다.
    pub async fn merge_columns(
        &self,
        period: EmaPeriod,
        rows: &[IndicatorRow],
    ) -> Result<MergeOutcome> {
        if rows.is_empty() {
            debug!(period = %period, "빈 배치, 병합 생략");
            return Ok(MergeOutcome::default());
        }

        check_unique_keys(rows)?;

        let mut session = self.store.begin_merge(period).await?;
        let result = run_merge(session.as_mut(), rows).await;
        match result {
            Ok(outcome) => {
                session.commit().await?;
                info!(
                    period = %period,
                    staged = outcome.staged,
                    applied = outcome.applied,
                    "지표 병합 완료"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(discard_err) = session.discard().await {
                    warn!(error = %discard_err, "병합 세션 정리 실패");
                }
                warn!(period = %period, error = %e, "지표 병합 실패, 변경 없음");
                Err(e)
            }
        }
    }
}

async fn run_merge(session: &mut dyn MergeSession, rows: &[IndicatorRow]) -> Result<MergeOutcome> {
    let staged = session.stage(rows).await?;

    if let Some((instrument_id, trade_date)) = session.find_unmatched().await? {
        return Err(DataError::KeyMismatch {
            instrument_id,
            trade_date,
        });
    }

    let applied = session.apply().await?;
    Ok(MergeOutcome { staged, applied })
}

fn check_unique_keys(rows: &[IndicatorRow]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(row.key()) {
            return Err(DataError::InvalidData(format!(
                "duplicate key in batch: ({}, {})",
                row.instrument_id, row.trade_date
            )));
        }
    }
    Ok(())
}
