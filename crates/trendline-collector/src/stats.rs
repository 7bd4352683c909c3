//! 실행 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 지표 동기화 실행 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// 처리한 기간 수
    pub total: usize,
    /// 증분 계산으로 갱신된 기간 수
    pub updated: usize,
    /// 전체 재계산한 기간 수
    pub recomputed: usize,
    /// 건너뛴 기간 수 (이미 최신)
    pub skipped: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 전체 재계산으로 기록된 행 수
    pub history_rows: u64,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            ((self.total - self.errors) as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            updated = self.updated,
            recomputed = self.recomputed,
            skipped = self.skipped,
            errors = self.errors,
            history_rows = self.history_rows,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "실행 완료"
        );
    }
}
