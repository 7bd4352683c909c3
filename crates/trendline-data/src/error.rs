//! 데이터 모듈 오류 타입.

use chrono::NaiveDate;
use thiserror::Error;

/// 저장소 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 저장소 I/O 실패 (재시도 여부는 호출자가 결정)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// 병합 배치의 키가 기본 저장소에 없음
    #[error("Key mismatch: no bar for ({instrument_id}, {trade_date})")]
    KeyMismatch {
        instrument_id: String,
        trade_date: NaiveDate,
    },

    /// 이미 존재하는 일봉 삽입 시도 (append-only 위반)
    #[error("Duplicate bar: {0}")]
    DuplicateBar(String),

    /// 잘못된 데이터
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// 마이그레이션 오류
    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl DataError {
    /// 같은 호출을 다시 시도해서 해결될 수 있는 오류인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::StoreUnavailable(_))
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().unwrap_or_default();
                if code == "23505" {
                    // PostgreSQL 고유 제약 조건 위반
                    DataError::DuplicateBar(db_err.message().to_string())
                } else {
                    DataError::StoreUnavailable(db_err.message().to_string())
                }
            }
            _ => DataError::StoreUnavailable(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DataError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DataError::MigrationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
