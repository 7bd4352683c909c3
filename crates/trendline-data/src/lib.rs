//! 일봉 저장 및 지표 병합.
//!
//! 이 crate는 다음을 제공합니다:
//! - 시계열 저장소 추상화(`SeriesStore`)와 PostgreSQL/메모리 구현
//! - 스테이징 기반 원자적 지표 병합(`MergeCoordinator`)

pub mod error;
pub mod merge;
pub mod storage;

pub use error::{DataError, Result};
pub use merge::{MergeCoordinator, MergeOutcome};

// 저장소 타입 재내보내기
pub use storage::memory::MemorySeriesStore;
pub use storage::postgres::{Database, PgSeriesStore};
pub use storage::{MergeSession, SchemaCapabilities, SeriesStore};
