//! 엔진 전반에서 사용되는 공통 타입.

mod bar;
mod decimal;
mod period;

pub use bar::*;
pub use decimal::*;
pub use period::*;
