//! Ports - 抽象化レイヤー
//!
//! 外部依存（現在は時刻のみ）への差し替え可能なインターフェース。

pub mod clock;

pub use self::clock::{Clock, FixedClock, SystemClock};
