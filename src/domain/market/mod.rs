pub mod candle;
pub mod coverage;
pub mod interval;

pub use candle::{Candle, CandleStatus, EnrichedCandle};
pub use coverage::{CoverageResult, DatasetDescriptor};
pub use interval::Interval;
