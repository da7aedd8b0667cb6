use crate::domain::errors::FetchError;
use crate::domain::market::{Candle, CoverageResult, Interval};
use crate::domain::cancel::CancelToken;
use async_trait::async_trait;
use std::sync::Arc;

/// Advisory progress notification emitted at fetch milestones (local load
/// complete, each remote page, merge complete). Dropping the callback never
/// affects correctness.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub candles: usize,
    pub calls: usize,
    pub source: ProgressSource,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressSource {
    Local,
    Api,
    Merge,
}

pub type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A historical-bars request against one provider.
#[derive(Clone)]
pub struct BarsRequest {
    pub symbol: String,
    pub interval: Interval,
    pub start_ms: i64,
    pub end_ms: i64,
    pub cancel: CancelToken,
    pub progress: Option<ProgressFn>,
}

impl BarsRequest {
    pub fn new(symbol: impl Into<String>, interval: Interval, start_ms: i64, end_ms: i64) -> Self {
        BarsRequest {
            symbol: symbol.into(),
            interval,
            start_ms,
            end_ms,
            cancel: CancelToken::new(),
            progress: None,
        }
    }

    pub fn notify(&self, calls: usize, candles: usize, message: impl Into<String>) {
        if let Some(cb) = &self.progress {
            cb(ProgressEvent {
                candles,
                calls,
                source: ProgressSource::Api,
                message: message.into(),
            });
        }
    }
}

/// Paginated historical-bars source. Implementations normalize provider rows
/// into the common `Candle` shape and route every page call through their
/// provider's rate limiter.
#[async_trait]
pub trait BarsFetcher: Send + Sync {
    async fn fetch_bars(&self, req: &BarsRequest) -> Result<Vec<Candle>, FetchError>;
}

/// Catalog of locally cached datasets, consumed at its boundary only; the
/// core never implements the catalog itself and tests inject mocks.
pub trait DatasetLocator: Send + Sync {
    fn find_local_dataset(
        &self,
        symbol: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> CoverageResult;
}
