//! Hybrid local/remote candle sourcing.
//!
//! The orchestrator classifies the requested range against the local dataset
//! catalog and picks local-only, API-only or hybrid sourcing. Hybrid results
//! are returned un-enriched so rolling indicators get one unified pass with
//! no discontinuity at the local/remote seam.

use crate::domain::errors::FetchError;
use crate::domain::indicators::IndicatorEngine;
use crate::domain::market::{Candle, CoverageResult, EnrichedCandle, Interval};
use crate::domain::ports::{
    BarsFetcher, BarsRequest, DatasetLocator, ProgressEvent, ProgressFn, ProgressSource,
};
use crate::domain::cancel::CancelToken;
use crate::infrastructure::datasets::read_dataset;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Market {
    Crypto,
    Forex,
}

#[derive(Clone)]
pub struct SmartFetchRequest {
    pub symbol: String,
    pub market: Market,
    pub interval: Interval,
    pub start_ms: i64,
    pub end_ms: i64,
    pub use_local_data: bool,
    pub cancel: CancelToken,
    pub on_progress: Option<ProgressFn>,
}

impl SmartFetchRequest {
    pub fn new(
        symbol: impl Into<String>,
        market: Market,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> Self {
        SmartFetchRequest {
            symbol: symbol.into(),
            market,
            interval,
            start_ms,
            end_ms,
            use_local_data: true,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    fn notify(&self, source: ProgressSource, calls: usize, candles: usize, message: String) {
        if let Some(cb) = &self.on_progress {
            cb(ProgressEvent {
                candles,
                calls,
                source,
                message,
            });
        }
    }
}

/// Fetch result plus whether its indicator fields can be trusted as-is.
/// `pre_enriched == false` means the caller must run a fresh indicator pass.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub candles: Vec<EnrichedCandle>,
    pub pre_enriched: bool,
}

pub struct SmartFetchOrchestrator {
    crypto_fetcher: Arc<dyn BarsFetcher>,
    forex_fetcher: Arc<dyn BarsFetcher>,
    locator: Arc<dyn DatasetLocator>,
}

impl SmartFetchOrchestrator {
    pub fn new(
        crypto_fetcher: Arc<dyn BarsFetcher>,
        forex_fetcher: Arc<dyn BarsFetcher>,
        locator: Arc<dyn DatasetLocator>,
    ) -> Self {
        SmartFetchOrchestrator {
            crypto_fetcher,
            forex_fetcher,
            locator,
        }
    }

    /// Source candles for the requested range. The output sequence is
    /// strictly ascending by timestamp with no duplicates, for every
    /// coverage classification.
    pub async fn fetch(&self, req: &SmartFetchRequest) -> Result<FetchOutcome, FetchError> {
        if !req.use_local_data {
            return self.fetch_api_only(req).await;
        }

        let coverage =
            self.locator
                .find_local_dataset(&req.symbol, req.interval, req.start_ms, req.end_ms);

        match coverage {
            CoverageResult::None => self.fetch_api_only(req).await,

            CoverageResult::Full { dataset } => {
                match self
                    .load_local_slice(dataset.path.clone(), req.start_ms, req.end_ms)
                    .await
                {
                    Ok(local) => {
                        info!(
                            "SmartFetch: full local coverage for {} ({} candles)",
                            req.symbol,
                            local.len()
                        );
                        req.notify(
                            ProgressSource::Local,
                            0,
                            local.len(),
                            "Local dataset loaded".into(),
                        );
                        // local datasets are pre-enriched and trusted
                        Ok(FetchOutcome {
                            candles: local,
                            pre_enriched: true,
                        })
                    }
                    Err(e) => self.fallback_after_local_failure(req, e).await,
                }
            }

            CoverageResult::Partial {
                dataset,
                local_start_ms,
                local_end_ms,
                api_start_ms,
                api_end_ms,
            } => {
                let local = match self
                    .load_local_slice(dataset.path.clone(), local_start_ms, local_end_ms)
                    .await
                {
                    Ok(local) => local,
                    Err(e) => return self.fallback_after_local_failure(req, e).await,
                };
                req.notify(
                    ProgressSource::Local,
                    0,
                    local.len(),
                    "Local slice loaded".into(),
                );

                let remote = self
                    .fetch_remote(req, api_start_ms, api_end_ms)
                    .await?
                    .into_iter()
                    .map(EnrichedCandle::bare)
                    .collect::<Vec<_>>();

                let merged = merge_series(local, remote);
                info!(
                    "SmartFetch: hybrid merge for {} complete ({} candles)",
                    req.symbol,
                    merged.len()
                );
                req.notify(
                    ProgressSource::Merge,
                    0,
                    merged.len(),
                    "Merge complete".into(),
                );

                // a fresh unified indicator pass avoids a seam discontinuity
                Ok(FetchOutcome {
                    candles: merged,
                    pre_enriched: false,
                })
            }
        }
    }

    /// Fetch and guarantee enrichment: hybrid and API-sourced series get a
    /// fresh indicator pass; trusted full-local series pass through.
    pub async fn fetch_enriched(
        &self,
        req: &SmartFetchRequest,
    ) -> Result<Vec<EnrichedCandle>, FetchError> {
        let outcome = self.fetch(req).await?;
        if outcome.pre_enriched {
            return Ok(outcome.candles);
        }
        let plain: Vec<Candle> = outcome.candles.into_iter().map(|e| e.candle).collect();
        Ok(IndicatorEngine::enrich(&plain))
    }

    async fn fetch_api_only(&self, req: &SmartFetchRequest) -> Result<FetchOutcome, FetchError> {
        let remote = self.fetch_remote(req, req.start_ms, req.end_ms).await?;
        let candles = merge_series(Vec::new(), remote.into_iter().map(EnrichedCandle::bare).collect());
        Ok(FetchOutcome {
            candles,
            pre_enriched: false,
        })
    }

    async fn fetch_remote(
        &self,
        req: &SmartFetchRequest,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, FetchError> {
        let fetcher = match req.market {
            Market::Crypto => &self.crypto_fetcher,
            Market::Forex => &self.forex_fetcher,
        };
        let bars_req = BarsRequest {
            symbol: req.symbol.clone(),
            interval: req.interval,
            start_ms,
            end_ms,
            cancel: req.cancel.clone(),
            progress: req.on_progress.clone(),
        };
        fetcher.fetch_bars(&bars_req).await
    }

    async fn load_local_slice(
        &self,
        path: PathBuf,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<EnrichedCandle>, FetchError> {
        let candles = tokio::task::spawn_blocking(move || read_dataset(&path))
            .await
            .map_err(|e| FetchError::LocalRead(format!("dataset read task failed: {}", e)))??;
        Ok(candles
            .into_iter()
            .filter(|c| c.timestamp_ms() >= start_ms && c.timestamp_ms() <= end_ms)
            .collect())
    }

    /// Local-read failures degrade to a full API fetch. Cancellation is the
    /// one error that must not be rerouted.
    async fn fallback_after_local_failure(
        &self,
        req: &SmartFetchRequest,
        error: FetchError,
    ) -> Result<FetchOutcome, FetchError> {
        if error.is_cancellation() {
            return Err(error);
        }
        warn!(
            "SmartFetch: local read failed for {} ({}), falling back to full API fetch",
            req.symbol, error
        );
        self.fetch_api_only(req).await
    }
}

/// Concatenate, deduplicate by timestamp and sort ascending. The remote side
/// wins coincident timestamps; outside that no overlap is expected.
fn merge_series(local: Vec<EnrichedCandle>, remote: Vec<EnrichedCandle>) -> Vec<EnrichedCandle> {
    let mut by_timestamp: BTreeMap<i64, EnrichedCandle> = BTreeMap::new();
    for candle in local {
        by_timestamp.insert(candle.timestamp_ms(), candle);
    }
    for candle in remote {
        by_timestamp.insert(candle.timestamp_ms(), candle);
    }
    by_timestamp.into_values().collect()
}
