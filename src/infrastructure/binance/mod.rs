//! Binance klines fetcher.
//!
//! Pages forward through `/api/v3/klines` in 1000-bar steps, normalizing the
//! fixed-position kline arrays into `Candle`s. Every page call runs through
//! the injected Binance `RateLimiter` and self-throttles with a minimum
//! delay between consecutive pages, measured net of request latency.

use crate::domain::errors::FetchError;
use crate::domain::market::{Candle, Interval};
use crate::domain::ports::{BarsFetcher, BarsRequest};
use crate::infrastructure::core::http::{UrlBuilder, shared_client};
use crate::infrastructure::core::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::Utc;
use reqwest_middleware::ClientWithMiddleware;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const PAGE_LIMIT: usize = 1000;

pub struct BinanceKlinesFetcher {
    client: ClientWithMiddleware,
    base_url: String,
    limiter: Arc<RateLimiter>,
    /// Minimum spacing between consecutive page requests.
    min_delay: Duration,
}

/// One page of klines after normalization. Pagination decisions read the raw
/// provider counts, never the filtered candles: a full page where some rows
/// failed validation must still advance and continue.
struct KlinesPage {
    candles: Vec<Candle>,
    raw_len: usize,
    /// Open time of the last raw row, parsed or not.
    last_open_ms: Option<i64>,
}

impl BinanceKlinesFetcher {
    pub fn new(base_url: impl Into<String>, limiter: Arc<RateLimiter>, min_delay: Duration) -> Self {
        BinanceKlinesFetcher {
            client: shared_client(),
            base_url: base_url.into(),
            limiter,
            min_delay,
        }
    }

    async fn fetch_page(&self, req: &BarsRequest, cursor: i64) -> Result<KlinesPage, FetchError> {
        let url_with_query = UrlBuilder::endpoint(&self.base_url, "/api/v3/klines")
            .param("symbol", req.symbol.as_str())
            .param("interval", req.interval.as_str())
            .param("startTime", cursor)
            .param("endTime", req.end_ms)
            .param("limit", PAGE_LIMIT)
            .finish();

        let client = self.client.clone();
        let cancel = req.cancel.clone();
        let interval = req.interval;
        let response = self
            .limiter
            .enqueue(move || async move {
                // re-checked at dispatch time: the request may have been
                // abandoned while queued behind the window budget
                cancel.check()?;
                client
                    .get(&url_with_query)
                    .send()
                    .await
                    .map_err(|e| FetchError::Http(e.to_string()))
            })
            .await?;

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::provider("Binance", message));
        }

        let klines: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| FetchError::provider("Binance", format!("invalid klines body: {}", e)))?;

        Ok(scan_klines(&klines, interval, Utc::now().timestamp_millis()))
    }
}

fn scan_klines(klines: &[serde_json::Value], interval: Interval, now_ms: i64) -> KlinesPage {
    let raw_len = klines.len();
    let last_open_ms = klines
        .last()
        .and_then(|k| k.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.as_i64());
    let candles = klines
        .iter()
        .filter_map(|k| parse_kline_row(k, interval, now_ms))
        .collect();

    KlinesPage {
        candles,
        raw_len,
        last_open_ms,
    }
}

/// Kline rows are fixed-position arrays:
/// [open time, open, high, low, close, volume, close time, quote volume,
///  trades, taker buy base volume, ...]. Rows with non-finite OHLC are
/// dropped without raising.
fn parse_kline_row(row: &serde_json::Value, interval: Interval, now_ms: i64) -> Option<Candle> {
    let arr = row.as_array()?;
    if arr.len() < 6 {
        return None;
    }

    let timestamp_ms = arr[0].as_i64()?;
    let open = arr[1].as_str()?.parse::<f64>().ok()?;
    let high = arr[2].as_str()?.parse::<f64>().ok()?;
    let low = arr[3].as_str()?.parse::<f64>().ok()?;
    let close = arr[4].as_str()?.parse::<f64>().ok()?;
    let volume = arr[5].as_str().and_then(|s| s.parse::<f64>().ok());
    let trades = arr.get(8).and_then(|v| v.as_u64());
    let taker_buy_volume = arr
        .get(9)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok());

    let candle = Candle {
        timestamp_ms,
        open,
        high,
        low,
        close,
        volume,
        trades,
        taker_buy_volume,
        status: Candle::derive_status(timestamp_ms, interval, now_ms),
    };

    if candle.has_finite_ohlc() { Some(candle) } else { None }
}

#[async_trait]
impl BarsFetcher for BinanceKlinesFetcher {
    async fn fetch_bars(&self, req: &BarsRequest) -> Result<Vec<Candle>, FetchError> {
        let mut cursor = req.start_ms;
        let mut out: Vec<Candle> = Vec::new();
        let mut calls = 0usize;
        let interval_ms = req.interval.duration_ms();

        loop {
            req.cancel.check()?;
            if cursor > req.end_ms {
                break;
            }

            let started = tokio::time::Instant::now();
            let page = self.fetch_page(req, cursor).await?;
            calls += 1;

            let kept = page.candles.len();
            out.extend(page.candles);
            req.notify(calls, out.len(), format!("Binance page {} loaded", calls));
            debug!(
                "BinanceKlinesFetcher: page {} returned {} rows ({} kept) for {}",
                calls, page.raw_len, kept, req.symbol
            );

            if page.raw_len < PAGE_LIMIT {
                break;
            }
            match page.last_open_ms {
                Some(open_ms) => cursor = open_ms + interval_ms,
                // full page with no readable open time; cannot advance
                None => break,
            }

            // throttle net of the request latency just spent
            let elapsed = started.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }

        info!(
            "BinanceKlinesFetcher: fetched {} bars for {} in {} calls",
            out.len(),
            req.symbol,
            calls
        );
        Ok(out)
    }
}
