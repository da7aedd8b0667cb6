//! TwelveData time-series fetcher.
//!
//! Pages backward from the requested end using an `end_date` anchor with
//! `order=desc`, deduplicating pages into a timestamp-keyed map. Requires an
//! API key; its absence is a fatal precondition raised before any I/O.

use crate::domain::errors::FetchError;
use crate::domain::market::Candle;
use crate::domain::ports::{BarsFetcher, BarsRequest};
use crate::infrastructure::core::http::{UrlBuilder, shared_client};
use crate::infrastructure::core::rate_limiter::RateLimiter;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const PAGE_SIZE: usize = 5000;

#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    status: String,
    #[serde(default)]
    values: Vec<TimeSeriesRow>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeSeriesRow {
    datetime: String,
    open: String,
    high: String,
    low: String,
    close: String,
    #[serde(default)]
    volume: Option<String>,
}

pub struct TwelveDataFetcher {
    client: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
    limiter: Arc<RateLimiter>,
}

impl TwelveDataFetcher {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        TwelveDataFetcher {
            client: shared_client(),
            base_url: base_url.into(),
            api_key,
            limiter,
        }
    }

    async fn fetch_page(
        &self,
        req: &BarsRequest,
        api_key: &str,
        anchor_ms: i64,
    ) -> Result<Vec<TimeSeriesRow>, FetchError> {
        let url_with_query = UrlBuilder::endpoint(&self.base_url, "/time_series")
            .param("symbol", req.symbol.as_str())
            .param("interval", req.interval.twelvedata_code())
            .param("end_date", format_utc(anchor_ms))
            .param("order", "desc")
            .param("outputsize", PAGE_SIZE)
            .param("timezone", "UTC")
            .param("apikey", api_key)
            .finish();

        let client = self.client.clone();
        let cancel = req.cancel.clone();
        let response = self
            .limiter
            .enqueue(move || async move {
                // re-checked at dispatch time, after any window-budget wait
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
            return Err(FetchError::provider("TwelveData", message));
        }

        let body: TimeSeriesResponse = response.json().await.map_err(|e| {
            FetchError::provider("TwelveData", format!("invalid time_series body: {}", e))
        })?;

        if body.status != "ok" {
            return Err(FetchError::provider(
                "TwelveData",
                body.message
                    .unwrap_or_else(|| format!("status {}", body.status)),
            ));
        }

        Ok(body.values)
    }
}

#[async_trait]
impl BarsFetcher for TwelveDataFetcher {
    async fn fetch_bars(&self, req: &BarsRequest) -> Result<Vec<Candle>, FetchError> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                FetchError::Precondition("TwelveData API key is not configured".into())
            })?;

        let mut by_timestamp: BTreeMap<i64, Candle> = BTreeMap::new();
        let mut anchor_ms = req.end_ms;
        let mut calls = 0usize;

        loop {
            req.cancel.check()?;

            let rows = self.fetch_page(req, &api_key, anchor_ms).await?;
            calls += 1;
            if rows.is_empty() {
                break;
            }

            let now_ms = Utc::now().timestamp_millis();
            let mut oldest_ms = i64::MAX;
            for row in &rows {
                let Some((ts, candle)) = parse_row(row, req.interval, now_ms) else {
                    continue;
                };
                oldest_ms = oldest_ms.min(ts);
                by_timestamp.entry(ts).or_insert(candle);
            }

            req.notify(
                calls,
                by_timestamp.len(),
                format!("TwelveData page {} loaded", calls),
            );
            debug!(
                "TwelveDataFetcher: page {} returned {} rows for {}",
                calls,
                rows.len(),
                req.symbol
            );

            if oldest_ms == i64::MAX || oldest_ms < req.start_ms {
                break;
            }
            // move the anchor to just before the oldest bar seen
            anchor_ms = oldest_ms - 1;
        }

        let candles: Vec<Candle> = by_timestamp
            .into_iter()
            .filter(|(ts, _)| *ts >= req.start_ms && *ts <= req.end_ms)
            .map(|(_, c)| c)
            .collect();

        info!(
            "TwelveDataFetcher: fetched {} bars for {} in {} calls",
            candles.len(),
            req.symbol,
            calls
        );
        Ok(candles)
    }
}

/// Parse a time_series row; drops rows with unparsable or non-finite OHLC.
fn parse_row(
    row: &TimeSeriesRow,
    interval: crate::domain::market::Interval,
    now_ms: i64,
) -> Option<(i64, Candle)> {
    let timestamp_ms = parse_utc_datetime(&row.datetime)?;
    let open = row.open.parse::<f64>().ok()?;
    let high = row.high.parse::<f64>().ok()?;
    let low = row.low.parse::<f64>().ok()?;
    let close = row.close.parse::<f64>().ok()?;
    let volume = row.volume.as_deref().and_then(|s| s.parse::<f64>().ok());

    let candle = Candle {
        timestamp_ms,
        open,
        high,
        low,
        close,
        volume,
        trades: None,
        taker_buy_volume: None,
        status: Candle::derive_status(timestamp_ms, interval, now_ms),
    };

    if candle.has_finite_ohlc() {
        Some((timestamp_ms, candle))
    } else {
        None
    }
}

/// TwelveData reports "YYYY-MM-DD HH:MM:SS" for intraday series and
/// "YYYY-MM-DD" for daily ones; both are UTC because the request pins
/// `timezone=UTC`.
fn parse_utc_datetime(s: &str) -> Option<i64> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc().timestamp_millis());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc().timestamp_millis())
}

fn format_utc(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp_millis(0).unwrap_or_default())
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}
