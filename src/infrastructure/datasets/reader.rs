//! Local dataset files: a gzip container decoding to JSON `{"data": [...]}`.
//!
//! Rows are decompressed generically and validated one by one; any row
//! failing numeric validation is dropped. Files are produced pre-enriched by
//! an external exporter, so rows may carry indicator fields alongside OHLCV.

use crate::domain::errors::FetchError;
use crate::domain::market::{Candle, CandleStatus, EnrichedCandle};
use chrono::DateTime;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct DatasetFile {
    // rows are kept generic so one malformed row cannot poison the file
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetRow {
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    date_iso: Option<String>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    trades: Option<u64>,
    #[serde(default)]
    taker_buy_vol: Option<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    taker_sell_vol: Option<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    delta: Option<f64>,
    #[serde(default)]
    #[allow(dead_code)]
    buy_pressure: Option<f64>,
    #[serde(default)]
    is_live: Option<bool>,

    // pre-computed enrichment carried by the exporter, absent in raw dumps
    #[serde(default)]
    rsi14: Option<f64>,
    #[serde(default)]
    sma200: Option<f64>,
    #[serde(default)]
    adx14: Option<f64>,
    #[serde(default)]
    adr_value: Option<f64>,
    #[serde(default)]
    adr_filled_pct: Option<f64>,
    #[serde(default)]
    current_day_range: Option<f64>,
    #[serde(default)]
    adr_room_top: Option<f64>,
    #[serde(default)]
    adr_room_bottom: Option<f64>,
    #[serde(default)]
    day_open: Option<f64>,
}

impl DatasetRow {
    fn timestamp_ms(&self) -> Option<i64> {
        if let Some(t) = self.time {
            return Some(t);
        }
        self.date_iso
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.timestamp_millis())
    }

    fn into_enriched(self) -> Option<EnrichedCandle> {
        let timestamp_ms = self.timestamp_ms()?;
        let candle = Candle {
            timestamp_ms,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            trades: self.trades,
            taker_buy_volume: self.taker_buy_vol,
            status: if self.is_live.unwrap_or(false) {
                CandleStatus::Forming
            } else {
                CandleStatus::Closed
            },
        };
        if !candle.has_finite_ohlc() {
            return None;
        }

        let mut enriched = EnrichedCandle::bare(candle);
        enriched.rsi14 = self.rsi14;
        enriched.sma200 = self.sma200;
        enriched.adx14 = self.adx14;
        enriched.adr_value = self.adr_value;
        enriched.adr_filled_pct = self.adr_filled_pct;
        enriched.current_day_range = self.current_day_range;
        enriched.adr_room_top = self.adr_room_top;
        enriched.adr_room_bottom = self.adr_room_bottom;
        enriched.day_open = self.day_open;
        Some(enriched)
    }
}

/// Read and validate one dataset file. Synchronous; callers on the async
/// runtime go through `spawn_blocking`.
pub fn read_dataset(path: &Path) -> Result<Vec<EnrichedCandle>, FetchError> {
    let file = File::open(path)
        .map_err(|e| FetchError::LocalRead(format!("{}: {}", path.display(), e)))?;
    let decoder = GzDecoder::new(file);
    let parsed: DatasetFile = serde_json::from_reader(decoder)
        .map_err(|e| FetchError::LocalRead(format!("{}: {}", path.display(), e)))?;

    let total = parsed.data.len();
    let candles: Vec<EnrichedCandle> = parsed
        .data
        .into_iter()
        .filter_map(|value| serde_json::from_value::<DatasetRow>(value).ok())
        .filter_map(DatasetRow::into_enriched)
        .collect();

    if candles.len() < total {
        debug!(
            "DatasetReader: dropped {} invalid rows from {}",
            total - candles.len(),
            path.display()
        );
    }
    info!(
        "DatasetReader: loaded {} candles from {}",
        candles.len(),
        path.display()
    );
    Ok(candles)
}
