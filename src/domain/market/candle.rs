use super::interval::Interval;
use serde::{Deserialize, Serialize};

/// Whether a bar's interval has elapsed relative to "now". Derived at
/// assembly time from the open timestamp and interval duration, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleStatus {
    Forming,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// UTC open time in epoch milliseconds.
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
    pub trades: Option<u64>,
    pub taker_buy_volume: Option<f64>,
    pub status: CandleStatus,
}

impl Candle {
    /// Forming iff the interval has not elapsed yet.
    pub fn derive_status(timestamp_ms: i64, interval: Interval, now_ms: i64) -> CandleStatus {
        if timestamp_ms + interval.duration_ms() > now_ms {
            CandleStatus::Forming
        } else {
            CandleStatus::Closed
        }
    }

    pub fn has_finite_ohlc(&self) -> bool {
        self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
    }
}

/// Candle plus rolling-indicator and per-bar shape fields.
///
/// Indicator fields stay `None` until enough causally-prior history exists
/// (200 closes for sma200, `period` diffs for rsi/adx, one fully closed
/// calendar day for the ADR family). Wick/body percentages never need history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCandle {
    #[serde(flatten)]
    pub candle: Candle,
    pub rsi14: Option<f64>,
    pub sma200: Option<f64>,
    pub adx14: Option<f64>,
    pub adr_value: Option<f64>,
    pub adr_filled_pct: Option<f64>,
    pub current_day_range: Option<f64>,
    pub adr_room_top: Option<f64>,
    pub adr_room_bottom: Option<f64>,
    pub day_open: Option<f64>,
    pub body_size_pct: f64,
    pub upper_wick_pct: f64,
    pub lower_wick_pct: f64,
}

impl EnrichedCandle {
    /// Lift a plain candle: shape fields computed, every rolling field `None`.
    pub fn bare(candle: Candle) -> Self {
        let range = candle.high - candle.low;
        let (body, upper, lower) = if range > 0.0 {
            let body = (candle.close - candle.open).abs() / range * 100.0;
            let upper = (candle.high - candle.open.max(candle.close)) / range * 100.0;
            let lower = (candle.open.min(candle.close) - candle.low) / range * 100.0;
            (body, upper, lower)
        } else {
            (0.0, 0.0, 0.0)
        };
        EnrichedCandle {
            candle,
            rsi14: None,
            sma200: None,
            adx14: None,
            adr_value: None,
            adr_filled_pct: None,
            current_day_range: None,
            adr_room_top: None,
            adr_room_bottom: None,
            day_open: None,
            body_size_pct: body,
            upper_wick_pct: upper,
            lower_wick_pct: lower,
        }
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.candle.timestamp_ms
    }
}
