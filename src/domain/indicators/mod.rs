//! Causal, single-pass candle enrichment.
//!
//! `IndicatorEngine::enrich` walks the series once, carrying rolling state
//! for RSI(14), ADX(14), SMA(200) and ADR(14). The value written at index i
//! depends only on candles at index <= i; every field is `None` until its
//! warm-up history exists.

use crate::domain::market::{Candle, EnrichedCandle};
use chrono::{DateTime, NaiveDate};
use std::collections::VecDeque;

pub const RSI_PERIOD: usize = 14;
pub const ADX_PERIOD: usize = 14;
pub const SMA_PERIOD: usize = 200;
pub const ADR_DAYS: usize = 14;

pub struct IndicatorEngine;

impl IndicatorEngine {
    /// Enrich a timestamp-ascending candle slice. O(n), side-effect free.
    pub fn enrich(candles: &[Candle]) -> Vec<EnrichedCandle> {
        let mut rsi = RsiState::new(RSI_PERIOD);
        let mut adx = AdxState::new(ADX_PERIOD);
        let mut sma = SmaState::new(SMA_PERIOD);
        let mut adr = AdrState::new(ADR_DAYS);

        let mut out = Vec::with_capacity(candles.len());
        let mut prev: Option<&Candle> = None;

        for candle in candles {
            let mut enriched = EnrichedCandle::bare(candle.clone());

            enriched.rsi14 = rsi.update(prev.map(|p| candle.close - p.close));
            enriched.adx14 = adx.update(prev, candle);
            enriched.sma200 = sma.update(candle.close);

            let day = adr.update(candle);
            enriched.adr_value = day.adr_value;
            enriched.current_day_range = Some(day.current_day_range);
            enriched.day_open = Some(day.day_open);
            if let Some(adr_value) = day.adr_value {
                if adr_value > 0.0 {
                    enriched.adr_filled_pct = Some(day.current_day_range / adr_value * 100.0);
                }
                enriched.adr_room_top = Some(day.day_open + adr_value);
                enriched.adr_room_bottom = Some(day.day_open - adr_value);
            }

            out.push(enriched);
            prev = Some(candle);
        }

        out
    }
}

/// Wilder RSI. Seeded with plain averages of the first `period` signed
/// diffs, then `avg = (prev*(period-1) + current)/period`.
struct RsiState {
    period: usize,
    seen_diffs: usize,
    gain_sum: f64,
    loss_sum: f64,
    avg_gain: f64,
    avg_loss: f64,
}

impl RsiState {
    fn new(period: usize) -> Self {
        RsiState {
            period,
            seen_diffs: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }

    fn update(&mut self, diff: Option<f64>) -> Option<f64> {
        let diff = diff?;
        let gain = diff.max(0.0);
        let loss = (-diff).max(0.0);
        self.seen_diffs += 1;
        let p = self.period as f64;

        if self.seen_diffs < self.period {
            self.gain_sum += gain;
            self.loss_sum += loss;
            return None;
        }
        if self.seen_diffs == self.period {
            self.avg_gain = (self.gain_sum + gain) / p;
            self.avg_loss = (self.loss_sum + loss) / p;
        } else {
            self.avg_gain = (self.avg_gain * (p - 1.0) + gain) / p;
            self.avg_loss = (self.avg_loss * (p - 1.0) + loss) / p;
        }

        if self.avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = self.avg_gain / self.avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }
}

/// Wilder ADX. Raw TR/+DM/-DM sums over the first `period` bars, Wilder
/// running smoothing (`prev - prev/period + current`) afterwards; ADX itself
/// is Wilder-smoothed from DX starting at the bar where the sums complete.
struct AdxState {
    period: usize,
    seen_bars: usize,
    tr_sum: f64,
    plus_dm_sum: f64,
    minus_dm_sum: f64,
    adx: f64,
}

impl AdxState {
    fn new(period: usize) -> Self {
        AdxState {
            period,
            seen_bars: 0,
            tr_sum: 0.0,
            plus_dm_sum: 0.0,
            minus_dm_sum: 0.0,
            adx: 0.0,
        }
    }

    fn update(&mut self, prev: Option<&Candle>, cur: &Candle) -> Option<f64> {
        let prev = prev?;
        let p = self.period as f64;

        let tr = (cur.high - cur.low)
            .max((cur.high - prev.close).abs())
            .max((cur.low - prev.close).abs());
        let up_move = cur.high - prev.high;
        let down_move = prev.low - cur.low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        self.seen_bars += 1;
        if self.seen_bars <= self.period {
            self.tr_sum += tr;
            self.plus_dm_sum += plus_dm;
            self.minus_dm_sum += minus_dm;
        } else {
            self.tr_sum = self.tr_sum - self.tr_sum / p + tr;
            self.plus_dm_sum = self.plus_dm_sum - self.plus_dm_sum / p + plus_dm;
            self.minus_dm_sum = self.minus_dm_sum - self.minus_dm_sum / p + minus_dm;
        }

        if self.seen_bars < self.period {
            return None;
        }

        let (plus_di, minus_di) = if self.tr_sum > 0.0 {
            (
                100.0 * self.plus_dm_sum / self.tr_sum,
                100.0 * self.minus_dm_sum / self.tr_sum,
            )
        } else {
            (0.0, 0.0)
        };
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        if self.seen_bars == self.period {
            self.adx = dx;
        } else {
            self.adx = (self.adx * (p - 1.0) + dx) / p;
        }
        Some(self.adx)
    }
}

/// Trailing simple moving average over the last `period` closes.
struct SmaState {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl SmaState {
    fn new(period: usize) -> Self {
        SmaState {
            period,
            window: VecDeque::with_capacity(period),
            sum: 0.0,
        }
    }

    fn update(&mut self, close: f64) -> Option<f64> {
        self.window.push_back(close);
        self.sum += close;
        if self.window.len() > self.period {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= evicted;
            }
        }
        if self.window.len() == self.period {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }
}

struct AdrDaySnapshot {
    adr_value: Option<f64>,
    current_day_range: f64,
    day_open: f64,
}

/// Average Daily Range over the last `max_days` fully closed UTC calendar
/// days. The still-forming day never enters the averaging window; it only
/// feeds `current_day_range` and the room projections.
///
/// A candle that opens a new day reports its own high-low as the day range
/// (so one daily bar equals one full day); later candles of the same day
/// report the running day extremes. This asymmetry is intentional.
struct AdrState {
    max_days: usize,
    closed_ranges: VecDeque<f64>,
    day_key: Option<NaiveDate>,
    day_open: f64,
    day_high: f64,
    day_low: f64,
}

impl AdrState {
    fn new(max_days: usize) -> Self {
        AdrState {
            max_days,
            closed_ranges: VecDeque::with_capacity(max_days),
            day_key: None,
            day_open: 0.0,
            day_high: 0.0,
            day_low: 0.0,
        }
    }

    fn day_key_of(timestamp_ms: i64) -> NaiveDate {
        DateTime::from_timestamp_millis(timestamp_ms)
            .map(|dt| dt.date_naive())
            .unwrap_or_default()
    }

    fn update(&mut self, candle: &Candle) -> AdrDaySnapshot {
        let key = Self::day_key_of(candle.timestamp_ms);
        let is_new_day = self.day_key != Some(key);

        if is_new_day {
            if self.day_key.is_some() {
                self.closed_ranges.push_back(self.day_high - self.day_low);
                if self.closed_ranges.len() > self.max_days {
                    self.closed_ranges.pop_front();
                }
            }
            self.day_key = Some(key);
            self.day_open = candle.open;
            self.day_high = candle.high;
            self.day_low = candle.low;
        } else {
            self.day_high = self.day_high.max(candle.high);
            self.day_low = self.day_low.min(candle.low);
        }

        let adr_value = if self.closed_ranges.is_empty() {
            None
        } else {
            Some(self.closed_ranges.iter().sum::<f64>() / self.closed_ranges.len() as f64)
        };

        let current_day_range = if is_new_day {
            candle.high - candle.low
        } else {
            self.day_high - self.day_low
        };

        AdrDaySnapshot {
            adr_value,
            current_day_range,
            day_open: self.day_open,
        }
    }
}
