use crate::domain::errors::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval. Canonical strings follow the Binance kline notation
/// ("1m", "1h", "1d", ...); provider-specific spellings are derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M5,
    M15,
    M30,
    H1,
    H4,
    D1,
    W1,
}

impl Interval {
    pub const fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Interval::M1 => MINUTE,
            Interval::M5 => 5 * MINUTE,
            Interval::M15 => 15 * MINUTE,
            Interval::M30 => 30 * MINUTE,
            Interval::H1 => 60 * MINUTE,
            Interval::H4 => 240 * MINUTE,
            Interval::D1 => 1_440 * MINUTE,
            Interval::W1 => 7 * 1_440 * MINUTE,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1d",
            Interval::W1 => "1w",
        }
    }

    /// TwelveData's time_series interval spelling ("1min", "1h", "1day", ...).
    pub const fn twelvedata_code(&self) -> &'static str {
        match self {
            Interval::M1 => "1min",
            Interval::M5 => "5min",
            Interval::M15 => "15min",
            Interval::M30 => "30min",
            Interval::H1 => "1h",
            Interval::H4 => "4h",
            Interval::D1 => "1day",
            Interval::W1 => "1week",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Interval::M1),
            "5m" => Ok(Interval::M5),
            "15m" => Ok(Interval::M15),
            "30m" => Ok(Interval::M30),
            "1h" => Ok(Interval::H1),
            "4h" => Ok(Interval::H4),
            "1d" => Ok(Interval::D1),
            "1w" => Ok(Interval::W1),
            other => Err(FetchError::Precondition(format!(
                "Invalid interval: {}",
                other
            ))),
        }
    }
}
