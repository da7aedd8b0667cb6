use anyhow::Result;
use std::env;
use std::time::Duration;

const DEFAULT_BINANCE_URL: &str = "https://api.binance.com";
const DEFAULT_TWELVEDATA_URL: &str = "https://api.twelvedata.com";

/// Runtime configuration, read once from the environment (a `.env` file is
/// honored via dotenvy). The TwelveData key may be absent at load time; its
/// absence only becomes an error when a forex fetch actually needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub binance_base_url: String,
    pub twelvedata_base_url: String,
    pub twelvedata_api_key: Option<String>,
    /// Rolling-window call budget per provider.
    pub binance_calls_per_minute: usize,
    pub twelvedata_calls_per_minute: usize,
    /// Self-throttle spacing between consecutive Binance kline pages.
    pub binance_min_page_delay: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            binance_base_url: env::var("BINANCE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BINANCE_URL.to_string()),
            twelvedata_base_url: env::var("TWELVEDATA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_TWELVEDATA_URL.to_string()),
            twelvedata_api_key: env::var("TWELVEDATA_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            binance_calls_per_minute: parse_env("BINANCE_CALLS_PER_MINUTE", 1200)?,
            twelvedata_calls_per_minute: parse_env("TWELVEDATA_CALLS_PER_MINUTE", 8)?,
            binance_min_page_delay: Duration::from_millis(parse_env(
                "BINANCE_MIN_PAGE_DELAY_MS",
                250,
            )?),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        // untouched keys fall back to defaults
        let v: usize = parse_env("MARKETFLOW_TEST_UNSET_KEY", 42).unwrap();
        assert_eq!(v, 42);
    }
}
