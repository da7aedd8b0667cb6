//! Orchestrator integration tests over mocked fetchers and catalogs.

use async_trait::async_trait;
use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use marketflow::application::market_data::{Market, SmartFetchOrchestrator, SmartFetchRequest};
use marketflow::domain::errors::FetchError;
use marketflow::domain::market::{
    Candle, CandleStatus, CoverageResult, DatasetDescriptor, Interval,
};
use marketflow::domain::ports::{BarsFetcher, BarsRequest, DatasetLocator, ProgressSource};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const HOUR_MS: i64 = 3_600_000;

fn day_ms(y: i32, m: u32, d: u32) -> i64 {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis()
}

// --- Mocks ---

/// Emits one hourly candle per step across the requested range.
struct SyntheticFetcher {
    calls: Arc<Mutex<usize>>,
}

impl SyntheticFetcher {
    fn new() -> Self {
        SyntheticFetcher {
            calls: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl BarsFetcher for SyntheticFetcher {
    async fn fetch_bars(&self, req: &BarsRequest) -> Result<Vec<Candle>, FetchError> {
        req.cancel.check()?;
        *self.calls.lock().unwrap() += 1;

        let mut out = Vec::new();
        let mut ts = req.start_ms - req.start_ms.rem_euclid(HOUR_MS);
        if ts < req.start_ms {
            ts += HOUR_MS;
        }
        while ts <= req.end_ms {
            let base = 100.0 + (ts / HOUR_MS % 50) as f64;
            out.push(Candle {
                timestamp_ms: ts,
                open: base,
                high: base + 2.0,
                low: base - 2.0,
                close: base + 1.0,
                volume: Some(10.0),
                trades: None,
                taker_buy_volume: None,
                status: CandleStatus::Closed,
            });
            ts += HOUR_MS;
        }
        req.notify(1, out.len(), "synthetic page");
        Ok(out)
    }
}

struct FailingFetcher;

#[async_trait]
impl BarsFetcher for FailingFetcher {
    async fn fetch_bars(&self, _req: &BarsRequest) -> Result<Vec<Candle>, FetchError> {
        Err(FetchError::provider("Mock", "should not be called"))
    }
}

struct FixedLocator {
    result: CoverageResult,
}

impl DatasetLocator for FixedLocator {
    fn find_local_dataset(&self, _: &str, _: Interval, _: i64, _: i64) -> CoverageResult {
        self.result.clone()
    }
}

/// Write an hourly pre-enriched dataset covering [start_ms, end_ms] into a
/// gzip file; every row carries a sentinel rsi14 so recomputation is visible.
fn write_local_dataset(path: &Path, start_ms: i64, end_ms: i64) {
    let mut rows = Vec::new();
    let mut ts = start_ms;
    while ts <= end_ms {
        let base = 100.0 + (ts / HOUR_MS % 50) as f64;
        rows.push(format!(
            r#"{{"time":{},"open":{},"high":{},"low":{},"close":{},"volume":10.0,"rsi14":999.0}}"#,
            ts,
            base,
            base + 2.0,
            base - 2.0,
            base + 1.0
        ));
        ts += HOUR_MS;
    }
    let json = format!(r#"{{"data":[{}]}}"#, rows.join(","));

    let file = std::fs::File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::fast());
    encoder.write_all(json.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

fn descriptor(path: PathBuf, start_ms: i64, end_ms: i64) -> DatasetDescriptor {
    DatasetDescriptor {
        symbol: "BTCUSDT".into(),
        interval: Interval::H1,
        path,
        coverage_start_ms: start_ms,
        coverage_end_ms: end_ms,
    }
}

fn orchestrator(coverage: CoverageResult) -> (SmartFetchOrchestrator, Arc<Mutex<usize>>) {
    let fetcher = SyntheticFetcher::new();
    let calls = fetcher.calls.clone();
    let orchestrator = SmartFetchOrchestrator::new(
        Arc::new(fetcher),
        Arc::new(FailingFetcher),
        Arc::new(FixedLocator { result: coverage }),
    );
    (orchestrator, calls)
}

fn assert_strictly_ascending(timestamps: &[i64]) {
    for pair in timestamps.windows(2) {
        assert!(pair[0] < pair[1], "not strictly ascending: {:?}", pair);
    }
}

// --- Tests ---

#[tokio::test]
async fn test_api_only_when_local_disabled() {
    let (orchestrator, calls) = orchestrator(CoverageResult::None);
    let mut req = SmartFetchRequest::new(
        "BTCUSDT",
        Market::Crypto,
        Interval::H1,
        day_ms(2023, 1, 1),
        day_ms(2023, 1, 3),
    );
    req.use_local_data = false;

    let outcome = orchestrator.fetch(&req).await.unwrap();
    assert!(!outcome.pre_enriched);
    assert_eq!(*calls.lock().unwrap(), 1);

    let ts: Vec<i64> = outcome.candles.iter().map(|c| c.timestamp_ms()).collect();
    assert_strictly_ascending(&ts);
    assert_eq!(ts.len(), 49); // 48 hours inclusive of both midnights
}

#[tokio::test]
async fn test_full_coverage_returns_trusted_local_slice() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("btcusdt_1h.json.gz");
    let file_start = day_ms(2022, 12, 1);
    let file_end = day_ms(2023, 1, 10);
    write_local_dataset(&path, file_start, file_end);

    let (orchestrator, calls) = orchestrator(CoverageResult::Full {
        dataset: descriptor(path, file_start, file_end),
    });

    let req = SmartFetchRequest::new(
        "BTCUSDT",
        Market::Crypto,
        Interval::H1,
        day_ms(2022, 12, 10),
        day_ms(2022, 12, 12),
    );
    let outcome = orchestrator.fetch(&req).await.unwrap();

    assert!(outcome.pre_enriched);
    assert_eq!(*calls.lock().unwrap(), 0, "no API call on the fast path");
    // filtered to exactly the requested range
    assert_eq!(outcome.candles.first().unwrap().timestamp_ms(), day_ms(2022, 12, 10));
    assert_eq!(outcome.candles.last().unwrap().timestamp_ms(), day_ms(2022, 12, 12));
    // trusted pre-enrichment passes through untouched
    assert_eq!(outcome.candles[0].rsi14, Some(999.0));

    let enriched = orchestrator.fetch_enriched(&req).await.unwrap();
    assert_eq!(enriched[0].rsi14, Some(999.0));
}

#[tokio::test]
async fn test_partial_coverage_merges_and_recomputes() {
    // local 2022-06-01..2023-01-01, request 2022-06-01..2023-06-01
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("btcusdt_1h.json.gz");
    let local_start = day_ms(2022, 6, 1);
    let local_end = day_ms(2023, 1, 1);
    let req_end = day_ms(2023, 6, 1);
    write_local_dataset(&path, local_start, local_end);

    let coverage = CoverageResult::Partial {
        dataset: descriptor(path, local_start, local_end),
        local_start_ms: local_start,
        local_end_ms: local_end,
        api_start_ms: local_end, // one overlapping candle at the seam
        api_end_ms: req_end,
    };
    let (orchestrator, calls) = orchestrator(coverage);

    let progress = Arc::new(Mutex::new(Vec::new()));
    let progress_sink = progress.clone();
    let mut req = SmartFetchRequest::new(
        "BTCUSDT",
        Market::Crypto,
        Interval::H1,
        local_start,
        req_end,
    );
    req.on_progress = Some(Arc::new(move |event| {
        progress_sink.lock().unwrap().push(event.source);
    }));

    let outcome = orchestrator.fetch(&req).await.unwrap();
    assert!(!outcome.pre_enriched, "hybrid result must force re-enrichment");
    assert_eq!(*calls.lock().unwrap(), 1);

    let ts: Vec<i64> = outcome.candles.iter().map(|c| c.timestamp_ms()).collect();
    assert_strictly_ascending(&ts);

    let local_count = ((local_end - local_start) / HOUR_MS + 1) as usize;
    let api_count = ((req_end - local_end) / HOUR_MS + 1) as usize;
    assert_eq!(outcome.candles.len(), local_count + api_count - 1);

    // every requested hour is present exactly once
    assert_eq!(ts.first(), Some(&local_start));
    assert_eq!(ts.last(), Some(&req_end));

    // milestones: local load, remote page(s), merge
    let events = progress.lock().unwrap();
    assert!(events.contains(&ProgressSource::Local));
    assert!(events.contains(&ProgressSource::Api));
    assert!(events.contains(&ProgressSource::Merge));
    // release the lock so the progress callback in the next fetch can take it
    drop(events);

    // the unified indicator pass replaces the local sentinel values
    let enriched = orchestrator.fetch_enriched(&req).await.unwrap();
    assert!(enriched.iter().all(|c| c.rsi14 != Some(999.0)));
    assert!(enriched.last().unwrap().rsi14.is_some());
    assert!(enriched.last().unwrap().sma200.is_some());
}

#[tokio::test]
async fn test_local_read_failure_falls_back_to_api() {
    let coverage = CoverageResult::Full {
        dataset: descriptor(PathBuf::from("/nonexistent/file.json.gz"), 0, i64::MAX),
    };
    let (orchestrator, calls) = orchestrator(coverage);

    let req = SmartFetchRequest::new(
        "BTCUSDT",
        Market::Crypto,
        Interval::H1,
        day_ms(2023, 1, 1),
        day_ms(2023, 1, 2),
    );
    let outcome = orchestrator.fetch(&req).await.unwrap();

    assert!(!outcome.pre_enriched);
    assert_eq!(*calls.lock().unwrap(), 1, "fallback must hit the API");
    assert_eq!(outcome.candles.len(), 25);
}

#[tokio::test]
async fn test_cancellation_propagates_without_fallback() {
    let (orchestrator, calls) = orchestrator(CoverageResult::None);
    let req = SmartFetchRequest::new(
        "BTCUSDT",
        Market::Crypto,
        Interval::H1,
        day_ms(2023, 1, 1),
        day_ms(2023, 1, 2),
    );
    req.cancel.cancel();

    let err = orchestrator.fetch(&req).await.unwrap_err();
    assert!(matches!(err, FetchError::Cancelled));
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_forex_routes_to_forex_fetcher() {
    // crypto fetcher fails loudly if hit; forex requests must not touch it
    let forex = SyntheticFetcher::new();
    let forex_calls = forex.calls.clone();
    let orchestrator = SmartFetchOrchestrator::new(
        Arc::new(FailingFetcher),
        Arc::new(forex),
        Arc::new(FixedLocator {
            result: CoverageResult::None,
        }),
    );

    let req = SmartFetchRequest::new(
        "EUR/USD",
        Market::Forex,
        Interval::H1,
        day_ms(2023, 1, 1),
        day_ms(2023, 1, 2),
    );
    let outcome = orchestrator.fetch(&req).await.unwrap();
    assert_eq!(*forex_calls.lock().unwrap(), 1);
    assert!(!outcome.candles.is_empty());
}
