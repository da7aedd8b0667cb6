use super::interval::Interval;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A locally cached, pre-enriched dataset known to the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub symbol: String,
    pub interval: Interval,
    pub path: PathBuf,
    pub coverage_start_ms: i64,
    pub coverage_end_ms: i64,
}

/// Classification of a requested range against the local catalog.
///
/// `Partial` splits the request into a locally served slice and the
/// remainder `[api_start_ms, api_end_ms]` that must come from a provider.
#[derive(Debug, Clone, PartialEq)]
pub enum CoverageResult {
    Full {
        dataset: DatasetDescriptor,
    },
    Partial {
        dataset: DatasetDescriptor,
        local_start_ms: i64,
        local_end_ms: i64,
        api_start_ms: i64,
        api_end_ms: i64,
    },
    None,
}
