pub mod smart_fetch;

pub use smart_fetch::{FetchOutcome, Market, SmartFetchOrchestrator, SmartFetchRequest};
