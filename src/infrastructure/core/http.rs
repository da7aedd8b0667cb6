//! Shared HTTP plumbing for the provider fetchers.
//!
//! Both providers are plain GET endpoints driven by query-string parameters,
//! so this module exposes a single retrying client plus a small chained URL
//! builder that percent-encodes values (symbols like "EUR/USD" carry
//! reserved bytes).

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::fmt::Display;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TRANSPORT_RETRIES: u32 = 3;

/// Client shared by the provider fetchers. Transient transport failures
/// (connection resets, 5xx) retry with exponential backoff; provider-level
/// error envelopes are handled by the fetchers and never retried here.
pub fn shared_client() -> ClientWithMiddleware {
    let client = Client::builder()
        .user_agent(concat!("marketflow/", env!("CARGO_PKG_VERSION")))
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new());

    ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(
            ExponentialBackoff::builder().build_with_max_retries(MAX_TRANSPORT_RETRIES),
        ))
        .build()
}

/// Incremental URL assembly for the provider endpoints. The middleware
/// client wrapper does not expose reqwest's `.query()`, so pairs are
/// appended here, values encoded as they land. Keys are static identifiers
/// and go in verbatim; cursor and page-size params come in as numbers.
pub struct UrlBuilder {
    url: String,
    has_query: bool,
}

impl UrlBuilder {
    pub fn endpoint(base: &str, path: &str) -> Self {
        let mut url = String::with_capacity(base.len() + path.len() + 96);
        url.push_str(base.trim_end_matches('/'));
        url.push_str(path);
        let has_query = url.contains('?');
        UrlBuilder { url, has_query }
    }

    pub fn param(mut self, key: &str, value: impl Display) -> Self {
        self.url.push(if self.has_query { '&' } else { '?' });
        self.has_query = true;
        self.url.push_str(key);
        self.url.push('=');
        encode_into(&mut self.url, &value.to_string());
        self
    }

    pub fn finish(self) -> String {
        self.url
    }
}

fn encode_into(out: &mut String, raw: &str) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for &byte in raw.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                out.push('%');
                out.push(HEX[(byte >> 4) as usize] as char);
                out.push(HEX[(byte & 0x0F) as usize] as char);
            }
        }
    }
}
