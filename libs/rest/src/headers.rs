//! Rate-limit header parsing
//!
//! Every REST response carries a family of `X-RateLimit-*` headers that
//! describe the bucket the route landed in. Parsing is tolerant: a missing
//! or malformed header simply yields `None` for that field so a partial
//! header set still updates the fields it does carry.

use reqwest::header::HeaderMap;

pub const HEADER_BUCKET: &str = "x-ratelimit-bucket";
pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";
pub const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const HEADER_GLOBAL: &str = "x-ratelimit-global";
pub const HEADER_SCOPE: &str = "x-ratelimit-scope";
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// Parsed view of the rate-limit headers on one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Server-assigned bucket hash shared by routes with a common limit
    pub bucket: Option<String>,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Epoch seconds at which the bucket resets
    pub reset: Option<f64>,
    /// Seconds until the bucket resets
    pub reset_after: Option<f64>,
    /// Set on 429 responses that count against the global limit
    pub global: bool,
    pub scope: Option<String>,
    /// Seconds to wait before retrying, from the plain Retry-After header
    pub retry_after: Option<f64>,
}

impl RateLimitHeaders {
    pub fn parse(headers: &HeaderMap) -> Self {
        Self {
            bucket: get_str(headers, HEADER_BUCKET),
            limit: get_parsed(headers, HEADER_LIMIT),
            remaining: get_parsed(headers, HEADER_REMAINING),
            reset: get_parsed(headers, HEADER_RESET),
            reset_after: get_parsed(headers, HEADER_RESET_AFTER),
            global: get_str(headers, HEADER_GLOBAL)
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            scope: get_str(headers, HEADER_SCOPE),
            retry_after: get_parsed(headers, HEADER_RETRY_AFTER),
        }
    }
}

fn get_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn get_parsed<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}
