//! Rate-limited REST layer
//!
//! ```text
//!   caller ── execute(route, request) ──► bucket queue (FIFO, bounded)
//!                                              │
//!                                              ▼
//!                                        bucket worker ──► global limiter
//!                                              │                 │
//!                                              ▼                 ▼
//!                                          send ◄──── wait for shared window
//! ```
//!
//! Requests on the same route key serialize through one worker; 429s are
//! retried in place so later requests on the bucket never jump the line.

pub mod bucket;
pub mod client;
pub mod error;
pub mod global;
pub mod headers;

pub use client::{RateLimitedClient, DEFAULT_BASE_URL};
pub use error::{RestError, Result};
pub use global::GlobalRateLimiter;
pub use headers::RateLimitHeaders;
