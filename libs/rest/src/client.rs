//! Rate-limited REST client
//!
//! Thin wrapper over [`reqwest::Client`] that funnels every request through
//! a per-route bucket queue (see [`crate::bucket`]) and the shared global
//! limiter. Bucket workers are spawned lazily on first use of a route key
//! and live for the lifetime of the client.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{Method, RequestBuilder, Response};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::bucket::{spawn_bucket_worker, PendingRequest};
use crate::error::{Result, RestError};
use crate::global::GlobalRateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

pub struct RateLimitedClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    global: Arc<GlobalRateLimiter>,
    buckets: Mutex<HashMap<String, mpsc::Sender<PendingRequest>>>,
}

impl RateLimitedClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
            global: Arc::new(GlobalRateLimiter::new()),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn global(&self) -> &Arc<GlobalRateLimiter> {
        &self.global
    }

    /// Build a request against the configured base URL
    ///
    /// The bot token, when present, is attached as the `Authorization`
    /// header on every request.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, url);
        if let Some(token) = &self.token {
            builder = builder.header("Authorization", format!("Bot {token}"));
        }
        builder
    }

    /// Queue a request on the given route's bucket and await its response
    ///
    /// Requests sharing a route key run strictly in submission order. If
    /// the caller drops the returned future before completion, the request
    /// may still execute but its response is discarded.
    pub async fn execute(&self, route: &str, builder: RequestBuilder) -> Result<Response> {
        let sender = self.bucket_sender(route);
        let (tx, rx) = oneshot::channel();

        sender
            .send(PendingRequest {
                builder,
                completion: tx,
            })
            .await
            .map_err(|_| RestError::QueueClosed)?;

        rx.await.map_err(|_| RestError::QueueClosed)?
    }

    /// Convenience for GET + execute on the same route key as the path
    pub async fn get(&self, path: &str) -> Result<Response> {
        let builder = self.request(Method::GET, path);
        self.execute(path, builder).await
    }

    fn bucket_sender(&self, route: &str) -> mpsc::Sender<PendingRequest> {
        let mut buckets = self.buckets.lock();
        if let Some(sender) = buckets.get(route) {
            return sender.clone();
        }
        debug!(route = %route, "spawning bucket worker");
        let sender = spawn_bucket_worker(route.to_string(), Arc::clone(&self.global));
        buckets.insert(route.to_string(), sender.clone());
        sender
    }
}
