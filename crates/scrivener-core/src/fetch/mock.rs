//! In-memory fetcher for tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Document, FetchRequest, Fetcher};
use crate::error::FetchError;

/// A canned response for [`MockFetcher`].
#[derive(Clone, Debug)]
pub enum MockResponse {
    Body {
        content_type: String,
        body: String,
    },
    Status(u16),
    RateLimited,
    /// Never completes.
    Hang,
}

impl MockResponse {
    pub fn html(body: &str) -> Self {
        MockResponse::Body {
            content_type: "text/html; charset=utf-8".into(),
            body: body.into(),
        }
    }

    pub fn json(body: &str) -> Self {
        MockResponse::Body {
            content_type: "application/json".into(),
            body: body.into(),
        }
    }

    pub fn xml(body: &str) -> Self {
        MockResponse::Body {
            content_type: "application/atom+xml".into(),
            body: body.into(),
        }
    }
}

/// A [`Fetcher`] serving fixed responses by exact URL. Unknown URLs get 404.
///
/// Records every requested URL and supports per-call latency.
#[derive(Default)]
pub struct MockFetcher {
    routes: HashMap<String, MockResponse>,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, response: MockResponse) -> Self {
        self.routes.insert(url.to_string(), response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Fetcher for MockFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Document, FetchError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let response = self
            .routes
            .get(&request.url)
            .cloned()
            .unwrap_or(MockResponse::Status(404));
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match response {
                MockResponse::Body { content_type, body } => {
                    Ok(Document::new(&request.url, &content_type, body))
                }
                MockResponse::Status(status) => Err(FetchError::Status {
                    url: request.url.clone(),
                    status,
                }),
                MockResponse::RateLimited => Err(FetchError::RateLimited {
                    host: "mock".into(),
                }),
                MockResponse::Hang => std::future::pending().await,
            }
        })
    }
}
