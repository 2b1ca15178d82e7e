//! The fetch capability: outbound HTTP on behalf of translators.

pub mod mock;
pub mod rate_limit;

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::FetchError;
use rate_limit::HostLimiters;

/// A fetched resource.
#[derive(Debug, Clone)]
pub struct Document {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Document {
    pub fn new(url: &str, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.to_string(),
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(ct) => ct.contains("html"),
            None => self
                .body
                .iter()
                .take(512)
                .copied()
                .collect::<Vec<u8>>()
                .to_ascii_lowercase()
                .windows(5)
                .any(|w| w == b"<html"),
        }
    }
}

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub accept: Option<String>,
}

impl FetchRequest {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            accept: None,
        }
    }

    pub fn accept(mut self, accept: &str) -> Self {
        self.accept = Some(accept.to_string());
        self
    }
}

/// Something that can retrieve documents. The sandbox only ever talks to the
/// network through this trait.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Document, FetchError>> + Send + 'a>>;
}

/// Outbound identity and bounds for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_response_bytes: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("scrivener/{}", env!("CARGO_PKG_VERSION")),
            proxy: None,
            timeout: Duration::from_secs(15),
            max_redirects: 10,
            max_response_bytes: 10 * 1024 * 1024,
        }
    }
}

/// reqwest-backed fetcher with bounded redirects, bounded bodies and per-host
/// rate limiting.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_response_bytes: usize,
    limiters: HostLimiters,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        Ok(Self {
            client: builder.build()?,
            max_response_bytes: config.max_response_bytes,
            limiters: HostLimiters::new(),
        })
    }

    async fn fetch_inner(&self, request: &FetchRequest) -> Result<Document, FetchError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|_| FetchError::InvalidUrl(request.url.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(request.url.clone()));
        }
        let host = url.host_str().unwrap_or_default().to_string();
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        };

        let limiter = self.limiters.get(&host);
        limiter.acquire().await;

        let mut req = self.client.get(url);
        if let Some(accept) = &request.accept {
            req = req.header(reqwest::header::ACCEPT, accept);
        }
        let mut resp = req.send().await.map_err(transport)?;

        if let Some(retry_after) = rate_limit::rate_limited(&resp) {
            limiter.on_rate_limited();
            tracing::warn!(host = %host, retry_after = ?retry_after, "rate limited, slowing down");
            return Err(FetchError::RateLimited { host });
        }
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let too_large = || FetchError::TooLarge {
            url: request.url.clone(),
            limit: self.max_response_bytes,
        };
        if resp
            .content_length()
            .is_some_and(|len| len > self.max_response_bytes as u64)
        {
            return Err(too_large());
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(transport)? {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(url = %final_url, bytes = body.len(), "fetched");
        Ok(Document {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Document, FetchError>> + Send + 'a>> {
        Box::pin(self.fetch_inner(request))
    }
}
