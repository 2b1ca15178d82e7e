//! Per-host outbound rate limiting with adaptive governor instances.
//!
//! Every fetch waits for its host's governor permit via `until_ready()`,
//! which spaces requests at the configured rate. On 429 the host's governor
//! is swapped for a slower one; after 60s without another 429 the base rate
//! comes back.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Longest slowdown applied after repeated 429s.
const MAX_FACTOR: u32 = 16;
const DECAY_AFTER: Duration = Duration::from_secs(60);

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// Rate limiter for one host, slowed down on 429 and restored after a
/// quiet period.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// 1 = normal, 2 = half rate, ...
    current_factor: AtomicU32,
    last_429: Mutex<Option<Instant>>,
}

impl AdaptiveLimiter {
    pub fn new(period: Duration) -> Self {
        Self {
            limiter: ArcSwap::from(Arc::new(DirectLimiter::direct(quota_for(period)))),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        let ms = 1000 / n.max(1) as u64;
        Self::new(Duration::from_millis(ms))
    }

    /// Wait until a request to this host is allowed.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load_full();
        limiter.until_ready().await;
    }

    /// Record a 429: double the slowdown factor and swap in a slower governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_FACTOR))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
    }

    pub fn factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed() >= DECAY_AFTER))
            .unwrap_or(false);

        if should_restore && self.current_factor.swap(1, Ordering::SeqCst) > 1 {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// Known API hosts and their polite request rates (requests per second).
const HOST_RATES: &[(&str, u32)] = &[
    ("doi.org", 5),
    ("api.crossref.org", 3),
    ("export.arxiv.org", 3),
    ("eutils.ncbi.nlm.nih.gov", 3),
    ("openlibrary.org", 3),
];

/// Rate for hosts without an entry in the table.
const DEFAULT_RATE: u32 = 4;

/// Lazily created per-host limiters.
pub struct HostLimiters {
    limiters: DashMap<String, Arc<AdaptiveLimiter>>,
}

impl Default for HostLimiters {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLimiters {
    pub fn new() -> Self {
        Self {
            limiters: DashMap::new(),
        }
    }

    /// The limiter for `host`, created on first use.
    pub fn get(&self, host: &str) -> Arc<AdaptiveLimiter> {
        let host = host.to_ascii_lowercase();
        self.limiters
            .entry(host.clone())
            .or_insert_with(|| {
                let rate = HOST_RATES
                    .iter()
                    .find(|(h, _)| host == *h || host.ends_with(&format!(".{}", h)))
                    .map(|(_, r)| *r)
                    .unwrap_or(DEFAULT_RATE);
                Arc::new(AdaptiveLimiter::per_second(rate))
            })
            .clone()
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: don't parse, just back off conservatively.
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

/// `Some(retry_after)` if the response is a 429.
pub fn rate_limited(resp: &reqwest::Response) -> Option<Option<Duration>> {
    (resp.status().as_u16() == 429).then(|| {
        resp.headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after)
    })
}
