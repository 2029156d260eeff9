//! Per-service token bucket throttling.
//!
//! [`RateLimiter::acquire`] never rejects a call, it only delays it until the
//! service's bucket holds a token. Buckets refill continuously from the
//! monotonic [`Clock`], so wall-clock jumps cannot grant extra tokens.
//!
//! Buckets are in-memory and per process. Several `awsctl` processes running
//! at once each get their own budget; sharing one limit across processes
//! would need an external synchronized store, which is not provided.

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::clock::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Calls per second for services without an explicit rate.
pub const DEFAULT_RATE: f64 = 50.0;

/// Built-in per-service rates.
const BUILTIN_RATES: &[(&str, f64)] = &[
    // Cost Explorer is heavily throttled
    ("ce", 10.0),
    ("ec2", 20.0),
    ("s3", 100.0),
];

/// Rates for every service.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimits {
    /// Rate for services not listed
    pub default_rate: f64,
    /// Bucket capacity in tokens
    pub burst: f64,
    services: BTreeMap<String, f64>,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            default_rate: DEFAULT_RATE,
            burst: 1.0,
            services: BUILTIN_RATES
                .iter()
                .map(|(name, rate)| ((*name).to_string(), *rate))
                .collect(),
        }
    }
}

impl RateLimits {
    /// Set the rate for one service.
    pub fn set(&mut self, service: &str, rate: f64) {
        self.services.insert(service.to_string(), rate);
    }

    /// Calls per second allowed for a service.
    pub fn rate_for(&self, service: &str) -> f64 {
        self.services
            .get(service)
            .copied()
            .unwrap_or(self.default_rate)
    }
}

/// Token state for one service.
#[derive(Debug)]
struct RateLimitBucket {
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_refill: Instant,
}

impl RateLimitBucket {
    fn new(capacity: f64, rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            capacity,
            rate,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Take a token, or report how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            // Round up to a whole microsecond so the next refill clears 1.0.
            let wait = Duration::try_from_secs_f64(missing / self.rate).unwrap_or(Duration::MAX);
            Err(wait.saturating_add(Duration::from_micros(1)))
        }
    }
}

/// Blocking per-service rate limiter.
pub struct RateLimiter {
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    buckets: Mutex<HashMap<String, RateLimitBucket>>,
}

impl RateLimiter {
    /// Create a limiter on a custom clock.
    pub fn with_clock(limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Block until a token for `service` is available, then consume it.
    pub fn acquire(&self, service: &str) {
        self.acquire_cancellable(service, &CancelToken::new());
    }

    /// Like [`acquire`](Self::acquire), but gives up when `cancel` fires.
    ///
    /// Returns `true` if a token was consumed.
    pub fn acquire_cancellable(&self, service: &str, cancel: &CancelToken) -> bool {
        let mut waited = Duration::ZERO;
        loop {
            if cancel.is_cancelled() {
                return false;
            }

            let wait = {
                let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
                let now = self.clock.now();
                let bucket = buckets.entry(service.to_string()).or_insert_with(|| {
                    let rate = self.limits.rate_for(service);
                    log::debug!("Creating rate limit bucket for {service} at {rate}/s");
                    RateLimitBucket::new(self.limits.burst.max(1.0), rate, now)
                });
                match bucket.try_take(now) {
                    Ok(()) => {
                        if !waited.is_zero() {
                            log::debug!("Rate limited {service} for {waited:?}");
                        }
                        return true;
                    }
                    Err(wait) => wait,
                }
            };

            let slice = wait.min(POLL_INTERVAL);
            self.clock.sleep(slice);
            waited += slice;
        }
    }
}
