//! Fixed-window PIN rate limiter, per source IP.
//!
//! Process memory only: `ip → (count, reset_at)`. Expired buckets are
//! purged lazily — on their own next hit, and with a full sweep once the
//! map grows past a bound so spoofed addresses cannot grow it without
//! limit.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Attempts allowed per window.
const MAX_ATTEMPTS: u32 = 10;

/// Window length.
const WINDOW: Duration = Duration::from_secs(5 * 60);

/// Map size that triggers a full expired-bucket sweep.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    reset_at: Instant,
}

/// In-memory per-IP attempt limiter.
pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    max_attempts: u32,
    window: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(MAX_ATTEMPTS, WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        RateLimiter {
            buckets: Mutex::new(HashMap::new()),
            max_attempts,
            window,
        }
    }

    /// Records an attempt from `ip`. Returns false when the attempt
    /// exceeds the window's budget — regardless of whether the PIN would
    /// have been correct.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter lock poisoned");

        if buckets.len() > SWEEP_THRESHOLD {
            buckets.retain(|_, b| b.reset_at > now);
        }

        let bucket = buckets.entry(ip).or_insert(Bucket {
            count: 0,
            reset_at: now + self.window,
        });

        if bucket.reset_at <= now {
            bucket.count = 0;
            bucket.reset_at = now + self.window;
        }

        bucket.count += 1;
        bucket.count <= self.max_attempts
    }
}
