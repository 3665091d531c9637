use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type Bucket = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket with a burst of one.
///
/// A zero period or rate yields an unlimited limiter. Cloning shares the bucket.
#[derive(Clone)]
pub struct Limiter {
    bucket: Option<Arc<Bucket>>,
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("limited", &self.bucket.is_some())
            .finish()
    }
}

impl Limiter {
    /// One token per `period`. The first token is available immediately.
    pub fn every(period: Duration) -> Self {
        Self {
            bucket: Quota::with_period(period).map(|q| Arc::new(RateLimiter::direct(q))),
        }
    }

    pub fn per_second(rate: u32) -> Self {
        Self {
            bucket: NonZeroU32::new(rate).map(|r| Arc::new(RateLimiter::direct(Quota::per_second(r)))),
        }
    }

    pub fn unlimited() -> Self {
        Self { bucket: None }
    }

    /// Suspend until a token is available, then consume it.
    pub async fn until_ready(&self) {
        if let Some(bucket) = &self.bucket {
            bucket.until_ready().await;
        }
    }

    /// Consume a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        match &self.bucket {
            Some(bucket) => bucket.check().is_ok(),
            None => true,
        }
    }
}
