use std::{collections::HashMap, num::NonZeroU32, sync::Mutex, time::Duration};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use super::{CoordinationError, Result};

/// Seaux à jetons en mémoire, un par clé
#[derive(Default)]
pub(super) struct TokenBuckets {
    buckets: Mutex<HashMap<String, DefaultDirectRateLimiter>>,
}

/// `burst` jetons d'un coup, puis un de plus toutes les `period`
fn quota(burst: u32, period: Duration) -> Quota {
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst)
}

impl TokenBuckets {
    /// Prend un jeton dans le seau de `key`, créé au premier appel. `false` si le seau est vide.
    pub(super) fn take(&self, key: &str, burst: u32, period: Duration) -> Result<bool> {
        let mut buckets = self.buckets.lock().map_err(|e| CoordinationError::Backend(e.to_string()))?;
        let bucket = buckets.entry(key.to_string())
            .or_insert_with(|| RateLimiter::direct(quota(burst, period)));
        Ok(bucket.check().is_ok())
    }
}
