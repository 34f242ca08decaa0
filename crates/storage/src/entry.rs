use serde_json::Value;
use tokio::time::{Duration, Instant};

/// Limite para TTLs gigantes que estourariam o `Instant` (~30 anos).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Entrada no store: valor + instante absoluto de expiração.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Instant,
}

impl Entry {
    pub fn new(value: Value, expires_at: Instant) -> Self {
        Self { value, expires_at }
    }

    pub fn with_ttl(value: Value, ttl_secs: i64, now: Instant) -> Self {
        Self::new(value, expiry_from_ttl(now, ttl_secs))
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Calcula `now + ttl`. TTL <= 0 significa "já expirado".
pub fn expiry_from_ttl(now: Instant, ttl_secs: i64) -> Instant {
    if ttl_secs <= 0 {
        return now;
    }
    now + Duration::from_secs(ttl_secs as u64).min(FAR_FUTURE)
}
