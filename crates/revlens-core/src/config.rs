use std::time::Duration;

use crate::ratelimit::RateTier;
use crate::reconcile::ReconcilerConfig;

/// Default upstream API root. Real deployments override this per vendor
/// region via [`EngineConfig::with_base_url`].
pub const DEFAULT_BASE_URL: &str = "https://api.marketing-upstream.example/api";

/// External configuration surface for one extraction session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_key: String,
    pub base_url: String,
    pub rate_tier: RateTier,
    pub timezone: String,
    pub request_timeout: Duration,
    pub reconciler: ReconcilerConfig,
}

impl EngineConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: String::from(DEFAULT_BASE_URL),
            rate_tier: RateTier::default(),
            timezone: String::from("UTC"),
            request_timeout: Duration::from_secs(30),
            reconciler: ReconcilerConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_rate_tier(mut self, tier: RateTier) -> Self {
        self.rate_tier = tier;
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_reconciler(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;
        self
    }
}
