use std::time::Duration;

/// Every tunable duration/bound the CORE uses. No module outside this file
/// hard-codes a timeout or retry count.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Entry URL used for session readiness (`https://web.whatsapp.com/`).
    pub entry_url: String,
    /// Per-moderator browser profile root directory.
    pub profile_dir: String,
    /// Redis URL backing the pause-state / outbound-message stores.
    pub redis_url: String,

    /// Page-load wait ceiling (default 30s).
    pub page_load_wait: Duration,
    /// Poll interval used while waiting on a selector family (default 250ms).
    pub poll_interval: Duration,
    /// Status classification window (default 60s).
    pub status_classification_wait: Duration,
    /// Network probe timeout (default 3s).
    pub network_probe_timeout: Duration,
    /// Network probe cache TTL (default 2s).
    pub network_probe_cache_ttl: Duration,
    /// Drain wait ceiling (default 30s).
    pub drain_wait: Duration,
    /// Drain poll interval (default 500ms).
    pub drain_check_interval: Duration,

    /// Max attempts for the error-dialog check retry loop.
    pub max_error_dialog_attempts: u32,
    /// Max attempts for the input-field lookup retry loop.
    pub max_input_field_attempts: u32,
    /// Max attempts for the overall send/validate retry loop.
    pub max_send_attempts: u32,

    /// RetryService backoff base delay.
    pub retry_base_delay: Duration,
    /// RetryService backoff ceiling.
    pub retry_max_delay: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            entry_url: "https://web.whatsapp.com/".to_string(),
            profile_dir: "./.whatsapp-profiles".to_string(),
            redis_url: "redis://localhost:6379".to_string(),

            page_load_wait: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            status_classification_wait: Duration::from_secs(60),
            network_probe_timeout: Duration::from_secs(3),
            network_probe_cache_ttl: Duration::from_secs(2),
            drain_wait: Duration::from_secs(30),
            drain_check_interval: Duration::from_millis(500),

            max_error_dialog_attempts: 3,
            max_input_field_attempts: 3,
            max_send_attempts: 3,

            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(8),
        }
    }
}

impl CoreConfig {
    /// Load overrides from environment, falling back to [`CoreConfig::default`]
    /// for anything unset: `dotenv::dotenv().ok()` plus
    /// `std::env::var(...).unwrap_or_else(...)` for the plain strings, and the
    /// `config` crate for everything numeric.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("WA_CORE").separator("__"))
            .build();

        let mut cfg = defaults;
        cfg.entry_url = std::env::var("WA_ENTRY_URL").unwrap_or(cfg.entry_url);
        cfg.profile_dir = std::env::var("WA_PROFILE_DIR").unwrap_or(cfg.profile_dir);
        cfg.redis_url = std::env::var("REDIS_URL").unwrap_or(cfg.redis_url);

        if let Ok(settings) = settings {
            if let Ok(secs) = settings.get_int("page_load_wait_secs") {
                cfg.page_load_wait = Duration::from_secs(secs.max(0) as u64);
            }
            if let Ok(ms) = settings.get_int("poll_interval_ms") {
                cfg.poll_interval = Duration::from_millis(ms.max(0) as u64);
            }
            if let Ok(secs) = settings.get_int("status_classification_wait_secs") {
                cfg.status_classification_wait = Duration::from_secs(secs.max(0) as u64);
            }
            if let Ok(attempts) = settings.get_int("max_send_attempts") {
                cfg.max_send_attempts = attempts.max(1) as u32;
            }
        }

        cfg
    }
}
