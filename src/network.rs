//! Reachability probe against one or more public hosts, cached briefly to
//! avoid storms.

use crate::config::CoreConfig;
use crate::error::OperationResult;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

const PROBE_HOSTS: &[&str] = &[
    "https://web.whatsapp.com/",
    "https://www.google.com/generate_204",
    "https://connectivitycheck.gstatic.com/generate_204",
];

struct CachedResult {
    reachable: bool,
    observed_at: Instant,
}

/// `CheckInternetConnectivity` - no retries internally; callers retry through
/// [`crate::retry::execute_with_retry`] if desired.
pub struct NetworkService {
    client: reqwest::Client,
    probe_timeout: std::time::Duration,
    cache_ttl: std::time::Duration,
    cache: Arc<Mutex<Option<CachedResult>>>,
}

impl NetworkService {
    pub fn new(cfg: &CoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            probe_timeout: cfg.network_probe_timeout,
            cache_ttl: cfg.network_probe_cache_ttl,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// `CheckInternetConnectivity() -> bool`.
    pub async fn check_internet_connectivity(&self) -> bool {
        {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.as_ref() {
                if cached.observed_at.elapsed() <= self.cache_ttl {
                    return cached.reachable;
                }
            }
        }

        let reachable = self.probe_once().await;

        let mut cache = self.cache.lock().await;
        *cache = Some(CachedResult {
            reachable,
            observed_at: Instant::now(),
        });
        reachable
    }

    /// `CheckInternetConnectivityDetailed() -> OperationResult<bool>`.
    pub async fn check_internet_connectivity_detailed(&self) -> OperationResult<bool> {
        if self.check_internet_connectivity().await {
            OperationResult::Success(true, "network reachable".to_string())
        } else {
            OperationResult::PendingNET("no internet connectivity detected".to_string())
        }
    }

    async fn probe_once(&self) -> bool {
        for host in PROBE_HOSTS {
            let request = self.client.head(*host).timeout(self.probe_timeout).send();
            if let Ok(Ok(resp)) = tokio::time::timeout(self.probe_timeout, request).await {
                if resp.status().is_success() || resp.status().is_redirection() {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detailed_probe_maps_to_operation_result_tags() {
        let cfg = CoreConfig::default();
        let svc = NetworkService::new(&cfg);
        // We can't assert true/false deterministically in a sandboxed test
        // environment, but both branches must type-check into an
        // OperationResult and never panic.
        let result = svc.check_internet_connectivity_detailed().await;
        assert!(matches!(
            result,
            OperationResult::Success(_, _) | OperationResult::PendingNET(_)
        ));
    }

    #[tokio::test]
    async fn cache_is_reused_within_ttl() {
        let mut cfg = CoreConfig::default();
        cfg.network_probe_cache_ttl = std::time::Duration::from_secs(5);
        let svc = NetworkService::new(&cfg);
        let first = svc.check_internet_connectivity().await;
        let second = svc.check_internet_connectivity().await;
        assert_eq!(first, second);
    }
}
