use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tracing::{info, warn};

use super::{InventoryApi, SpoolmanClient};
use crate::config::SyncSettings;
use crate::error::{Result, SpoolSyncError};

/// Result of probing the configured Spoolman instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub configured: bool,
    pub reachable: bool,
    pub url: Option<String>,
}

struct ActiveClient {
    url: Option<String>,
    api: Arc<dyn InventoryApi>,
}

/// Owns the Spoolman client and ties its lifetime to settings changes.
///
/// Constructed explicitly and passed to whoever needs it. `reconfigure`
/// is called whenever settings change; callers then borrow the current
/// client through [`SpoolmanService::client`].
#[derive(Default)]
pub struct SpoolmanService {
    active: RwLock<Option<ActiveClient>>,
}

impl SpoolmanService {
    /// A service with no client; every call fails with `NotConfigured`
    /// until [`reconfigure`](Self::reconfigure) succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A service bound to an existing inventory implementation.
    pub fn with_api(api: Arc<dyn InventoryApi>) -> Self {
        Self {
            active: RwLock::new(Some(ActiveClient { url: None, api })),
        }
    }

    /// Create, replace or drop the client to match `settings`.
    ///
    /// An unchanged URL keeps the existing client.
    pub fn reconfigure(&self, settings: &SyncSettings) -> Result<()> {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);

        let Some(url) = settings.active_url() else {
            if active.take().is_some() {
                info!("Spoolman disabled, dropped client");
            }
            return Ok(());
        };

        if let Some(current) = active.as_ref() {
            if current.url.as_deref() == Some(url) {
                return Ok(());
            }
        }

        let client = SpoolmanClient::new(url)?;
        *active = Some(ActiveClient {
            url: Some(client.base_url().to_string()),
            api: Arc::new(client),
        });
        info!("Spoolman client configured for {}", url);
        Ok(())
    }

    /// Drop the client. Safe to call when none is configured.
    pub fn close(&self) {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        if active.take().is_some() {
            info!("Spoolman client closed");
        }
    }

    pub fn is_configured(&self) -> bool {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn url(&self) -> Option<String> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|a| a.url.clone())
    }

    /// The current client, or `NotConfigured`.
    pub fn client(&self) -> Result<Arc<dyn InventoryApi>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|a| Arc::clone(&a.api))
            .ok_or(SpoolSyncError::NotConfigured)
    }

    pub async fn check_health(&self) -> HealthReport {
        let url = self.url();
        let Ok(api) = self.client() else {
            return HealthReport {
                configured: false,
                reachable: false,
                url,
            };
        };

        let reachable = match api.health().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Spoolman health check failed: {}", e);
                false
            }
        };
        HealthReport {
            configured: true,
            reachable,
            url,
        }
    }
}
