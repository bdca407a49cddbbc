use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use super::types::{
    ExternalFilament, Filament, FilamentCreate, Spool, SpoolCreate, SpoolUpdate, UseWeight,
    Vendor, VendorCreate,
};
use super::InventoryApi;
use crate::error::{Result, SpoolSyncError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Attempts for read requests before giving up on a connection failure.
const READ_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// HTTP client for the Spoolman REST API (`/api/v1`).
///
/// Reads retry on connection failures, rebuilding the underlying
/// `reqwest::Client` between attempts so a stale pool does not poison every
/// retry. Writes are sent exactly once.
pub struct SpoolmanClient {
    base_url: String,
    api_url: String,
    http: RwLock<reqwest::Client>,
}

impl SpoolmanClient {
    /// Create a client for a Spoolman instance, e.g. `http://spoolman:7912`.
    pub fn new(base_url: &str) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let parsed = Url::parse(trimmed)
            .map_err(|e| SpoolSyncError::Config(format!("Invalid Spoolman URL '{}': {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SpoolSyncError::Config(format!(
                "Spoolman URL must be http or https: {}",
                base_url
            )));
        }

        info!("Creating Spoolman client for {}", trimmed);
        Ok(Self {
            base_url: trimmed.to_string(),
            api_url: format!("{}/api/v1", trimmed),
            http: RwLock::new(build_http_client()?),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn http(&self) -> reqwest::Client {
        self.http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn recreate_http_client(&self) {
        match build_http_client() {
            Ok(client) => {
                *self.http.write().unwrap_or_else(PoisonError::into_inner) = client;
                debug!("Recreated Spoolman HTTP client");
            }
            Err(e) => warn!("Failed to recreate Spoolman HTTP client: {}", e),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path);
        let mut last_error = None;

        for attempt in 1..=READ_ATTEMPTS {
            let outcome = match self.http().get(&url).send().await {
                Ok(response) => decode_response(response).await,
                Err(e) => Err(SpoolSyncError::Http(format!("GET {}: {}", url, e))),
            };

            match outcome {
                Err(e) if e.is_connection_error() => {
                    warn!(
                        "Spoolman read failed (attempt {}/{}): {}",
                        attempt, READ_ATTEMPTS, e
                    );
                    last_error = Some(e);
                    if attempt < READ_ATTEMPTS {
                        self.recreate_http_client();
                        tokio::time::sleep(RETRY_BACKOFF).await;
                    }
                }
                other => return other,
            }
        }

        Err(last_error.unwrap_or_else(|| SpoolSyncError::Http(format!("GET {}: no attempts", url))))
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        debug!("Spoolman {} {}", method, url);
        let response = self
            .http()
            .request(method.clone(), &url)
            .json(body)
            .send()
            .await
            .map_err(|e| SpoolSyncError::Http(format!("{} {}: {}", method, url, e)))?;
        decode_response(response).await
    }
}

fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("BambuMate/1.0")
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| SpoolSyncError::Http(format!("Failed to build HTTP client: {}", e)))
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SpoolSyncError::Status {
            status: status.as_u16(),
            body: truncate(&body, 300),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| SpoolSyncError::Decode(e.to_string()))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

#[async_trait]
impl InventoryApi for SpoolmanClient {
    async fn list_spools(&self) -> Result<Vec<Spool>> {
        self.get_json("/spool").await
    }

    async fn create_spool(&self, spool: &SpoolCreate) -> Result<Spool> {
        self.send_json(Method::POST, "/spool", spool).await
    }

    async fn update_spool(&self, spool_id: i64, update: &SpoolUpdate) -> Result<Spool> {
        self.send_json(Method::PATCH, &format!("/spool/{}", spool_id), update)
            .await
    }

    async fn use_spool_weight(&self, spool_id: i64, grams: f64) -> Result<Spool> {
        let body = UseWeight { use_weight: grams };
        self.send_json(Method::PUT, &format!("/spool/{}/use", spool_id), &body)
            .await
    }

    async fn list_filaments(&self) -> Result<Vec<Filament>> {
        self.get_json("/filament").await
    }

    async fn create_filament(&self, filament: &FilamentCreate) -> Result<Filament> {
        self.send_json(Method::POST, "/filament", filament).await
    }

    async fn list_external_filaments(&self) -> Result<Vec<ExternalFilament>> {
        self.get_json("/external/filament").await
    }

    async fn list_vendors(&self) -> Result<Vec<Vendor>> {
        self.get_json("/vendor").await
    }

    async fn create_vendor(&self, name: &str) -> Result<Vendor> {
        let body = VendorCreate {
            name: name.to_string(),
        };
        self.send_json(Method::POST, "/vendor", &body).await
    }

    async fn health(&self) -> Result<()> {
        let _: serde_json::Value = self.get_json("/health").await?;
        Ok(())
    }
}
