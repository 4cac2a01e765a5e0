pub mod cache;
pub mod service;

use std::sync::Arc;

use chorus_core::config::MediaCacheConfig;
use chorus_core::Result;
use chorus_storage::JsonStore;

pub use cache::{MediaCache, MediaEntry};
pub use service::{CatboxPermanentService, LitterboxTemporaryService, PixeldrainPermanentService, UploadError, UploadResult, UploadService};

/// Build the configured upload services by name, skipping any whose
/// credentials are missing (pixeldrain without a key, logged and dropped).
pub fn build_services(config: &MediaCacheConfig) -> Vec<Box<dyn UploadService>> {
    let client = reqwest::Client::new();
    let mut services: Vec<Box<dyn UploadService>> = Vec::new();
    for name in &config.services {
        match name.as_str() {
            "catbox" => services.push(Box::new(CatboxPermanentService::new(client.clone(), config.catbox_user_hash.clone()))),
            "litterbox" => services.push(Box::new(LitterboxTemporaryService::new(client.clone()))),
            "pixeldrain" => {
                if let Some(key) = &config.pixeldrain_api_key {
                    services.push(Box::new(PixeldrainPermanentService::new(client.clone(), key.clone())));
                } else {
                    tracing::warn!("pixeldrain configured but no api key set, skipping");
                }
            }
            other => tracing::warn!(service = other, "unknown media caching service, skipping"),
        }
    }
    services
}

pub async fn build_cache(store: Arc<JsonStore>, data_root: impl Into<std::path::PathBuf>, config: MediaCacheConfig) -> Result<MediaCache> {
    let services = build_services(&config);
    MediaCache::load(store, data_root, services, config).await
}
