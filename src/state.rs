//! Shared handler state: one instance of each service over a common pool.

use crate::{
    config::AppConfig,
    services::{
        catalog::CatalogService,
        compression::{Capabilities, CompressOptions, COMPRESS_TIMEOUT},
        ingest::{IngestPipeline, UploadContext},
        match_graph::MatchGraphStore,
        object_store::DiskObjectStore,
    },
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub matches: MatchGraphStore,
    pub ingest: IngestPipeline,
    pub images: DiskObjectStore,
    pub max_retries: u32,
    pub capabilities: Capabilities,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, cfg: &AppConfig) -> Self {
        let images = DiskObjectStore::new(db.clone(), &cfg.storage_dir, &cfg.public_url);
        let compress = CompressOptions {
            max_width: cfg.max_width,
            quality: cfg.jpeg_quality,
            timeout: COMPRESS_TIMEOUT,
        };

        Self {
            catalog: CatalogService::new(db.clone(), Arc::new(images.clone())),
            matches: MatchGraphStore::new(db),
            ingest: IngestPipeline::new(Arc::new(images.clone()), compress),
            images,
            max_retries: cfg.max_retries,
            capabilities: Capabilities {
                compression: cfg.compression,
            },
        }
    }

    /// Upload context for a request received at `requested_at`, using the
    /// configured defaults.
    pub fn upload_context(&self, requested_at: DateTime<Utc>) -> UploadContext {
        UploadContext::new(requested_at)
            .with_max_retries(self.max_retries)
            .with_capabilities(self.capabilities)
    }
}
