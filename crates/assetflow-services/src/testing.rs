//! Shared test doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use assetflow_core::MediaCategory;

use crate::services::gateway::{MediaGateway, StoredMedia};
use crate::services::ingestion::IngestError;

pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

/// Gateway returning canned results and recording calls.
pub(crate) struct ScriptedGateway {
    upload_ok: bool,
    delete_ok: bool,
    pub(crate) uploads: AtomicUsize,
    pub(crate) deletes: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub(crate) fn new(upload_ok: bool, delete_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            upload_ok,
            delete_ok,
            uploads: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaGateway for ScriptedGateway {
    async fn upload(
        &self,
        _category: MediaCategory,
        _origin_url: &str,
    ) -> Result<StoredMedia, IngestError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.upload_ok {
            Ok(StoredMedia {
                locator: format!("{}_stored.png", n),
                url: format!("http://files.test/{}_stored.png", n),
            })
        } else {
            Err(IngestError::DownloadFailure("origin timed out".to_string()))
        }
    }

    async fn delete(&self, locator: &str) -> Result<(), IngestError> {
        self.deletes.lock().unwrap().push(locator.to_string());
        if self.delete_ok {
            Ok(())
        } else {
            Err(IngestError::StorageFailure("disk gone".to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
