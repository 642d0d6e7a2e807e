#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use photo_catalog::cache::{CacheCoordinator, CacheKey, Revalidator};
use photo_catalog::db::{self, Db, PhotoRecord};
use photo_catalog::form::PhotoForm;
use photo_catalog::storage::{Storage, StorageError};
use photo_catalog::{Catalog, CatalogSettings};

pub const BASE_URL: &str = "https://blob.test/photos";

pub async fn setup_db() -> Db {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    let db = Db::new(pool, Duration::from_millis(10));
    db.ensure_schema().await.unwrap();
    db
}

/// Storage double that keeps uploads in memory and records every call.
#[derive(Default)]
pub struct MemoryStorage {
    pub uploads: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
    pub fail_deletes: bool,
}

impl MemoryStorage {
    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(&self, _bytes: Vec<u8>, file_name: &str) -> Result<String, StorageError> {
        let url = format!("{BASE_URL}/{file_name}");
        self.uploads.lock().unwrap().push(url.clone());
        Ok(url)
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        self.deletes.lock().unwrap().push(url.to_string());
        if self.fail_deletes {
            return Err(StorageError::InvalidUrl(url.to_string()));
        }
        Ok(())
    }
}

/// Revalidator double recording keys and paths in call order.
#[derive(Default)]
pub struct RecordingRevalidator {
    events: Mutex<Vec<String>>,
}

impl RecordingRevalidator {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl Revalidator for RecordingRevalidator {
    fn revalidate_key(&self, key: CacheKey) {
        self.events.lock().unwrap().push(format!("key:{}", key.as_str()));
    }

    fn revalidate_path(&self, path: &str) {
        self.events.lock().unwrap().push(format!("path:{path}"));
    }
}

pub struct Harness {
    pub catalog: Catalog,
    pub storage: Arc<MemoryStorage>,
    pub revalidator: Arc<RecordingRevalidator>,
}

pub async fn harness_with(storage: MemoryStorage, settings: CatalogSettings) -> Harness {
    let db = setup_db().await;
    let storage = Arc::new(storage);
    let revalidator = Arc::new(RecordingRevalidator::default());
    let coordinator = CacheCoordinator::new(vec![
        "/admin/photos".into(),
        "/admin/tags".into(),
        "/admin/uploads".into(),
    ])
    .with_revalidator(revalidator.clone());
    let catalog = Catalog::new(db, settings, storage.clone(), coordinator);
    Harness {
        catalog,
        storage,
        revalidator,
    }
}

pub async fn harness() -> Harness {
    let settings = CatalogSettings {
        blur_enabled: false,
        ..CatalogSettings::default()
    };
    harness_with(MemoryStorage::default(), settings).await
}

/// Form for a photo taken `hour` hours into 2024-01-01 UTC+09:00.
pub fn form(id: &str, hour: u32) -> PhotoForm {
    PhotoForm {
        id: Some(id.to_string()),
        url: Some(format!("{BASE_URL}/photo-{id}.jpg")),
        extension: Some("jpg".into()),
        taken_at: Some(format!("2024-01-01T{:02}:00:00.000Z", hour)),
        taken_at_naive: Some(format!("2024-01-01 {:02}:00:00", hour + 9)),
        ..PhotoForm::default()
    }
}

pub async fn insert(db: &Db, form: PhotoForm) -> PhotoRecord {
    let record = form.into_record(false).unwrap();
    db::insert_photo(db, &record).await.unwrap();
    record
}

pub fn ids(photos: &[photo_catalog::model::Photo]) -> Vec<String> {
    photos.iter().map(|p| p.id.clone()).collect()
}
