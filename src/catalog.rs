//! Request-scoped entry point: cached reads and the mutation actions.
//!
//! Every action writes first, then invalidates the affected cache keys and
//! admin paths before it returns.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::cache::{CacheCoordinator, CacheKey, MemoryCache, DEFAULT_MAX_ENTRIES};
use crate::config::Config;
use crate::db::{self, Db, PhotoQuery, PhotoRecord};
use crate::error::{CatalogError, Result};
use crate::form::{PhotoExif, PhotoForm};
use crate::model::{
    photo_file_name, toggle_favorite, Camera, CameraCount, DateRange, EntitySummary,
    FilmSimulation, FilmSimulationCount, Photo, SortBy, TagCount, TAG_FAVS,
};
use crate::storage::{HttpStorage, Storage};

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogSettings {
    pub priority_order_enabled: bool,
    pub geo_privacy_enabled: bool,
    pub blur_enabled: bool,
    pub default_limit: u32,
    pub cache_max_entries: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self::from(&crate::config::Catalog::default())
    }
}

impl From<&crate::config::Catalog> for CatalogSettings {
    fn from(c: &crate::config::Catalog) -> Self {
        Self {
            priority_order_enabled: c.priority_order_enabled,
            geo_privacy_enabled: c.geo_privacy_enabled,
            blur_enabled: c.blur_enabled,
            default_limit: c.default_limit,
            cache_max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl CatalogSettings {
    pub fn default_sort(&self) -> SortBy {
        if self.priority_order_enabled {
            SortBy::Priority
        } else {
            SortBy::TakenAt
        }
    }
}

/// Image bytes accompanying a new photo.
#[derive(Debug, Clone)]
pub struct Asset {
    pub bytes: Vec<u8>,
}

pub struct Catalog {
    db: Db,
    settings: CatalogSettings,
    storage: Arc<dyn Storage>,
    cache: Arc<MemoryCache>,
    coordinator: CacheCoordinator,
}

impl Catalog {
    /// The memory cache is registered with `coordinator` so that every
    /// invalidation reaches it.
    pub fn new(
        db: Db,
        settings: CatalogSettings,
        storage: Arc<dyn Storage>,
        coordinator: CacheCoordinator,
    ) -> Self {
        let cache = Arc::new(MemoryCache::with_capacity(settings.cache_max_entries));
        let coordinator = coordinator.with_revalidator(cache.clone());
        Self {
            db,
            settings,
            storage,
            cache,
            coordinator,
        }
    }

    pub async fn connect(cfg: &Config) -> Result<Self> {
        let pool = db::init_pool(&cfg.database_url()).await?;
        let db = Db::new(pool, cfg.retry_delay());
        let storage = HttpStorage::from_config(cfg)?;
        let settings = CatalogSettings {
            cache_max_entries: cfg.cache.max_entries,
            ..CatalogSettings::from(&cfg.catalog)
        };
        Ok(Self::new(
            db,
            settings,
            Arc::new(storage),
            CacheCoordinator::from_config(cfg),
        ))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn cache(&self) -> &MemoryCache {
        &self.cache
    }

    pub fn retry_delay(&self) -> Duration {
        self.db.retry_delay()
    }

    /// Default listing options: configured page size, hidden excluded.
    pub fn query(&self) -> PhotoQuery {
        PhotoQuery::new().limit(self.settings.default_limit)
    }

    // ---- reads ----

    pub async fn photos(&self, query: &PhotoQuery) -> Result<Vec<Photo>> {
        let name = format!("photos:{}", serde_json::to_string(query).unwrap_or_default());
        let sort = self.settings.default_sort();
        self.cache
            .get_or_load(&name, &[CacheKey::Photos], || db::list_photos(&self.db, query, sort))
            .await
    }

    pub async fn photos_near_id(&self, id: &str, limit: u32) -> Result<Vec<Photo>> {
        let name = format!("photos-near:{id}:{limit}");
        let sort = self.settings.default_sort();
        self.cache
            .get_or_load(&name, &[CacheKey::Photos, CacheKey::Photo], || {
                db::photos_near_id(&self.db, id, limit, sort)
            })
            .await
    }

    pub async fn photo(&self, id: &str) -> Result<Option<Photo>> {
        self.cache
            .get_or_load(&format!("photo:{id}"), &[CacheKey::Photos, CacheKey::Photo], || {
                db::get_photo(&self.db, id)
            })
            .await
    }

    pub async fn photos_count(&self) -> Result<i64> {
        self.cache
            .get_or_load("count:visible", &[CacheKey::Photos], || db::photos_count(&self.db))
            .await
    }

    pub async fn photos_count_including_hidden(&self) -> Result<i64> {
        self.cache
            .get_or_load("count:all", &[CacheKey::Photos], || {
                db::photos_count_including_hidden(&self.db)
            })
            .await
    }

    pub async fn photos_date_range(&self) -> Result<DateRange> {
        self.cache
            .get_or_load("date-range:visible", &[CacheKey::Photos], || {
                db::photos_date_range(&self.db)
            })
            .await
    }

    pub async fn unique_tags(&self) -> Result<Vec<TagCount>> {
        self.cache
            .get_or_load("tags:visible", &[CacheKey::Photos, CacheKey::Tags], || {
                db::unique_tags(&self.db)
            })
            .await
    }

    pub async fn unique_tags_including_hidden(&self) -> Result<Vec<TagCount>> {
        self.cache
            .get_or_load("tags:all", &[CacheKey::Photos, CacheKey::Tags], || {
                db::unique_tags_including_hidden(&self.db)
            })
            .await
    }

    pub async fn unique_cameras(&self) -> Result<Vec<CameraCount>> {
        self.cache
            .get_or_load("cameras:visible", &[CacheKey::Photos, CacheKey::Cameras], || {
                db::unique_cameras(&self.db)
            })
            .await
    }

    pub async fn unique_cameras_including_hidden(&self) -> Result<Vec<CameraCount>> {
        self.cache
            .get_or_load("cameras:all", &[CacheKey::Photos, CacheKey::Cameras], || {
                db::unique_cameras_including_hidden(&self.db)
            })
            .await
    }

    pub async fn unique_film_simulations(&self) -> Result<Vec<FilmSimulationCount>> {
        self.cache
            .get_or_load(
                "film-simulations:visible",
                &[CacheKey::Photos, CacheKey::FilmSimulations],
                || db::unique_film_simulations(&self.db),
            )
            .await
    }

    pub async fn unique_film_simulations_including_hidden(&self) -> Result<Vec<FilmSimulationCount>> {
        self.cache
            .get_or_load(
                "film-simulations:all",
                &[CacheKey::Photos, CacheKey::FilmSimulations],
                || db::unique_film_simulations_including_hidden(&self.db),
            )
            .await
    }

    pub async fn tag_summary(&self, tag: &str) -> Result<EntitySummary> {
        let (count, date_range) =
            futures::try_join!(db::tag_count(&self.db, tag), db::tag_date_range(&self.db, tag))?;
        Ok(EntitySummary { count, date_range })
    }

    pub async fn camera_summary(&self, camera: &Camera) -> Result<EntitySummary> {
        let (count, date_range) = futures::try_join!(
            db::camera_count(&self.db, camera),
            db::camera_date_range(&self.db, camera)
        )?;
        Ok(EntitySummary { count, date_range })
    }

    pub async fn film_simulation_summary(&self, simulation: FilmSimulation) -> Result<EntitySummary> {
        let (count, date_range) = futures::try_join!(
            db::film_simulation_count(&self.db, simulation),
            db::film_simulation_date_range(&self.db, simulation)
        )?;
        Ok(EntitySummary { count, date_range })
    }

    // ---- lenient metadata reads ----

    pub async fn photos_count_or_default(&self) -> i64 {
        or_default("photos count", self.photos_count()).await
    }

    pub async fn photos_count_including_hidden_or_default(&self) -> i64 {
        or_default("photos count including hidden", self.photos_count_including_hidden()).await
    }

    pub async fn photos_date_range_or_default(&self) -> DateRange {
        or_default("photos date range", self.photos_date_range()).await
    }

    pub async fn unique_tags_or_default(&self) -> Vec<TagCount> {
        or_default("unique tags", self.unique_tags()).await
    }

    pub async fn unique_cameras_or_default(&self) -> Vec<CameraCount> {
        or_default("unique cameras", self.unique_cameras()).await
    }

    pub async fn unique_film_simulations_or_default(&self) -> Vec<FilmSimulationCount> {
        or_default("unique film simulations", self.unique_film_simulations()).await
    }

    // ---- actions ----

    /// Insert a photo from a submitted form. When `asset` is given it is
    /// uploaded first and its stored location becomes the photo url.
    #[instrument(skip_all)]
    pub async fn create_photo(&self, form: PhotoForm, asset: Option<Asset>) -> Result<PhotoRecord> {
        form.check_required(self.settings.blur_enabled)?;
        let mut record = if asset.is_some() {
            form.into_upload_record()?
        } else {
            form.into_record(true)?
        };

        let uploaded = match asset {
            Some(asset) => {
                let file_name = photo_file_name(&record.id, &record.extension);
                let url = self.storage.upload(asset.bytes, &file_name).await?;
                record.url = url.clone();
                Some(url)
            }
            None => None,
        };

        if let Err(err) = db::insert_photo(&self.db, &record).await {
            if let Some(url) = uploaded {
                if let Err(cleanup) = self.storage.delete(&url).await {
                    warn!(%url, err = %cleanup, "failed to remove orphaned upload");
                }
            }
            return Err(err);
        }

        self.coordinator.invalidate_all();
        info!(id = %record.id, "photo created");
        Ok(record)
    }

    /// Full replace of a stored photo from a submitted form.
    #[instrument(skip_all)]
    pub async fn update_photo(&self, form: PhotoForm) -> Result<PhotoRecord> {
        form.check_required(self.settings.blur_enabled)?;
        let record = form.into_record(false)?;
        if db::update_photo(&self.db, &record).await? == 0 {
            return Err(CatalogError::NotFound(record.id));
        }
        self.coordinator.invalidate_all();
        info!(id = %record.id, "photo updated");
        Ok(record)
    }

    /// Flip favorite membership; returns the new state.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool> {
        let photo = db::get_photo(&self.db, id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let mut record = PhotoRecord::from(&photo);
        record.tags = toggle_favorite(&photo.tags);
        let favorite = record.tags.iter().any(|t| t == TAG_FAVS);
        db::update_photo(&self.db, &record).await?;
        self.coordinator.invalidate_all();
        Ok(favorite)
    }

    /// Delete the row, then its asset. Asset removal is best effort.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn delete_photo(&self, id: &str, url: &str) -> Result<u64> {
        let deleted = db::delete_photo(&self.db, id).await?;
        if let Err(err) = self.storage.delete(url).await {
            warn!(%url, %err, "photo row deleted but asset removal failed");
        }
        self.coordinator.invalidate_all();
        info!(deleted, "photo deleted");
        Ok(deleted)
    }

    #[instrument(skip_all, fields(tag = %tag))]
    pub async fn delete_tag_globally(&self, tag: &str) -> Result<u64> {
        if tag.trim().is_empty() {
            return Err(CatalogError::validation("tag", "must not be blank"));
        }
        let updated = db::delete_tag_globally(&self.db, tag).await?;
        self.coordinator.invalidate_key(CacheKey::Photos);
        self.coordinator.invalidate_admin_views();
        info!(updated, "tag deleted");
        Ok(updated)
    }

    /// Rename `tag` on every photo. Blank or identical names are a no-op.
    #[instrument(skip_all, fields(tag = %tag, updated = %updated))]
    pub async fn rename_tag_globally(&self, tag: &str, updated: &str) -> Result<u64> {
        if tag.trim().is_empty() || updated.trim().is_empty() || tag == updated {
            return Ok(0);
        }
        if updated == TAG_FAVS {
            return Err(CatalogError::validation(
                "updatedTag",
                format!("'{TAG_FAVS}' is a reserved tag"),
            ));
        }
        if updated.contains(',') {
            return Err(CatalogError::validation("updatedTag", "must not contain ','"));
        }
        let renamed = db::rename_tag_globally(&self.db, tag, updated).await?;
        self.coordinator.invalidate_key(CacheKey::Photos);
        info!(renamed, "tag renamed");
        Ok(renamed)
    }

    /// Replace the EXIF-owned fields of a stored photo with a fresh extraction.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn sync_photo_exif(&self, id: &str, exif: &PhotoExif) -> Result<PhotoRecord> {
        let photo = db::get_photo(&self.db, id)
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        let form = PhotoForm::from_photo(&photo).with_exif(exif, self.settings.geo_privacy_enabled);
        let record = form.into_record(false)?;
        db::update_photo(&self.db, &record).await?;
        self.coordinator.invalidate_key(CacheKey::Photos);
        Ok(record)
    }

    /// Remove a stored asset with no catalog row, e.g. an abandoned upload.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn delete_blob(&self, url: &str) -> Result<()> {
        self.storage.delete(url).await?;
        self.coordinator.invalidate_admin_views();
        Ok(())
    }

    pub fn sync_cache(&self) {
        self.coordinator.invalidate_all();
    }
}

async fn or_default<T: Default>(what: &str, fut: impl Future<Output = Result<T>>) -> T {
    match fut.await {
        Ok(value) => value,
        Err(err) => {
            warn!(%err, "failed to read {what}; using default");
            T::default()
        }
    }
}
