use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{instrument, warn};

use super::exec::Db;
use super::query::{self, PhotoQuery};
use super::record::{photo_from_row, PhotoRecord};
use crate::error::{CatalogError, Result};
use crate::model::{
    Camera, CameraCount, DateRange, FilmSimulation, FilmSimulationCount, Photo, SortBy, TagCount,
};

fn photos_from_rows(rows: &[SqliteRow]) -> Result<Vec<Photo>> {
    rows.iter()
        .map(|row| photo_from_row(row).map_err(CatalogError::from))
        .collect()
}

#[instrument(skip_all)]
pub async fn list_photos(db: &Db, query: &PhotoQuery, default_sort: SortBy) -> Result<Vec<Photo>> {
    let stmt = query::list_photos(query, default_sort)?;
    let rows = db.fetch_all(&stmt).await?;
    photos_from_rows(&rows)
}

/// `limit` visible photos starting one before `id` in `sort_by` order.
/// Empty when `id` is unknown or hidden.
#[instrument(skip_all, fields(id = %id))]
pub async fn photos_near_id(db: &Db, id: &str, limit: u32, sort_by: SortBy) -> Result<Vec<Photo>> {
    if id.trim().is_empty() {
        return Err(CatalogError::validation("id", "must not be blank"));
    }
    if limit == 0 {
        return Err(CatalogError::validation("limit", "must be greater than zero"));
    }
    let rows = db.fetch_all(&query::photos_near_id(id, limit, sort_by)).await?;
    photos_from_rows(&rows)
}

#[instrument(skip_all, fields(id = %id))]
pub async fn get_photo(db: &Db, id: &str) -> Result<Option<Photo>> {
    let row = db.fetch_optional(&query::photo_by_id(id)).await?;
    Ok(row.as_ref().map(photo_from_row).transpose()?)
}

#[instrument(skip_all)]
pub async fn count_photos(db: &Db, query: &PhotoQuery) -> Result<i64> {
    query.validate()?;
    let row = db.fetch_one(&query::count_photos(query)).await?;
    Ok(row.try_get::<i64, _>("count")?)
}

#[instrument(skip_all)]
pub async fn date_range(db: &Db, query: &PhotoQuery) -> Result<DateRange> {
    query.validate()?;
    let row = db.fetch_one(&query::date_range(query)).await?;
    Ok(DateRange {
        start: row.try_get("range_start")?,
        end: row.try_get("range_end")?,
    })
}

pub async fn photos_count(db: &Db) -> Result<i64> {
    count_photos(db, &PhotoQuery::new()).await
}

pub async fn photos_count_including_hidden(db: &Db) -> Result<i64> {
    count_photos(db, &PhotoQuery::new().include_hidden()).await
}

pub async fn photos_date_range(db: &Db) -> Result<DateRange> {
    date_range(db, &PhotoQuery::new()).await
}

pub async fn tag_count(db: &Db, tag: &str) -> Result<i64> {
    count_photos(db, &PhotoQuery::new().tag(tag)).await
}

pub async fn tag_date_range(db: &Db, tag: &str) -> Result<DateRange> {
    date_range(db, &PhotoQuery::new().tag(tag)).await
}

pub async fn camera_count(db: &Db, camera: &Camera) -> Result<i64> {
    count_photos(db, &PhotoQuery::new().camera(camera.clone())).await
}

pub async fn camera_date_range(db: &Db, camera: &Camera) -> Result<DateRange> {
    date_range(db, &PhotoQuery::new().camera(camera.clone())).await
}

pub async fn film_simulation_count(db: &Db, simulation: FilmSimulation) -> Result<i64> {
    count_photos(db, &PhotoQuery::new().simulation(simulation)).await
}

pub async fn film_simulation_date_range(db: &Db, simulation: FilmSimulation) -> Result<DateRange> {
    date_range(db, &PhotoQuery::new().simulation(simulation)).await
}

#[instrument(skip_all)]
async fn tag_counts(db: &Db, include_hidden: bool) -> Result<Vec<TagCount>> {
    let rows = db.fetch_all(&query::unique_tags(include_hidden)).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(TagCount {
            tag: row.try_get("tag")?,
            count: row.try_get("count")?,
        });
    }
    Ok(out)
}

pub async fn unique_tags(db: &Db) -> Result<Vec<TagCount>> {
    tag_counts(db, false).await
}

pub async fn unique_tags_including_hidden(db: &Db) -> Result<Vec<TagCount>> {
    tag_counts(db, true).await
}

#[instrument(skip_all)]
async fn camera_counts(db: &Db, include_hidden: bool) -> Result<Vec<CameraCount>> {
    let rows = db.fetch_all(&query::unique_cameras(include_hidden)).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let camera = Camera::new(row.try_get::<String, _>("make")?, row.try_get::<String, _>("model")?);
        out.push(CameraCount {
            camera_key: camera.key(),
            camera,
            count: row.try_get("count")?,
        });
    }
    Ok(out)
}

pub async fn unique_cameras(db: &Db) -> Result<Vec<CameraCount>> {
    camera_counts(db, false).await
}

pub async fn unique_cameras_including_hidden(db: &Db) -> Result<Vec<CameraCount>> {
    camera_counts(db, true).await
}

#[instrument(skip_all)]
async fn film_simulation_counts(db: &Db, include_hidden: bool) -> Result<Vec<FilmSimulationCount>> {
    let rows = db.fetch_all(&query::unique_film_simulations(include_hidden)).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let raw: String = row.try_get("film_simulation")?;
        match FilmSimulation::parse(&raw) {
            Some(simulation) => out.push(FilmSimulationCount {
                simulation,
                count: row.try_get("count")?,
            }),
            None => warn!(value = %raw, "skipping unknown film simulation"),
        }
    }
    Ok(out)
}

pub async fn unique_film_simulations(db: &Db) -> Result<Vec<FilmSimulationCount>> {
    film_simulation_counts(db, false).await
}

pub async fn unique_film_simulations_including_hidden(db: &Db) -> Result<Vec<FilmSimulationCount>> {
    film_simulation_counts(db, true).await
}

#[instrument(skip_all, fields(id = %record.id))]
pub async fn insert_photo(db: &Db, record: &PhotoRecord) -> Result<()> {
    db.execute(&record.insert_statement()).await?;
    Ok(())
}

/// Full replace of the editable columns. Returns the number of rows updated.
#[instrument(skip_all, fields(id = %record.id))]
pub async fn update_photo(db: &Db, record: &PhotoRecord) -> Result<u64> {
    Ok(db.execute(&record.update_statement(chrono::Utc::now())).await?)
}

#[instrument(skip_all, fields(id = %id))]
pub async fn delete_photo(db: &Db, id: &str) -> Result<u64> {
    Ok(db.execute(&query::delete_photo(id)).await?)
}

#[instrument(skip_all, fields(tag = %tag))]
pub async fn delete_tag_globally(db: &Db, tag: &str) -> Result<u64> {
    Ok(db.execute(&query::delete_tag_globally(tag)).await?)
}

#[instrument(skip_all, fields(tag = %tag, updated = %updated))]
pub async fn rename_tag_globally(db: &Db, tag: &str, updated: &str) -> Result<u64> {
    Ok(db.execute(&query::rename_tag_globally(tag, updated)).await?)
}
