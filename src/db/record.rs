//! Row <-> domain mapping for the `photos` relation.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, Type};

use super::query::Statement;
use crate::model::{
    format_instant, parse_instant, parse_naive, round_aspect_ratio, CaptureTime, FilmSimulation,
    Photo, DEFAULT_ASPECT_RATIO,
};

/// Insert/update representation: every editable column of a photo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: String,
    pub url: String,
    pub extension: String,
    pub aspect_ratio: f64,
    pub blur_data: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub focal_length: Option<i64>,
    pub focal_length_in_35mm: Option<i64>,
    pub f_number: Option<f64>,
    pub iso: Option<i64>,
    pub exposure_time: Option<f64>,
    pub exposure_compensation: Option<f64>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub film_simulation: Option<FilmSimulation>,
    pub priority_order: Option<f64>,
    pub hidden: bool,
    pub taken: CaptureTime,
}

impl From<&Photo> for PhotoRecord {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id.clone(),
            url: photo.url.clone(),
            extension: photo.extension.clone(),
            aspect_ratio: photo.aspect_ratio,
            blur_data: photo.blur_data.clone(),
            title: photo.title.clone(),
            tags: photo.tags.clone(),
            make: photo.make.clone(),
            model: photo.model.clone(),
            focal_length: photo.focal_length,
            focal_length_in_35mm: photo.focal_length_in_35mm,
            f_number: photo.f_number,
            iso: photo.iso,
            exposure_time: photo.exposure_time,
            exposure_compensation: photo.exposure_compensation,
            location_name: photo.location_name.clone(),
            latitude: photo.latitude,
            longitude: photo.longitude,
            film_simulation: photo.film_simulation,
            priority_order: photo.priority_order,
            hidden: photo.hidden,
            taken: photo.taken,
        }
    }
}

const EDITABLE_COLUMNS: [&str; 22] = [
    "url",
    "extension",
    "aspect_ratio",
    "blur_data",
    "title",
    "tags",
    "make",
    "model",
    "focal_length",
    "focal_length_in_35mm_format",
    "f_number",
    "iso",
    "exposure_time",
    "exposure_compensation",
    "location_name",
    "latitude",
    "longitude",
    "film_simulation",
    "priority_order",
    "hidden",
    "taken_at",
    "taken_at_naive",
];

impl PhotoRecord {
    fn bind_editable(&self, stmt: Statement) -> Statement {
        stmt.bind(self.url.as_str())
            .bind(self.extension.as_str())
            .bind(round_aspect_ratio(self.aspect_ratio))
            .bind(self.blur_data.clone())
            .bind(self.title.clone())
            .bind(encode_tags(&self.tags))
            .bind(self.make.clone())
            .bind(self.model.clone())
            .bind(self.focal_length)
            .bind(self.focal_length_in_35mm)
            .bind(self.f_number)
            .bind(self.iso)
            .bind(self.exposure_time)
            .bind(self.exposure_compensation)
            .bind(self.location_name.clone())
            .bind(self.latitude)
            .bind(self.longitude)
            .bind(self.film_simulation.map(|s| s.as_str()))
            .bind(self.priority_order)
            .bind(self.hidden)
            .bind(self.taken.at_string())
            .bind(self.taken.naive_string())
    }

    pub fn insert_statement(&self) -> Statement {
        let placeholders = vec!["?"; EDITABLE_COLUMNS.len() + 1].join(", ");
        let sql = format!(
            "INSERT INTO photos (id, {}) VALUES ({})",
            EDITABLE_COLUMNS.join(", "),
            placeholders
        );
        self.bind_editable(Statement::new(sql).bind(self.id.as_str()))
    }

    /// Full replace of every editable column; `updated_at` set to `now`.
    pub fn update_statement(&self, now: DateTime<Utc>) -> Statement {
        let assignments = EDITABLE_COLUMNS
            .iter()
            .map(|col| format!("{col} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE photos SET {assignments}, updated_at = ? WHERE id = ?");
        self.bind_editable(Statement::new(sql))
            .bind(format_instant(&now))
            .bind(self.id.as_str())
    }
}

/// Tags are stored as a JSON array; an empty sequence is stored as NULL.
pub fn encode_tags(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        None
    } else {
        serde_json::to_string(tags).ok()
    }
}

pub fn decode_tags(raw: Option<&str>) -> Result<Vec<String>, serde_json::Error> {
    match raw.map(str::trim) {
        None | Some("") => Ok(Vec::new()),
        Some(s) => serde_json::from_str(s),
    }
}

fn decode_error(column: &str, message: impl Into<String>) -> sqlx::Error {
    let message: String = message.into();
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

/// Read a numeric column, tolerating numbers stored as text; NULL and
/// empty strings are absent.
fn optional_number<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr + for<'r> Decode<'r, Sqlite> + Type<Sqlite>,
{
    match row.try_get::<Option<T>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnDecode { .. }) => {
            let raw: Option<String> = row.try_get(column)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(s) => s
                    .parse()
                    .map(Some)
                    .map_err(|_| decode_error(column, format!("not a number: {s}"))),
            }
        }
        Err(err) => Err(err),
    }
}

fn optional_text(row: &SqliteRow, column: &str) -> Result<Option<String>, sqlx::Error> {
    let value: Option<String> = row.try_get(column)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn instant(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    parse_instant(&raw).ok_or_else(|| decode_error(column, format!("invalid timestamp: {raw}")))
}

pub fn photo_from_row(row: &SqliteRow) -> Result<Photo, sqlx::Error> {
    let tags_raw: Option<String> = row.try_get("tags")?;
    let tags = decode_tags(tags_raw.as_deref()).map_err(|e| decode_error("tags", e.to_string()))?;

    let film_simulation = optional_text(row, "film_simulation")?
        .map(|s| {
            FilmSimulation::parse(&s)
                .ok_or_else(|| decode_error("film_simulation", format!("unknown simulation: {s}")))
        })
        .transpose()?;

    let taken_at = instant(row, "taken_at")?;
    let naive_raw: String = row.try_get("taken_at_naive")?;
    let taken_at_naive = parse_naive(&naive_raw)
        .ok_or_else(|| decode_error("taken_at_naive", format!("invalid timestamp: {naive_raw}")))?;
    let taken = CaptureTime::new(taken_at, taken_at_naive)
        .map_err(|e| decode_error("taken_at_naive", e.to_string()))?;

    Ok(Photo {
        id: row.try_get("id")?,
        url: row.try_get("url")?,
        extension: row.try_get("extension")?,
        aspect_ratio: round_aspect_ratio(
            optional_number::<f64>(row, "aspect_ratio")?.unwrap_or(DEFAULT_ASPECT_RATIO),
        ),
        blur_data: optional_text(row, "blur_data")?,
        title: optional_text(row, "title")?,
        tags,
        make: optional_text(row, "make")?,
        model: optional_text(row, "model")?,
        focal_length: optional_number(row, "focal_length")?,
        focal_length_in_35mm: optional_number(row, "focal_length_in_35mm_format")?,
        f_number: optional_number(row, "f_number")?,
        iso: optional_number(row, "iso")?,
        exposure_time: optional_number(row, "exposure_time")?,
        exposure_compensation: optional_number(row, "exposure_compensation")?,
        location_name: optional_text(row, "location_name")?,
        latitude: optional_number(row, "latitude")?,
        longitude: optional_number(row, "longitude")?,
        film_simulation,
        priority_order: optional_number(row, "priority_order")?,
        taken,
        hidden: row.try_get::<Option<bool>, _>("hidden")?.unwrap_or(false),
        created_at: instant(row, "created_at")?,
        updated_at: instant(row, "updated_at")?,
    })
}
