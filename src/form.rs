//! String-keyed photo form payload and its conversion to and from the domain.
//!
//! Every field travels as optional text. Empty strings count as absent;
//! numeric fields are parsed strictly and a malformed value is reported
//! against the form key it came from.

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::db::PhotoRecord;
use crate::error::{CatalogError, Result};
use crate::model::{
    generate_photo_id, parse_instant, parse_naive, round_aspect_ratio, set_favorite, CaptureTime,
    FilmSimulation, Photo, DEFAULT_ASPECT_RATIO, PHOTO_ID_LENGTH, TAG_FAVS,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoForm {
    pub id: Option<String>,
    pub url: Option<String>,
    pub extension: Option<String>,
    pub aspect_ratio: Option<String>,
    pub blur_data: Option<String>,
    pub title: Option<String>,
    /// Comma-separated; never contains the favorite sentinel.
    pub tags: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub film_simulation: Option<String>,
    pub focal_length: Option<String>,
    pub focal_length_in_35mm_format: Option<String>,
    pub f_number: Option<String>,
    pub iso: Option<String>,
    pub exposure_time: Option<String>,
    pub exposure_compensation: Option<String>,
    pub location_name: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub taken_at: Option<String>,
    pub taken_at_naive: Option<String>,
    pub priority_order: Option<String>,
    /// Virtual: adds or strips the favorite sentinel tag.
    pub favorite: Option<String>,
    pub hidden: Option<String>,
}

/// Output of the EXIF extractor for one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PhotoExif {
    pub aspect_ratio: Option<f64>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub focal_length: Option<i64>,
    pub focal_length_in_35mm_format: Option<i64>,
    pub f_number: Option<f64>,
    pub iso: Option<i64>,
    pub exposure_time: Option<f64>,
    pub exposure_compensation: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub film_simulation: Option<FilmSimulation>,
    /// `DateTimeOriginal`, local to the camera.
    pub date_time_original: Option<NaiveDateTime>,
    /// `OffsetTimeOriginal` in seconds east of UTC; UTC when the camera did
    /// not record one.
    pub offset_seconds: Option<i32>,
}

impl PhotoExif {
    pub fn offset(&self) -> FixedOffset {
        self.offset_seconds
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn text(value: &Option<String>) -> Option<String> {
    present(value).map(str::to_string)
}

fn parse_int(field: &'static str, value: &Option<String>) -> Result<Option<i64>> {
    present(value)
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| CatalogError::validation(field, format!("{s:?} is not an integer")))
        })
        .transpose()
}

fn parse_real(field: &'static str, value: &Option<String>) -> Result<Option<f64>> {
    present(value)
        .map(|s| match s.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(CatalogError::validation(field, format!("{s:?} is not a number"))),
        })
        .transpose()
}

fn is_true(value: &Option<String>) -> bool {
    present(value) == Some("true")
}

fn bool_text(value: bool) -> Option<String> {
    Some(if value { "true" } else { "false" }.to_string())
}

/// Split comma-separated tag text, dropping blanks.
pub fn parse_tags(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl PhotoForm {
    /// Fields that must be present for the form to be accepted.
    pub fn check_required(&self, blur_required: bool) -> Result<()> {
        if blur_required && present(&self.blur_data).is_none() {
            return Err(CatalogError::validation("blurData", "is required"));
        }
        if let Some(tags) = present(&self.tags) {
            if parse_tags(Some(tags)).iter().any(|t| t == TAG_FAVS) {
                return Err(CatalogError::validation(
                    "tags",
                    format!("'{TAG_FAVS}' is a reserved tag"),
                ));
            }
        }
        Ok(())
    }

    fn capture_time(&self, stamp_now: bool) -> Result<CaptureTime> {
        match (present(&self.taken_at), present(&self.taken_at_naive)) {
            (Some(at), Some(naive)) => {
                let at = parse_instant(at)
                    .ok_or_else(|| CatalogError::validation("takenAt", format!("{at:?} is not a timestamp")))?;
                let naive = parse_naive(naive).ok_or_else(|| {
                    CatalogError::validation("takenAtNaive", format!("{naive:?} is not a timestamp"))
                })?;
                CaptureTime::new(at, naive)
            }
            (None, None) if stamp_now => Ok(CaptureTime::from_local(Utc::now().naive_utc(), Utc.fix())),
            (None, None) => Err(CatalogError::validation("takenAt", "is required")),
            (Some(_), None) => Err(CatalogError::validation("takenAtNaive", "is required with takenAt")),
            (None, Some(_)) => Err(CatalogError::validation("takenAt", "is required with takenAtNaive")),
        }
    }

    /// Convert to the insert/update representation.
    ///
    /// With `generate_id` (creation), a missing id is replaced by a fresh one
    /// and a form with neither capture field is stamped with the current
    /// time. Otherwise both the id and the capture time are required.
    pub fn into_record(self, generate_id: bool) -> Result<PhotoRecord> {
        self.build(generate_id, true)
    }

    /// Creation record for a photo whose asset is about to be uploaded. The
    /// url is left empty for the caller to fill with the stored location.
    pub fn into_upload_record(self) -> Result<PhotoRecord> {
        self.build(true, false)
    }

    fn build(self, generate_id: bool, require_url: bool) -> Result<PhotoRecord> {
        self.check_required(false)?;

        let id = match (text(&self.id), generate_id) {
            (Some(id), _) => id,
            (None, true) => generate_photo_id(),
            (None, false) => return Err(CatalogError::validation("id", "is required")),
        };
        if id.len() != PHOTO_ID_LENGTH || !id.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_lowercase()) {
            return Err(CatalogError::validation(
                "id",
                format!("must be {PHOTO_ID_LENGTH} characters of 0-9a-z"),
            ));
        }

        let url = match text(&self.url) {
            Some(url) => url,
            None if !require_url => String::new(),
            None => return Err(CatalogError::validation("url", "is required")),
        };
        let extension = text(&self.extension)
            .map(|e| e.trim_start_matches('.').to_string())
            .ok_or_else(|| CatalogError::validation("extension", "is required"))?;

        let aspect_ratio = match parse_real("aspectRatio", &self.aspect_ratio)? {
            None => DEFAULT_ASPECT_RATIO,
            Some(ratio) if ratio > 0.0 => round_aspect_ratio(ratio),
            Some(_) => return Err(CatalogError::validation("aspectRatio", "must be positive")),
        };

        let film_simulation = present(&self.film_simulation)
            .map(|s| {
                FilmSimulation::parse(s)
                    .ok_or_else(|| CatalogError::validation("filmSimulation", format!("unknown simulation {s:?}")))
            })
            .transpose()?;

        let tags = set_favorite(&parse_tags(present(&self.tags)), is_true(&self.favorite));

        Ok(PhotoRecord {
            id,
            url,
            extension,
            aspect_ratio,
            blur_data: text(&self.blur_data),
            title: text(&self.title),
            tags,
            make: text(&self.make),
            model: text(&self.model),
            focal_length: parse_int("focalLength", &self.focal_length)?,
            focal_length_in_35mm: parse_int("focalLengthIn35MmFormat", &self.focal_length_in_35mm_format)?,
            f_number: parse_real("fNumber", &self.f_number)?,
            iso: parse_int("iso", &self.iso)?,
            exposure_time: parse_real("exposureTime", &self.exposure_time)?,
            exposure_compensation: parse_real("exposureCompensation", &self.exposure_compensation)?,
            location_name: text(&self.location_name),
            latitude: parse_real("latitude", &self.latitude)?,
            longitude: parse_real("longitude", &self.longitude)?,
            film_simulation,
            priority_order: parse_real("priorityOrder", &self.priority_order)?,
            hidden: is_true(&self.hidden),
            taken: self.capture_time(generate_id)?,
        })
    }

    /// Form view of a stored photo: sentinel stripped from the tag text and
    /// surfaced as the `favorite` field.
    pub fn from_photo(photo: &Photo) -> Self {
        let tags: Vec<&str> = photo
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| *t != TAG_FAVS)
            .collect();
        Self {
            id: Some(photo.id.clone()),
            url: Some(photo.url.clone()),
            extension: Some(photo.extension.clone()),
            aspect_ratio: Some(photo.aspect_ratio.to_string()),
            blur_data: photo.blur_data.clone(),
            title: photo.title.clone(),
            tags: Some(tags.join(", ")),
            make: photo.make.clone(),
            model: photo.model.clone(),
            film_simulation: photo.film_simulation.map(|s| s.as_str().to_string()),
            focal_length: photo.focal_length.map(|n| n.to_string()),
            focal_length_in_35mm_format: photo.focal_length_in_35mm.map(|n| n.to_string()),
            f_number: photo.f_number.map(|n| n.to_string()),
            iso: photo.iso.map(|n| n.to_string()),
            exposure_time: photo.exposure_time.map(|n| n.to_string()),
            exposure_compensation: photo.exposure_compensation.map(|n| n.to_string()),
            location_name: photo.location_name.clone(),
            latitude: photo.latitude.map(|n| n.to_string()),
            longitude: photo.longitude.map(|n| n.to_string()),
            taken_at: Some(photo.taken.at_string()),
            taken_at_naive: Some(photo.taken.naive_string()),
            priority_order: photo.priority_order.map(|n| n.to_string()),
            favorite: bool_text(photo.is_favorite()),
            hidden: bool_text(photo.hidden),
        }
    }

    /// Form fields derived from EXIF. Coordinates are withheld under geo privacy.
    pub fn from_exif(exif: &PhotoExif, geo_privacy: bool) -> Self {
        let taken = exif
            .date_time_original
            .map(|naive| CaptureTime::from_local(naive, exif.offset()));
        let coordinate = |value: Option<f64>| value.filter(|_| !geo_privacy).map(|n| n.to_string());
        Self {
            aspect_ratio: exif.aspect_ratio.map(|n| round_aspect_ratio(n).to_string()),
            make: exif.make.clone(),
            model: exif.model.clone(),
            film_simulation: exif.film_simulation.map(|s| s.as_str().to_string()),
            focal_length: exif.focal_length.map(|n| n.to_string()),
            focal_length_in_35mm_format: exif.focal_length_in_35mm_format.map(|n| n.to_string()),
            f_number: exif.f_number.map(|n| n.to_string()),
            iso: exif.iso.map(|n| n.to_string()),
            exposure_time: exif.exposure_time.map(|n| n.to_string()),
            exposure_compensation: exif.exposure_compensation.map(|n| n.to_string()),
            latitude: coordinate(exif.latitude),
            longitude: coordinate(exif.longitude),
            taken_at: taken.map(|t| t.at_string()),
            taken_at_naive: taken.map(|t| t.naive_string()),
            ..Self::default()
        }
    }

    /// Replace every EXIF-owned field with a fresh extraction. Fields the
    /// extraction lacks are cleared, including coordinates withheld under geo
    /// privacy. Aspect ratio and capture time are NOT NULL and keep their
    /// stored values when the extraction has none.
    pub fn with_exif(mut self, exif: &PhotoExif, geo_privacy: bool) -> Self {
        let fresh = Self::from_exif(exif, geo_privacy);
        self.make = fresh.make;
        self.model = fresh.model;
        self.film_simulation = fresh.film_simulation;
        self.focal_length = fresh.focal_length;
        self.focal_length_in_35mm_format = fresh.focal_length_in_35mm_format;
        self.f_number = fresh.f_number;
        self.iso = fresh.iso;
        self.exposure_time = fresh.exposure_time;
        self.exposure_compensation = fresh.exposure_compensation;
        self.latitude = fresh.latitude;
        self.longitude = fresh.longitude;
        if fresh.aspect_ratio.is_some() {
            self.aspect_ratio = fresh.aspect_ratio;
        }
        if fresh.taken_at.is_some() {
            self.taken_at = fresh.taken_at;
            self.taken_at_naive = fresh.taken_at_naive;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn minimal() -> PhotoForm {
        PhotoForm {
            url: Some("https://blob.example.com/upload.jpg".into()),
            extension: Some("jpg".into()),
            taken_at: Some("2024-03-09T23:30:00.000Z".into()),
            taken_at_naive: Some("2024-03-09 18:30:00".into()),
            ..PhotoForm::default()
        }
    }

    #[test]
    fn creation_generates_id_and_defaults() {
        let record = minimal().into_record(true).unwrap();
        assert_eq!(record.id.len(), PHOTO_ID_LENGTH);
        assert_eq!(record.aspect_ratio, DEFAULT_ASPECT_RATIO);
        assert!(record.tags.is_empty());
        assert!(!record.hidden);
        assert_eq!(record.focal_length, None);
    }

    #[test]
    fn update_requires_id() {
        let err = minimal().into_record(false).unwrap_err();
        assert_eq!(err.field(), Some("id"));
        let form = PhotoForm { id: Some("abc".into()), ..minimal() };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("id"));
    }

    #[test]
    fn empty_numeric_strings_are_absent_not_zero() {
        let form = PhotoForm {
            iso: Some("".into()),
            f_number: Some("  ".into()),
            priority_order: Some("0".into()),
            ..minimal()
        };
        let record = form.into_record(true).unwrap();
        assert_eq!(record.iso, None);
        assert_eq!(record.f_number, None);
        assert_eq!(record.priority_order, Some(0.0));
    }

    #[test]
    fn malformed_numbers_name_their_field() {
        let form = PhotoForm { focal_length: Some("23mm".into()), ..minimal() };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("focalLength"));
        let form = PhotoForm { aspect_ratio: Some("-1".into()), ..minimal() };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("aspectRatio"));
        let form = PhotoForm { latitude: Some("NaN".into()), ..minimal() };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("latitude"));
    }

    #[test]
    fn favorite_field_drives_sentinel() {
        let form = PhotoForm {
            tags: Some("travel, japan ,".into()),
            favorite: Some("true".into()),
            ..minimal()
        };
        let record = form.into_record(true).unwrap();
        assert_eq!(record.tags, vec!["travel", "japan", TAG_FAVS]);

        let form = PhotoForm { tags: Some("travel, favs".into()), ..minimal() };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("tags"));
    }

    #[test]
    fn capture_halves_must_agree() {
        let form = PhotoForm {
            taken_at_naive: Some("2024-03-10 18:30:00".into()),
            ..minimal()
        };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("takenAtNaive"));
        let form = PhotoForm { taken_at: None, ..minimal() };
        assert_eq!(form.into_record(true).unwrap_err().field(), Some("takenAt"));
    }

    #[test]
    fn blur_data_required_when_enabled() {
        assert_eq!(minimal().check_required(true).unwrap_err().field(), Some("blurData"));
        assert!(minimal().check_required(false).is_ok());
    }

    #[test]
    fn exif_respects_geo_privacy_and_offset() {
        let exif = PhotoExif {
            aspect_ratio: Some(1.333_333_3),
            make: Some("FUJIFILM".into()),
            latitude: Some(35.6),
            longitude: Some(139.7),
            date_time_original: NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0),
            offset_seconds: Some(9 * 3600),
            film_simulation: Some(FilmSimulation::ClassicChrome),
            ..PhotoExif::default()
        };
        let open = PhotoForm::from_exif(&exif, false);
        assert_eq!(open.latitude.as_deref(), Some("35.6"));
        assert_eq!(open.taken_at.as_deref(), Some("2023-05-01T01:00:00.000Z"));
        assert_eq!(open.taken_at_naive.as_deref(), Some("2023-05-01 10:00:00"));
        assert_eq!(open.aspect_ratio.as_deref(), Some("1.333333"));
        assert_eq!(open.film_simulation.as_deref(), Some("classic-chrome"));

        let private = PhotoForm::from_exif(&exif, true);
        assert_eq!(private.latitude, None);
        assert_eq!(private.longitude, None);
    }

    #[test]
    fn exif_replaces_owned_fields_and_clears_missing_ones() {
        let stored = PhotoForm {
            title: Some("Dusk".into()),
            make: Some("Canon".into()),
            iso: Some("800".into()),
            latitude: Some("35.6".into()),
            longitude: Some("139.7".into()),
            aspect_ratio: Some("1.5".into()),
            ..minimal()
        };
        let exif = PhotoExif {
            make: Some("FUJIFILM".into()),
            latitude: Some(1.0),
            longitude: Some(2.0),
            ..PhotoExif::default()
        };
        let synced = stored.with_exif(&exif, true);
        assert_eq!(synced.title.as_deref(), Some("Dusk"));
        assert_eq!(synced.make.as_deref(), Some("FUJIFILM"));
        assert_eq!(synced.iso, None);
        assert_eq!(synced.latitude, None);
        assert_eq!(synced.longitude, None);
        assert_eq!(synced.aspect_ratio.as_deref(), Some("1.5"));
        assert_eq!(synced.taken_at_naive.as_deref(), Some("2024-03-09 18:30:00"));
    }

    #[test]
    fn missing_capture_time_is_stamped_only_on_creation() {
        let form = PhotoForm {
            id: Some("abcd1234".into()),
            taken_at: None,
            taken_at_naive: None,
            ..minimal()
        };
        assert!(form.clone().into_record(true).is_ok());
        assert_eq!(form.into_record(false).unwrap_err().field(), Some("takenAt"));
    }

    #[test]
    fn upload_record_leaves_url_for_the_uploader() {
        let form = PhotoForm { url: None, ..minimal() };
        assert_eq!(form.clone().into_record(true).unwrap_err().field(), Some("url"));
        let record = form.into_upload_record().unwrap();
        assert!(record.url.is_empty());
        assert_eq!(record.id.len(), PHOTO_ID_LENGTH);
    }

    #[test]
    fn exif_payload_serde_round_trip() {
        let exif = PhotoExif {
            make: Some("FUJIFILM".into()),
            iso: Some(400),
            film_simulation: Some(FilmSimulation::Acros),
            date_time_original: NaiveDate::from_ymd_opt(2024, 2, 2)
                .unwrap()
                .and_hms_opt(8, 15, 0),
            offset_seconds: Some(-3 * 3600),
            ..PhotoExif::default()
        };
        let json = serde_json::to_value(&exif).unwrap();
        assert_eq!(json["offsetSeconds"], -10800);
        let back: PhotoExif = serde_json::from_value(json).unwrap();
        assert_eq!(back, exif);
        assert_eq!(back.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(PhotoExif::default().offset().local_minus_utc(), 0);
    }
}
