use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Reserved tag that encodes favorite status inside the tag sequence.
pub const TAG_FAVS: &str = "favs";

pub const PHOTO_ID_LENGTH: usize = 8;
const PHOTO_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub const DEFAULT_ASPECT_RATIO: f64 = 1.5;
const ASPECT_RATIO_SCALE: f64 = 1_000_000.0;

const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_OFFSET_SECONDS: i64 = 14 * 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SortBy {
    CreatedAt,
    TakenAt,
    Priority,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::CreatedAt => "createdAt",
            SortBy::TakenAt => "takenAt",
            SortBy::Priority => "priority",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "createdAt" | "created-at" => Some(SortBy::CreatedAt),
            "takenAt" | "taken-at" => Some(SortBy::TakenAt),
            "priority" => Some(SortBy::Priority),
            _ => None,
        }
    }
}

/// Fujifilm film simulation recorded in maker notes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum FilmSimulation {
    Provia,
    Velvia,
    Astia,
    ClassicChrome,
    RealaAce,
    ProNegHi,
    ProNegStd,
    ClassicNeg,
    Eterna,
    EternaBleachBypass,
    Acros,
    AcrosYe,
    AcrosR,
    AcrosG,
    Monochrome,
    MonochromeYe,
    MonochromeR,
    MonochromeG,
    Sepia,
    NostalgicNeg,
}

impl FilmSimulation {
    pub const ALL: [FilmSimulation; 20] = [
        FilmSimulation::Provia,
        FilmSimulation::Velvia,
        FilmSimulation::Astia,
        FilmSimulation::ClassicChrome,
        FilmSimulation::RealaAce,
        FilmSimulation::ProNegHi,
        FilmSimulation::ProNegStd,
        FilmSimulation::ClassicNeg,
        FilmSimulation::Eterna,
        FilmSimulation::EternaBleachBypass,
        FilmSimulation::Acros,
        FilmSimulation::AcrosYe,
        FilmSimulation::AcrosR,
        FilmSimulation::AcrosG,
        FilmSimulation::Monochrome,
        FilmSimulation::MonochromeYe,
        FilmSimulation::MonochromeR,
        FilmSimulation::MonochromeG,
        FilmSimulation::Sepia,
        FilmSimulation::NostalgicNeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilmSimulation::Provia => "provia",
            FilmSimulation::Velvia => "velvia",
            FilmSimulation::Astia => "astia",
            FilmSimulation::ClassicChrome => "classic-chrome",
            FilmSimulation::RealaAce => "reala-ace",
            FilmSimulation::ProNegHi => "pro-neg-hi",
            FilmSimulation::ProNegStd => "pro-neg-std",
            FilmSimulation::ClassicNeg => "classic-neg",
            FilmSimulation::Eterna => "eterna",
            FilmSimulation::EternaBleachBypass => "eterna-bleach-bypass",
            FilmSimulation::Acros => "acros",
            FilmSimulation::AcrosYe => "acros-ye",
            FilmSimulation::AcrosR => "acros-r",
            FilmSimulation::AcrosG => "acros-g",
            FilmSimulation::Monochrome => "monochrome",
            FilmSimulation::MonochromeYe => "monochrome-ye",
            FilmSimulation::MonochromeR => "monochrome-r",
            FilmSimulation::MonochromeG => "monochrome-g",
            FilmSimulation::Sepia => "sepia",
            FilmSimulation::NostalgicNeg => "nostalgic-neg",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sim| sim.as_str() == s)
    }
}

/// Capture moment stored twice: as an absolute instant and as the local
/// wall-clock time at the capture location. Both halves must agree on a
/// real UTC offset, so they are only ever constructed and written together.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTime {
    at: DateTime<Utc>,
    naive: NaiveDateTime,
}

impl CaptureTime {
    pub fn new(at: DateTime<Utc>, naive: NaiveDateTime) -> Result<Self> {
        let offset = naive.trunc_subsecs(0) - at.naive_utc().trunc_subsecs(0);
        let secs = offset.num_seconds();
        if secs % 60 != 0 || secs.abs() > MAX_OFFSET_SECONDS {
            return Err(CatalogError::validation(
                "takenAtNaive",
                format!("{} does not match taken at {}", naive.format(NAIVE_FORMAT), at),
            ));
        }
        Ok(Self { at, naive })
    }

    /// Build from an EXIF-style local timestamp and the offset it was taken in.
    pub fn from_local(naive: NaiveDateTime, offset: FixedOffset) -> Self {
        let at = Utc.from_utc_datetime(&(naive - Duration::seconds(offset.local_minus_utc() as i64)));
        Self { at, naive }
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.naive
    }

    /// Wall-clock offset of the capture location.
    pub fn offset(&self) -> Option<FixedOffset> {
        let secs = (self.naive.trunc_subsecs(0) - self.at.naive_utc().trunc_subsecs(0)).num_seconds();
        FixedOffset::east_opt(secs as i32)
    }

    /// Storage form of the instant; fixed width so text order is time order.
    pub fn at_string(&self) -> String {
        format_instant(&self.at)
    }

    pub fn naive_string(&self) -> String {
        self.naive.format(NAIVE_FORMAT).to_string()
    }
}

pub fn format_instant(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y:%m:%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
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
    pub taken: CaptureTime,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Photo {
    pub fn is_favorite(&self) -> bool {
        is_favorite(&self.tags)
    }

    pub fn camera(&self) -> Option<Camera> {
        match (&self.make, &self.model) {
            (Some(make), Some(model)) => Some(Camera::new(make.clone(), model.clone())),
            _ => None,
        }
    }

    /// Storage file name for this photo's asset.
    pub fn file_name(&self) -> String {
        photo_file_name(&self.id, &self.extension)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Camera {
    pub make: String,
    pub model: String,
}

impl Camera {
    pub fn new(make: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            make: make.into(),
            model: model.into(),
        }
    }

    /// URL-safe key used for grouping and routing, e.g. `fujifilm-x100v`.
    pub fn key(&self) -> String {
        format!("{}-{}", parameterize(&self.make), parameterize(&self.model))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CameraCount {
    pub camera_key: String,
    pub camera: Camera,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilmSimulationCount {
    pub simulation: FilmSimulation,
    pub count: i64,
}

/// Count plus capture date range for one derived entity (tag, camera, simulation).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntitySummary {
    pub count: i64,
    pub date_range: DateRange,
}

pub fn is_favorite(tags: &[String]) -> bool {
    tags.iter().any(|t| t == TAG_FAVS)
}

/// Add or strip the favorite sentinel, leaving other tags in order.
pub fn set_favorite(tags: &[String], favorite: bool) -> Vec<String> {
    let mut out: Vec<String> = tags.iter().filter(|t| *t != TAG_FAVS).cloned().collect();
    if favorite {
        out.push(TAG_FAVS.to_string());
    }
    out
}

pub fn toggle_favorite(tags: &[String]) -> Vec<String> {
    set_favorite(tags, !is_favorite(tags))
}

pub fn round_aspect_ratio(value: f64) -> f64 {
    (value * ASPECT_RATIO_SCALE).round() / ASPECT_RATIO_SCALE
}

pub fn generate_photo_id() -> String {
    let mut rng = rand::rng();
    (0..PHOTO_ID_LENGTH)
        .map(|_| PHOTO_ID_ALPHABET[rng.random_range(0..PHOTO_ID_ALPHABET.len())] as char)
        .collect()
}

pub fn photo_file_name(id: &str, extension: &str) -> String {
    format!("photo-{}.{}", id, extension.trim_start_matches('.'))
}

static NON_ALPHANUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

/// Lowercase slug with runs of other characters collapsed to `-`.
pub fn parameterize(s: &str) -> String {
    let lowered = s.trim().to_lowercase();
    NON_ALPHANUMERIC
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Normalized form used when matching make/model; mirrors the SQL
/// expression `REPLACE(REPLACE(LOWER(col), ' ', ''), '-', '')`.
pub fn camera_lookup_value(s: &str) -> String {
    s.to_ascii_lowercase().replace([' ', '-'], "")
}
