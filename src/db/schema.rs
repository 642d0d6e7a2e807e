//! Idempotent DDL for the `photos` relation.

pub const PHOTOS_TABLE: &str = "photos";

/// Timestamps are stored as fixed-width UTC RFC 3339 text so that text
/// order equals time order.
pub const CREATE_PHOTOS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS photos (
    id TEXT PRIMARY KEY NOT NULL CHECK (length(id) = 8),
    url TEXT NOT NULL,
    extension TEXT NOT NULL,
    aspect_ratio REAL DEFAULT 1.5,
    blur_data TEXT,
    title TEXT,
    tags TEXT CHECK (tags IS NULL OR json_valid(tags)),
    make TEXT,
    model TEXT,
    focal_length INTEGER,
    focal_length_in_35mm_format INTEGER,
    f_number REAL,
    iso INTEGER,
    exposure_time REAL,
    exposure_compensation REAL,
    location_name TEXT,
    latitude REAL,
    longitude REAL,
    film_simulation TEXT,
    priority_order REAL,
    taken_at TEXT NOT NULL,
    taken_at_naive TEXT NOT NULL,
    hidden BOOLEAN,
    updated_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    created_at TEXT DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
CREATE INDEX IF NOT EXISTS photos_taken_at_idx ON photos (taken_at);
CREATE INDEX IF NOT EXISTS photos_created_at_idx ON photos (created_at);
"#;
