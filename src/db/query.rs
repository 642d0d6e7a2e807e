//! Statement construction for catalog reads and bulk tag updates.
//!
//! Every statement is an SQL string with `?` placeholders plus the ordered
//! list of values bound to them. Values never reach the SQL text.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::Sqlite;

use crate::error::{CatalogError, Result};
use crate::model::{camera_lookup_value, format_instant, Camera, FilmSimulation, SortBy};

pub const PHOTO_DEFAULT_LIMIT: u32 = 100;

const HIDDEN_EXCLUDED: &str = "hidden IS NOT TRUE";
const TAG_MEMBER: &str = "EXISTS (SELECT 1 FROM json_each(photos.tags) WHERE json_each.value = ?)";
const CAMERA_MAKE: &str = "REPLACE(REPLACE(LOWER(make), ' ', ''), '-', '') = ?";
const CAMERA_MODEL: &str = "REPLACE(REPLACE(LOWER(model), ' ', ''), '-', '') = ?";

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Int(i64),
    Real(f64),
    Bool(bool),
    Null,
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Param::Text(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Param::Text(v.to_string())
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Param::Int(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Param::Int(v as i64)
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Param::Real(v)
    }
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Param::Bool(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Param::Null)
    }
}

/// A built statement: SQL text and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Prepare an sqlx query with all parameters bound in order.
    pub fn as_query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for param in &self.params {
            query = match param {
                Param::Text(v) => query.bind(v.as_str()),
                Param::Int(v) => query.bind(*v),
                Param::Real(v) => query.bind(*v),
                Param::Bool(v) => query.bind(*v),
                Param::Null => query.bind(None::<String>),
            };
        }
        query
    }
}

/// Fluent SELECT assembly from independently optional predicate fragments.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    select: String,
    wheres: Vec<&'static str>,
    params: Vec<Param>,
    group_by: Option<&'static str>,
    order_by: Option<&'static str>,
    page: Option<(u32, u32)>,
}

impl SelectBuilder {
    pub fn new(select: impl Into<String>) -> Self {
        Self {
            select: select.into(),
            wheres: Vec::new(),
            params: Vec::new(),
            group_by: None,
            order_by: None,
            page: None,
        }
    }

    pub fn filter(mut self, clause: &'static str) -> Self {
        self.wheres.push(clause);
        self
    }

    /// Add a predicate with one placeholder.
    pub fn filter_bind(mut self, clause: &'static str, param: impl Into<Param>) -> Self {
        self.wheres.push(clause);
        self.params.push(param.into());
        self
    }

    pub fn filter_if(self, cond: bool, clause: &'static str) -> Self {
        if cond {
            self.filter(clause)
        } else {
            self
        }
    }

    pub fn group_by(mut self, clause: &'static str) -> Self {
        self.group_by = Some(clause);
        self
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.page = Some((limit, offset));
        self
    }

    pub fn build(self) -> Statement {
        let mut sql = self.select;
        let mut params = self.params;
        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }
        if let Some(group_by) = self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some(order_by) = self.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some((limit, offset)) = self.page {
            sql.push_str(" LIMIT ? OFFSET ?");
            params.push(limit.into());
            params.push(offset.into());
        }
        Statement { sql, params }
    }
}

/// Filter, sort and pagination options for listing photos.
///
/// `taken_before` keeps rows taken *after* the instant and
/// `taken_after_inclusive` keeps rows taken at or *before* it. The names are
/// inverted relative to the comparisons; callers rely on this direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoQuery {
    pub sort_by: Option<SortBy>,
    pub limit: u32,
    pub offset: u32,
    pub tag: Option<String>,
    pub camera: Option<Camera>,
    pub simulation: Option<FilmSimulation>,
    pub taken_before: Option<DateTime<Utc>>,
    pub taken_after_inclusive: Option<DateTime<Utc>>,
    pub include_hidden: bool,
}

impl Default for PhotoQuery {
    fn default() -> Self {
        Self {
            sort_by: None,
            limit: PHOTO_DEFAULT_LIMIT,
            offset: 0,
            tag: None,
            camera: None,
            simulation: None,
            taken_before: None,
            taken_after_inclusive: None,
            include_hidden: false,
        }
    }
}

impl PhotoQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn simulation(mut self, simulation: FilmSimulation) -> Self {
        self.simulation = Some(simulation);
        self
    }

    pub fn taken_before(mut self, at: DateTime<Utc>) -> Self {
        self.taken_before = Some(at);
        self
    }

    pub fn taken_after_inclusive(mut self, at: DateTime<Utc>) -> Self {
        self.taken_after_inclusive = Some(at);
        self
    }

    pub fn include_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(CatalogError::validation("limit", "must be greater than zero"));
        }
        if matches!(&self.tag, Some(tag) if tag.trim().is_empty()) {
            return Err(CatalogError::validation("tag", "must not be blank"));
        }
        if let Some(camera) = &self.camera {
            if camera.make.trim().is_empty() {
                return Err(CatalogError::validation("make", "must not be blank"));
            }
            if camera.model.trim().is_empty() {
                return Err(CatalogError::validation("model", "must not be blank"));
            }
        }
        Ok(())
    }

    /// Append this query's predicates, in a fixed order, to `builder`.
    fn apply_filters(&self, builder: SelectBuilder) -> SelectBuilder {
        let mut b = builder.filter_if(!self.include_hidden, HIDDEN_EXCLUDED);
        if let Some(at) = &self.taken_before {
            b = b.filter_bind("taken_at > ?", format_instant(at));
        }
        if let Some(at) = &self.taken_after_inclusive {
            b = b.filter_bind("taken_at <= ?", format_instant(at));
        }
        if let Some(tag) = &self.tag {
            b = b.filter_bind(TAG_MEMBER, tag.as_str());
        }
        if let Some(camera) = &self.camera {
            b = b
                .filter_bind(CAMERA_MAKE, camera_lookup_value(&camera.make))
                .filter_bind(CAMERA_MODEL, camera_lookup_value(&camera.model));
        }
        if let Some(simulation) = &self.simulation {
            b = b.filter_bind("film_simulation = ?", simulation.as_str());
        }
        b
    }
}

pub fn order_clause(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::CreatedAt => "created_at DESC",
        SortBy::TakenAt => "taken_at DESC",
        SortBy::Priority => "priority_order ASC NULLS LAST, taken_at DESC",
    }
}

pub fn list_photos(query: &PhotoQuery, default_sort: SortBy) -> Result<Statement> {
    query.validate()?;
    let sort_by = query.sort_by.unwrap_or(default_sort);
    Ok(query
        .apply_filters(SelectBuilder::new("SELECT * FROM photos"))
        .order_by(order_clause(sort_by))
        .paginate(query.limit, query.offset)
        .build())
}

/// Window over the default ordering starting one row before `id`.
pub fn photos_near_id(id: &str, limit: u32, sort_by: SortBy) -> Statement {
    let sql = format!(
        "WITH twi AS ( \
           SELECT *, row_number() OVER (ORDER BY {order}) AS row_index \
           FROM photos WHERE {hidden} \
         ), \
         target AS (SELECT row_index FROM twi WHERE id = ?) \
         SELECT twi.* FROM twi, target \
         WHERE twi.row_index >= target.row_index - 1 \
         ORDER BY twi.row_index \
         LIMIT ?",
        order = order_clause(sort_by),
        hidden = HIDDEN_EXCLUDED,
    );
    Statement::new(sql).bind(id).bind(limit)
}

pub fn photo_by_id(id: &str) -> Statement {
    Statement::new("SELECT * FROM photos WHERE id = ? LIMIT 1").bind(id)
}

/// Count of rows matching the query's predicates; sort and page are ignored.
pub fn count_photos(query: &PhotoQuery) -> Statement {
    query
        .apply_filters(SelectBuilder::new("SELECT COUNT(*) AS count FROM photos"))
        .build()
}

pub fn date_range(query: &PhotoQuery) -> Statement {
    query
        .apply_filters(SelectBuilder::new(
            "SELECT MIN(taken_at_naive) AS range_start, MAX(taken_at_naive) AS range_end FROM photos",
        ))
        .build()
}

pub fn unique_tags(include_hidden: bool) -> Statement {
    SelectBuilder::new("SELECT t.value AS tag, COUNT(*) AS count FROM photos, json_each(photos.tags) AS t")
        .filter_if(!include_hidden, HIDDEN_EXCLUDED)
        .group_by("t.value")
        .order_by("t.value ASC")
        .build()
}

pub fn unique_cameras(include_hidden: bool) -> Statement {
    SelectBuilder::new("SELECT make, model, COUNT(*) AS count FROM photos")
        .filter_if(!include_hidden, HIDDEN_EXCLUDED)
        .filter("TRIM(make) <> ''")
        .filter("TRIM(model) <> ''")
        .group_by("make, model")
        .order_by("make || ' ' || model ASC")
        .build()
}

pub fn unique_film_simulations(include_hidden: bool) -> Statement {
    SelectBuilder::new("SELECT film_simulation, COUNT(*) AS count FROM photos")
        .filter_if(!include_hidden, HIDDEN_EXCLUDED)
        .filter("film_simulation IS NOT NULL")
        .group_by("film_simulation")
        .order_by("film_simulation ASC")
        .build()
}

pub fn delete_photo(id: &str) -> Statement {
    Statement::new("DELETE FROM photos WHERE id = ?").bind(id)
}

/// Remove `tag` from every row carrying it; an emptied array becomes NULL.
pub fn delete_tag_globally(tag: &str) -> Statement {
    Statement::new(
        "UPDATE photos \
         SET tags = NULLIF((SELECT json_group_array(value) FROM json_each(photos.tags) WHERE value <> ?), '[]') \
         WHERE EXISTS (SELECT 1 FROM json_each(photos.tags) WHERE value = ?)",
    )
    .bind(tag)
    .bind(tag)
}

/// Replace `tag` with `updated` in place, keeping each row's tag order.
pub fn rename_tag_globally(tag: &str, updated: &str) -> Statement {
    Statement::new(
        "UPDATE photos \
         SET tags = (SELECT json_group_array(CASE WHEN value = ? THEN ? ELSE value END) FROM json_each(photos.tags)) \
         WHERE EXISTS (SELECT 1 FROM json_each(photos.tags) WHERE value = ?)",
    )
    .bind(tag)
    .bind(updated)
    .bind(tag)
}
