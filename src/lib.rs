//! Data-access core for a photo catalog: parameterized queries over a
//! SQLite `photos` table, resilient execution, row mapping, form
//! conversion, storage and cache invalidation.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod form;
pub mod model;
pub mod storage;

pub use catalog::{Asset, Catalog, CatalogSettings};
pub use error::{CatalogError, Result};
