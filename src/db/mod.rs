//! Database module for PostgreSQL connection and schema introspection
//!
//! Only reads `information_schema`; analytics data is never queried here.

pub mod connection;
pub mod introspect;

pub use connection::{init_pool, DbPool};
pub use introspect::{catalog_from_rows, extract_catalog, ColumnRow};
