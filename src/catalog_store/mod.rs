mod models;
mod schema;
mod slug;
mod sqlite_catalog_store;
mod trait_def;

pub use models::*;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use slug::{external_id_slug, slugify, MAX_SLUG_LEN};
pub use sqlite_catalog_store::SqliteGameCatalog;
pub use trait_def::GameCatalog;
