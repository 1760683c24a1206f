//! Persistence for templates and generation jobs
//!
//! Services depend on the [`TemplateStore`] and [`GenerationStore`] traits.
//! Two backends implement them: [`MemoryStore`] and [`SqliteStore`].

pub mod connection;
pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;
pub mod sqlite;
pub mod store;

pub use connection::{DatabaseConnection, DatabasePool};
pub use error::{DatabaseError, DbResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{
    GenerationStore, JobFilter, Page, TemplateFilter, TemplateStore, DEFAULT_LIMIT, MAX_LIMIT,
};

use std::sync::Arc;

/// Both stores behind shared handles.
#[derive(Clone)]
pub struct Stores {
    pub templates: Arc<dyn TemplateStore>,
    pub generations: Arc<dyn GenerationStore>,
    /// Present for the SQLite backend
    pub connection: Option<DatabaseConnection>,
}

impl Stores {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            templates: store.clone(),
            generations: store,
            connection: None,
        }
    }

    pub fn sqlite(store: SqliteStore) -> Self {
        let connection = Some(store.connection().clone());
        let store = Arc::new(store);
        Self {
            templates: store.clone(),
            generations: store,
            connection,
        }
    }

    /// Open the backend named by a database URL: `memory` or a `sqlite:` URL.
    pub async fn open(database_url: &str) -> DbResult<Self> {
        if database_url == "memory" {
            Ok(Self::memory())
        } else {
            Ok(Self::sqlite(SqliteStore::connect(database_url).await?))
        }
    }
}
