//! Session store implementations for huddle.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use huddle_core::error::StoreError;
use huddle_core::store::SessionStore;
use std::path::Path;
use std::sync::Arc;

/// Open the store backend named in configuration (`"sqlite"` or `"memory"`).
pub async fn open(backend: &str, path: &Path) -> Result<Arc<dyn SessionStore>, StoreError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteStore::open(path).await?)),
        other => {
            let _ = path;
            Err(StoreError::Storage(format!("Unsupported store backend: {other}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_memory_backend() {
        let store = open("memory", Path::new("unused")).await.unwrap();
        assert_eq!(store.name(), "in_memory");
    }

    #[tokio::test]
    async fn open_unknown_backend_fails() {
        assert!(open("postgres", Path::new("unused")).await.is_err());
    }
}
