use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::Result;
use super::model::Catalog;

/// Holds the current catalog. A refresh builds the replacement outside the
/// lock and swaps it in whole; readers never observe a partial scan.
#[derive(Debug, Default)]
pub struct CatalogStore {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog as of the last completed scan
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.current.read())
    }

    /// Replace the catalog, returning the previous one
    pub fn publish(&self, catalog: Catalog) -> Arc<Catalog> {
        self.swap(Arc::new(catalog))
    }

    /// Run `scan` and publish its result. Returns the catalog this call
    /// published, even if another writer has replaced it since. On error the
    /// current catalog stays.
    pub fn refresh<F>(&self, scan: F) -> Result<Arc<Catalog>>
    where
        F: FnOnce() -> Result<Catalog>,
    {
        let next = Arc::new(scan()?);
        self.swap(Arc::clone(&next));
        Ok(next)
    }

    fn swap(&self, next: Arc<Catalog>) -> Arc<Catalog> {
        info!("Published catalog with {} entries", next.len());
        std::mem::replace(&mut *self.current.write(), next)
    }
}
