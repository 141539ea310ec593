use std::{
    future::Future,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OnceCell;

use crate::upstream::Product;

/// Single-flight memoised value.
///
/// Concurrent callers of [`Memo::get_or_try_init`] share one initialisation;
/// a failed initialisation is not cached.
pub struct Memo<T> {
    cell: Mutex<Arc<OnceCell<T>>>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self {
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }
}

impl<T: Clone> Memo<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<OnceCell<T>> {
        self.cell
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn get_or_try_init<E, F, Fut>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = self.current();
        cell.get_or_try_init(init).await.cloned()
    }

    pub fn get(&self) -> Option<T> {
        self.current().get().cloned()
    }

    /// Drop the memoised value; the next access initialises again.
    pub fn reset(&self) {
        *self.cell.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new());
    }
}

/// Reference data fetched at most once per process.
#[derive(Default)]
pub struct ReferenceCache {
    pub token: Memo<String>,
    pub products: Memo<Vec<Product>>,
}

impl ReferenceCache {
    pub fn reset(&self) {
        self.token.reset();
        self.products.reset();
    }
}
