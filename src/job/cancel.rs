//! Кооперативная отмена задания

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Флаг отмены, который проверяет обработчик между фрагментами.
///
/// Клоны разделяют один и тот же флаг.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Запросить отмену
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
