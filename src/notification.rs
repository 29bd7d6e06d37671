//! Модуль для реализации системы уведомлений
//!
//! Конкретные наблюдатели для системы событий заданий.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::progress::{JobEvent, ProgressObserver};

/// Наблюдатель, пишущий события в журнал
#[derive(Debug, Default)]
pub struct LogProgressObserver {
    prefix: Option<String>,
}

impl LogProgressObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl ProgressObserver for LogProgressObserver {
    fn on_job_event(&self, event: JobEvent) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        log::debug!(
            "{}job {} {} {}/{} ({:.1}%){}",
            prefix,
            event.job_id,
            event.state,
            event.completed,
            event.total,
            event.percent(),
            event
                .message
                .as_deref()
                .map(|m| format!(": {}", m))
                .unwrap_or_default()
        );
    }
}

/// Наблюдатель, сохраняющий события в памяти
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<JobEvent>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Все полученные события
    pub fn history(&self) -> Vec<JobEvent> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_job_event(&self, event: JobEvent) {
        self.history.lock().push(event);
    }
}

/// Наблюдатель, отправляющий события в канал mpsc.
///
/// Вызывается из потока обработчика, поэтому не ждет места в канале:
/// при переполнении событие отбрасывается.
pub struct ChannelProgressObserver {
    sender: mpsc::Sender<JobEvent>,
}

impl ChannelProgressObserver {
    pub fn new(sender: mpsc::Sender<JobEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelProgressObserver {
    fn on_job_event(&self, event: JobEvent) {
        if let Err(e) = self.sender.try_send(event) {
            log::debug!("Dropping job event: {}", e);
        }
    }
}
