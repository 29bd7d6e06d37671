//! Модуль для отслеживания прогресса заданий
//!
//! Этот модуль предоставляет реализацию паттерна Observer: хранилище заданий
//! публикует событие при каждом изменении задания (смена состояния, новый
//! фрагмент, строка журнала), а наблюдатели получают его синхронно или через
//! канал Tokio.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::model::{Job, JobState};

/// Событие задания
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub state: JobState,
    /// Готовых фрагментов
    pub completed: usize,
    /// Всего фрагментов
    pub total: usize,
    /// Строка журнала, если событие ее добавило
    pub message: Option<String>,
    /// Номер изменения в хранилище. Присваивается под мьютексом хранилища,
    /// поэтому упорядочивает события, даже если потоки доставили их вразнобой.
    #[serde(default)]
    pub sequence: u64,
}

impl JobEvent {
    pub fn from_job(job: &Job, message: Option<String>) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            completed: job.progress.completed,
            total: job.progress.total,
            message,
            sequence: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Процент выполнения (0.0 - 100.0)
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            return if self.state == JobState::Completed { 100.0 } else { 0.0 };
        }
        (self.completed as f32 / self.total as f32 * 100.0).clamp(0.0, 100.0)
    }
}

/// Трейт для наблюдателя, получающего события заданий
pub trait ProgressObserver: Send + Sync {
    /// Метод, вызываемый при каждом событии
    fn on_job_event(&self, event: JobEvent);
}

/// Трейт для объекта, рассылающего события наблюдателям
pub trait ProgressReporter: Send + Sync {
    /// Добавить наблюдателя
    ///
    /// Возвращает идентификатор, по которому наблюдателя можно удалить.
    fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Удалить наблюдателя по идентификатору
    fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Уведомить всех наблюдателей
    fn notify(&self, event: JobEvent);
}

/// Синхронная рассылка событий зарегистрированным наблюдателям
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.observers.write().insert(id, observer);
        id
    }

    fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.observers.write().remove(&id)
    }

    fn notify(&self, event: JobEvent) {
        for observer in self.observers.read().values() {
            observer.on_job_event(event.clone());
        }
    }
}

/// Репортер, дополнительно публикующий события в широковещательный канал Tokio
pub struct BroadcastProgressReporter {
    tx: broadcast::Sender<JobEvent>,
    inner: DefaultProgressReporter,
}

impl BroadcastProgressReporter {
    /// Создать репортер с буфером канала на `capacity` событий
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            inner: DefaultProgressReporter::new(),
        }
    }

    /// Подписаться на события
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastProgressReporter {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressReporter for BroadcastProgressReporter {
    fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        self.inner.add_observer(observer)
    }

    fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.inner.remove_observer(id)
    }

    fn notify(&self, event: JobEvent) {
        self.inner.notify(event.clone());
        // Ошибка означает только отсутствие подписчиков
        if self.tx.send(event).is_err() {
            log::trace!("No subscribers for job event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::job::model::JobSpec;

    struct TestObserver {
        events: Arc<Mutex<Vec<JobEvent>>>,
    }

    impl ProgressObserver for TestObserver {
        fn on_job_event(&self, event: JobEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn event(completed: usize, total: usize) -> JobEvent {
        let mut job = Job::new(JobSpec::new("Book", Vec::new()));
        job.state = JobState::Running;
        job.progress.completed = completed;
        job.progress.total = total;
        JobEvent::from_job(&job, None)
    }

    #[test]
    fn test_default_reporter_add_remove() {
        let reporter = DefaultProgressReporter::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let id = reporter.add_observer(Box::new(TestObserver { events: events.clone() }));

        reporter.notify(event(1, 4));
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(events.lock().unwrap()[0].percent(), 25.0);

        assert!(reporter.remove_observer(id).is_some());
        reporter.notify(event(2, 4));
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(reporter.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reporter_delivers_to_subscribers() {
        let reporter = BroadcastProgressReporter::new(8);
        let mut rx = reporter.subscribe();

        reporter.notify(event(1, 3));
        reporter.notify(event(2, 3));

        assert_eq!(rx.recv().await.unwrap().completed, 1);
        assert_eq!(rx.recv().await.unwrap().completed, 2);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_harmless() {
        let reporter = BroadcastProgressReporter::default();
        reporter.notify(event(0, 1));
    }

    #[test]
    fn test_percent_for_empty_job() {
        let mut e = event(0, 0);
        assert_eq!(e.percent(), 0.0);
        e.state = JobState::Completed;
        assert_eq!(e.percent(), 100.0);
    }
}
