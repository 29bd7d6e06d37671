//! Хранилище заданий
//!
//! Единственная структура, которую меняют несколько потоков: обработчик,
//! читатели статуса и запросы отмены. Все изменения выполняются под одним
//! коротко удерживаемым мьютексом, читатели получают согласованную копию.
//! Запись на диск идет уже после освобождения мьютекса: каждое изменение
//! получает ревизию, и более старая копия никогда не перезаписывает новую.
//! Ожидающие задания образуют очередь FIFO; обработчик ждет новую работу
//! на условной переменной с таймаутом.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::error::{Result, TtsBookError};
use crate::job::cancel::CancellationToken;
use crate::job::model::{FailedChunk, Job, JobArtifacts, JobSpec, JobState, Progress};
use crate::job::persistence::JobPersistence;
use crate::progress::{JobEvent, ProgressReporter};

const INTERRUPTED_MESSAGE: &str = "interrupted: process stopped while the job was running";

/// Ревизия удаленного задания: запоздавшие записи отбрасываются
const DELETED: u64 = u64::MAX;

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    queue: VecDeque<Uuid>,
    tokens: HashMap<Uuid, CancellationToken>,
    running: Option<Uuid>,
    revisions: HashMap<Uuid, u64>,
    sequence: u64,
}

/// Копия задания, ожидающая записи на диск
struct PendingSave {
    revision: u64,
    job: Job,
}

impl Inner {
    /// Зафиксировать изменение задания: новая ревизия записи и номер события
    fn commit(&mut self, id: Uuid, message: Option<String>) -> Result<(PendingSave, JobEvent)> {
        let job = self
            .jobs
            .get(&id)
            .ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))?;
        let revision = self.revisions.entry(id).or_insert(0);
        *revision += 1;
        self.sequence += 1;

        let event = JobEvent::from_job(job, message).with_sequence(self.sequence);
        Ok((
            PendingSave {
                revision: *revision,
                job: job.clone(),
            },
            event,
        ))
    }
}

/// Хранилище заданий
pub struct JobStore {
    inner: Mutex<Inner>,
    available: Condvar,
    persistence: Box<dyn JobPersistence>,
    /// Последняя записанная ревизия каждого задания; заодно упорядочивает
    /// записи на диск
    saved: Mutex<HashMap<Uuid, u64>>,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

impl JobStore {
    /// Открыть хранилище и восстановить записи после перезапуска.
    ///
    /// Задания в состоянии `running` помечаются как `failed`, ожидающие
    /// возвращаются в очередь в порядке создания.
    pub fn open(persistence: Box<dyn JobPersistence>) -> Result<Self> {
        let mut records = persistence.load_all()?;
        records.sort_by_key(|job| job.created_at);

        let mut inner = Inner::default();
        for mut job in records {
            match job.state {
                JobState::Running => {
                    log::warn!("Job {} was interrupted by a restart, marking failed", job.id);
                    job.state = JobState::Failed;
                    job.error = Some(INTERRUPTED_MESSAGE.to_string());
                    job.finished_at = Some(Utc::now());
                    job.push_log("Job failed: interrupted by process restart");
                    persistence.save(&job)?;
                }
                JobState::Pending => inner.queue.push_back(job.id),
                _ => {}
            }
            inner.jobs.insert(job.id, job);
        }

        log::info!(
            "Job store opened: {} jobs, {} pending",
            inner.jobs.len(),
            inner.queue.len()
        );

        Ok(Self {
            inner: Mutex::new(inner),
            available: Condvar::new(),
            persistence,
            saved: Mutex::new(HashMap::new()),
            reporter: None,
        })
    }

    /// Публиковать события заданий через `reporter`
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Поставить задание в очередь.
    ///
    /// Запись сохраняется до того, как задание станет видимым; сбой
    /// хранилища отклоняет запрос.
    pub fn submit(&self, spec: JobSpec) -> Result<Uuid> {
        let mut job = Job::new(spec);
        job.push_log(format!("Job submitted: {}", job.spec.title));
        let id = job.id;

        {
            let mut saved = self.saved.lock();
            self.persistence.save(&job)?;
            saved.insert(id, 0);
        }

        let event = {
            let mut inner = self.inner.lock();
            inner.sequence += 1;
            let event = JobEvent::from_job(&job, None).with_sequence(inner.sequence);
            inner.revisions.insert(id, 0);
            inner.jobs.insert(id, job);
            inner.queue.push_back(id);
            event
        };
        self.available.notify_one();
        self.emit(event);

        log::info!("Job {} submitted", id);
        Ok(id)
    }

    /// Согласованная копия задания
    pub fn snapshot(&self, id: Uuid) -> Option<Job> {
        self.inner.lock().jobs.get(&id).cloned()
    }

    /// Все задания в порядке создания
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.inner.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Идентификатор выполняющегося задания
    pub fn running(&self) -> Option<Uuid> {
        self.inner.lock().running
    }

    /// Количество ожидающих заданий
    pub fn pending_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Запросить отмену.
    ///
    /// Ожидающее задание сразу становится `cancelled`; для выполняющегося
    /// выставляется флаг, который обработчик проверит между фрагментами.
    /// Для завершенного задания ничего не происходит.
    pub fn cancel(&self, id: Uuid) -> Result<Job> {
        let (save, event) = {
            let mut inner = self.inner.lock();
            let Inner { jobs, queue, tokens, .. } = &mut *inner;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))?;

            let message = match job.state {
                JobState::Pending => {
                    queue.retain(|queued| *queued != id);
                    job.state = JobState::Cancelled;
                    job.cancel_requested = true;
                    job.finished_at = Some(Utc::now());
                    job.push_log("Job cancelled before start");
                    "cancelled"
                }
                JobState::Running if !job.cancel_requested => {
                    if let Some(token) = tokens.get(&id) {
                        token.cancel();
                    }
                    job.cancel_requested = true;
                    job.push_log("Cancellation requested");
                    "cancellation requested"
                }
                _ => return Ok(job.clone()),
            };
            inner.commit(id, Some(message.to_string()))?
        };

        log::info!("Job {}: {}", id, event.message.as_deref().unwrap_or(""));
        let snapshot = save.job.clone();
        self.persist(save);
        self.emit(event);
        Ok(snapshot)
    }

    /// Удалить задание. Выполняющееся задание удалить нельзя.
    pub fn delete(&self, id: Uuid) -> Result<Job> {
        let job = {
            let mut inner = self.inner.lock();
            match inner.jobs.get(&id) {
                None => return Err(TtsBookError::JobNotFound(id.to_string())),
                Some(job) if job.state == JobState::Running => {
                    return Err(TtsBookError::InvalidRequest(format!(
                        "job {} is running; cancel it first",
                        id
                    )))
                }
                Some(_) => {}
            }
            inner.queue.retain(|queued| *queued != id);
            inner.tokens.remove(&id);
            inner.revisions.remove(&id);
            inner.jobs.remove(&id)
        };

        {
            let mut saved = self.saved.lock();
            saved.insert(id, DELETED);
            self.persistence.delete(id)?;
        }
        log::info!("Job {} deleted", id);
        job.ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))
    }

    /// Удалить завершенные задания старше `older_than`
    pub fn cleanup_finished(&self, older_than: Duration) -> Result<Vec<Job>> {
        let max_age = chrono::Duration::from_std(older_than)
            .map_err(|e| TtsBookError::InvalidRequest(format!("retention too large: {}", e)))?;
        let threshold = Utc::now() - max_age;

        let expired: Vec<Uuid> = self
            .inner
            .lock()
            .jobs
            .values()
            .filter(|job| job.state.is_terminal())
            .filter(|job| job.finished_at.map(|t| t < threshold).unwrap_or(false))
            .map(|job| job.id)
            .collect();

        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            match self.delete(id) {
                Ok(job) => removed.push(job),
                Err(TtsBookError::JobNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if !removed.is_empty() {
            log::info!("Retention cleanup removed {} jobs", removed.len());
        }
        Ok(removed)
    }

    /// Дождаться следующего ожидающего задания не дольше `timeout` и
    /// извлечь его из очереди
    pub fn wait_next_pending(&self, timeout: Duration) -> Option<Uuid> {
        let mut inner = self.inner.lock();
        if inner.queue.is_empty() {
            let _ = self.available.wait_for(&mut inner, timeout);
        }
        inner.queue.pop_front()
    }

    /// Разбудить всех ожидающих (используется при остановке обработчика)
    pub fn wake_all(&self) {
        self.available.notify_all();
    }

    /// Перевести задание из очереди в `running`
    pub fn start(&self, id: Uuid) -> Result<(Job, CancellationToken)> {
        let (save, event, token) = {
            let mut inner = self.inner.lock();
            if let Some(running) = inner.running {
                return Err(TtsBookError::InvalidRequest(format!(
                    "job {} is already running",
                    running
                )));
            }
            let Inner {
                jobs,
                queue,
                tokens,
                running,
                ..
            } = &mut *inner;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))?;
            transition(job, JobState::Running)?;

            queue.retain(|queued| *queued != id);
            job.started_at = Some(Utc::now());
            job.push_log("Job started");

            let token = CancellationToken::new();
            tokens.insert(id, token.clone());
            *running = Some(id);
            let (save, event) = inner.commit(id, Some("started".to_string()))?;
            (save, event, token)
        };
        log::info!("Job {} started", id);
        let snapshot = save.job.clone();
        self.persist(save);
        self.emit(event);
        Ok((snapshot, token))
    }

    /// Запомнить общее число фрагментов
    pub fn set_total(&self, id: Uuid, total: usize) -> Result<Progress> {
        self.update(id, None, |job| {
            job.progress = Progress { completed: 0, total };
            Ok(job.progress)
        })
    }

    /// Отметить еще один готовый фрагмент
    pub fn advance(&self, id: Uuid) -> Result<Progress> {
        self.update(id, None, |job| {
            if job.progress.completed < job.progress.total {
                job.progress.completed += 1;
            }
            Ok(job.progress)
        })
    }

    /// Добавить строку в журнал задания
    pub fn log(&self, id: Uuid, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        log::info!("Job {}: {}", id, message);
        self.update(id, Some(message.clone()), |job| {
            job.push_log(&message);
            Ok(())
        })
    }

    /// Завершить задание успешно
    pub fn complete(&self, id: Uuid, artifacts: JobArtifacts) -> Result<()> {
        log::info!("Job {} completed", id);
        self.finish(id, JobState::Completed, Some("completed".to_string()), |job| {
            job.artifacts = Some(artifacts);
            job.push_log("Job completed");
        })
    }

    /// Завершить задание с ошибкой
    pub fn fail(&self, id: Uuid, error: &TtsBookError, failed_chunk: Option<FailedChunk>) -> Result<()> {
        let message = format!("{}: {}", error.kind(), error);
        log::error!("Job {} failed: {}", id, message);
        self.finish(id, JobState::Failed, Some(message.clone()), |job| {
            match &failed_chunk {
                Some(chunk) => job.push_log(format!(
                    "Job failed at chunk {} ({}): {}",
                    chunk.position, chunk.chunk_id, message
                )),
                None => job.push_log(format!("Job failed: {}", message)),
            }
            job.error = Some(message);
            job.failed_chunk = failed_chunk;
        })
    }

    /// Завершить задание по запросу отмены
    pub fn mark_cancelled(&self, id: Uuid) -> Result<()> {
        log::info!("Job {} cancelled", id);
        self.finish(id, JobState::Cancelled, Some("cancelled".to_string()), |job| {
            job.push_log("Job cancelled; partial output discarded");
        })
    }

    /// Перевести задание в конечное состояние и освободить слот обработчика
    fn finish<F>(&self, id: Uuid, state: JobState, message: Option<String>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Job),
    {
        let (save, event) = {
            let mut inner = self.inner.lock();
            let Inner { jobs, tokens, running, .. } = &mut *inner;
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))?;
            transition(job, state)?;
            f(job);
            job.finished_at = Some(Utc::now());

            tokens.remove(&id);
            if *running == Some(id) {
                *running = None;
            }
            inner.commit(id, message)?
        };
        self.persist(save);
        self.emit(event);
        Ok(())
    }

    fn update<T, F>(&self, id: Uuid, message: Option<String>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Job) -> Result<T>,
    {
        let (result, save, event) = {
            let mut inner = self.inner.lock();
            let job = inner
                .jobs
                .get_mut(&id)
                .ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))?;
            let result = f(job)?;
            let (save, event) = inner.commit(id, message)?;
            (result, save, event)
        };
        self.persist(save);
        self.emit(event);
        Ok(result)
    }

    /// Сохранение записи вне мьютекса состояния; сбой хранилища не
    /// откатывает состояние в памяти
    fn persist(&self, pending: PendingSave) {
        let id = pending.job.id;
        let mut saved = self.saved.lock();
        if saved.get(&id).is_some_and(|last| *last >= pending.revision) {
            return;
        }
        match self.persistence.save(&pending.job) {
            Ok(()) => {
                saved.insert(id, pending.revision);
            }
            Err(e) => log::error!("Failed to persist job {}: {}", id, e),
        }
    }

    fn emit(&self, event: JobEvent) {
        if let Some(reporter) = &self.reporter {
            reporter.notify(event);
        }
    }
}

fn transition(job: &mut Job, next: JobState) -> Result<()> {
    if !job.state.can_transition_to(next) {
        return Err(TtsBookError::InvalidRequest(format!(
            "job {} cannot move from {} to {}",
            job.id, job.state, next
        )));
    }
    job.state = next;
    Ok(())
}
