//! Запросы статуса заданий
//!
//! Только чтение хранилища (плюс идемпотентный запрос отмены). Ошибки
//! конвейера сюда не пробрасываются: они видны в полях `state` и `error`.
//! Вызывающему возвращаются лишь ошибки самого запроса.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Result, TtsBookError};
use crate::job::{JobStatus, JobStore};

/// Поверхность запросов статуса
#[derive(Clone)]
pub struct StatusReporter {
    store: Arc<JobStore>,
}

impl StatusReporter {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Статус задания по строковому идентификатору
    pub fn status(&self, id: &str) -> Result<JobStatus> {
        let id = parse_job_id(id)?;
        self.store
            .snapshot(id)
            .map(|job| JobStatus::from(&job))
            .ok_or_else(|| TtsBookError::JobNotFound(id.to_string()))
    }

    /// Статус в виде JSON
    pub fn status_json(&self, id: &str) -> Result<String> {
        Ok(serde_json::to_string(&self.status(id)?)?)
    }

    /// Статусы всех заданий в порядке создания
    pub fn list(&self) -> Vec<JobStatus> {
        self.store.list().iter().map(JobStatus::from).collect()
    }

    /// Запросить отмену; для завершенного задания ничего не меняется
    pub fn cancel(&self, id: &str) -> Result<JobStatus> {
        let id = parse_job_id(id)?;
        self.store.cancel(id).map(|job| JobStatus::from(&job))
    }
}

/// Разбор идентификатора задания
pub fn parse_job_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim())
        .map_err(|e| TtsBookError::InvalidRequest(format!("bad job id '{}': {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ChapterInput, JobSpec, JobState, MemoryPersistence};

    fn reporter() -> (Arc<JobStore>, StatusReporter) {
        let store = Arc::new(JobStore::open(Box::new(MemoryPersistence::new())).unwrap());
        (Arc::clone(&store), StatusReporter::new(store))
    }

    #[test]
    fn test_bad_id_is_invalid_request() {
        let (_, reporter) = reporter();
        assert!(matches!(reporter.status("nope"), Err(TtsBookError::InvalidRequest(_))));
        assert!(matches!(reporter.cancel("nope"), Err(TtsBookError::InvalidRequest(_))));
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let (_, reporter) = reporter();
        let id = Uuid::new_v4().to_string();
        assert!(matches!(reporter.status(&id), Err(TtsBookError::JobNotFound(_))));
    }

    #[test]
    fn test_status_and_cancel() {
        let (store, reporter) = reporter();
        let id = store
            .submit(JobSpec::new("Book", vec![ChapterInput::new(0, "One", "Hi.")]))
            .unwrap()
            .to_string();

        assert_eq!(reporter.status(&id).unwrap().state, JobState::Pending);
        assert_eq!(reporter.cancel(&id).unwrap().state, JobState::Cancelled);
        assert_eq!(reporter.cancel(&id).unwrap().state, JobState::Cancelled);
        assert_eq!(reporter.list().len(), 1);

        let json: serde_json::Value = serde_json::from_str(&reporter.status_json(&id).unwrap()).unwrap();
        assert_eq!(json["state"], "cancelled");
        assert!(json.get("error").is_none());
    }
}
