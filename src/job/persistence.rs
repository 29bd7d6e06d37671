//! Долговременное хранение записей заданий
//!
//! Одна запись на задание. Хранилище заданий сохраняет запись после каждого
//! изменения и читает все записи при запуске процесса.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{Result, TtsBookError};
use crate::job::model::Job;
use crate::utils::atomic::write_string_atomic;

/// Хранилище записей заданий
pub trait JobPersistence: Send + Sync {
    /// Прочитать все сохраненные задания
    fn load_all(&self) -> Result<Vec<Job>>;

    /// Сохранить (перезаписать) запись задания
    fn save(&self, job: &Job) -> Result<()>;

    /// Удалить запись задания; отсутствие записи не ошибка
    fn delete(&self, id: Uuid) -> Result<()>;
}

/// Записи в виде JSON файлов `<id>.json` в одной директории
#[derive(Debug, Clone)]
pub struct JsonDirPersistence {
    dir: PathBuf,
}

impl JsonDirPersistence {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            TtsBookError::Storage(format!("Failed to create job directory {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

impl JobPersistence for JsonDirPersistence {
    fn load_all(&self) -> Result<Vec<Job>> {
        let mut jobs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(TtsBookError::from)
                .and_then(|content| serde_json::from_str::<Job>(&content).map_err(TtsBookError::from));
            match parsed {
                Ok(job) => jobs.push(job),
                Err(e) => log::warn!("Skipping unreadable job record {}: {}", path.display(), e),
            }
        }
        Ok(jobs)
    }

    fn save(&self, job: &Job) -> Result<()> {
        let content = serde_json::to_string_pretty(job)?;
        write_string_atomic(self.record_path(job.id), &content)
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        let path = self.record_path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TtsBookError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Записи в памяти. Клоны разделяют одно хранилище, что позволяет
/// имитировать перезапуск процесса в тестах.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

impl JobPersistence for MemoryPersistence {
    fn load_all(&self) -> Result<Vec<Job>> {
        Ok(self.jobs.lock().values().cloned().collect())
    }

    fn save(&self, job: &Job) -> Result<()> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.jobs.lock().remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::{ChapterInput, JobSpec, JobState};

    fn job() -> Job {
        Job::new(JobSpec::new("Book", vec![ChapterInput::new(0, "One", "Hello.")]))
    }

    #[test]
    fn test_json_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonDirPersistence::new(dir.path().join("jobs")).unwrap();

        let mut job = job();
        persistence.save(&job).unwrap();
        job.state = JobState::Running;
        persistence.save(&job).unwrap();

        let loaded = persistence.load_all().unwrap();
        assert_eq!(loaded, vec![job.clone()]);

        persistence.delete(job.id).unwrap();
        persistence.delete(job.id).unwrap();
        assert!(persistence.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_json_dir_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = JsonDirPersistence::new(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        persistence.save(&job()).unwrap();
        assert_eq!(persistence.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_clones_share_records() {
        let persistence = MemoryPersistence::new();
        let other = persistence.clone();
        persistence.save(&job()).unwrap();
        assert_eq!(other.len(), 1);
    }
}
