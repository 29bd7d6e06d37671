//! Основной файл библиотеки tts-book
//!
//! Библиотека превращает длинные документы (книги, статьи) в озвученное аудио
//! с синхронизированными субтитрами. Задания ставятся в очередь, фоновый
//! обработчик выполняет их по одному, а ход выполнения доступен через запросы
//! статуса и подписку на события.

pub mod artifacts;
pub mod audio;
pub mod config;
pub mod error;
pub mod job;
pub mod logger;
pub mod notification;
pub mod pipeline;
pub mod progress;
pub mod status;
pub mod subtitle;
pub mod text;
pub mod utils;
pub mod voice;
pub mod worker;

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use uuid::Uuid;

pub use crate::audio::{SpeechSynthesizer, SynthesizedAudio, ToneSynthesizer};
pub use crate::config::{AudioFormat, SubtitleFormat, TtsBookConfig};
pub use crate::error::{Result, TtsBookError};
pub use crate::job::{
    ChapterInput, ChapterOverride, JobDefaults, JobSpec, JobState, JobStatus, Progress,
};
pub use crate::progress::{JobEvent, ProgressObserver, ProgressReporter};
pub use crate::status::StatusReporter;
pub use crate::subtitle::SubtitleStyle;
pub use crate::text::Granularity;
pub use crate::voice::{VoiceCatalog, VoiceSpec};

use crate::audio::SynthesisCache;
use crate::job::{JobPersistence, JobStore, JsonDirPersistence};
use crate::notification::LogProgressObserver;
use crate::progress::BroadcastProgressReporter;
use crate::status::parse_job_id;
use crate::text::SpeakerTagger;
use crate::voice::VoiceResolver;
use crate::worker::{Worker, WorkerHandle};

/// Основная структура для работы с библиотекой
pub struct TtsBook {
    config: Arc<TtsBookConfig>,
    store: Arc<JobStore>,
    status: StatusReporter,
    events: Arc<BroadcastProgressReporter>,
    worker: Option<WorkerHandle>,
}

impl TtsBook {
    /// Создать экземпляр с хранением заданий в `config.data_dir`
    /// и каталогом голосов Kokoro
    pub fn new(config: TtsBookConfig, synthesizer: Box<dyn SpeechSynthesizer>) -> Result<Self> {
        Self::builder(config).synthesizer(synthesizer).build()
    }

    pub fn builder(config: TtsBookConfig) -> TtsBookBuilder {
        TtsBookBuilder::new(config)
    }

    pub fn config(&self) -> &TtsBookConfig {
        &self.config
    }

    /// Поставить задание в очередь.
    ///
    /// Синтаксически неверная формула голоса отклоняется сразу.
    pub fn submit(&self, spec: JobSpec) -> Result<Uuid> {
        pipeline::check_formula_syntax(&spec)?;
        self.store.submit(spec)
    }

    /// Статус задания
    pub fn status(&self, id: &str) -> Result<JobStatus> {
        self.status.status(id)
    }

    /// Статус задания в виде JSON
    pub fn status_json(&self, id: &str) -> Result<String> {
        self.status.status_json(id)
    }

    /// Статусы всех заданий
    pub fn list(&self) -> Vec<JobStatus> {
        self.status.list()
    }

    /// Запросить отмену задания
    pub fn cancel(&self, id: &str) -> Result<JobStatus> {
        self.status.cancel(id)
    }

    /// Удалить задание вместе с его файлами
    pub fn delete(&self, id: &str) -> Result<()> {
        let id = parse_job_id(id)?;
        self.store.delete(id)?;

        let directory = artifacts::job_output_dir(&self.config, id);
        if directory.exists() {
            fs::remove_dir_all(&directory).map_err(|e| {
                TtsBookError::Storage(format!("Failed to remove {}: {}", directory.display(), e))
            })?;
        }
        Ok(())
    }

    /// Дождаться конечного состояния задания не дольше `timeout`.
    ///
    /// Возвращает последний известный статус, даже если время вышло.
    pub fn wait_for(&self, id: &str, timeout: Duration) -> Result<JobStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.status(id)?;
            if status.state.is_terminal() || Instant::now() >= deadline {
                return Ok(status);
            }
            std::thread::sleep(self.config.poll_interval());
        }
    }

    /// Подписаться на события заданий
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Добавить наблюдателя событий
    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> usize {
        self.events.add_observer(observer)
    }

    /// Удалить наблюдателя событий
    pub fn remove_observer(&self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        self.events.remove_observer(id)
    }

    /// Поверхность запросов статуса для других потоков
    pub fn status_reporter(&self) -> StatusReporter {
        self.status.clone()
    }

    /// Остановить обработчик. Выполняющееся задание дорабатывается.
    pub fn shutdown(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

/// Построитель `TtsBook`
pub struct TtsBookBuilder {
    config: TtsBookConfig,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    catalog: Option<VoiceCatalog>,
    persistence: Option<Box<dyn JobPersistence>>,
    tagger: Option<Arc<dyn SpeakerTagger>>,
}

impl TtsBookBuilder {
    pub fn new(config: TtsBookConfig) -> Self {
        Self {
            config,
            synthesizer: None,
            catalog: None,
            persistence: None,
            tagger: None,
        }
    }

    /// Движок синтеза (по умолчанию `ToneSynthesizer`)
    pub fn synthesizer(mut self, synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Каталог голосов (по умолчанию Kokoro)
    pub fn catalog(mut self, catalog: VoiceCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Хранилище записей (по умолчанию JSON файлы в `data_dir`)
    pub fn persistence(mut self, persistence: Box<dyn JobPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Внешний анализатор говорящих
    pub fn speaker_tagger(mut self, tagger: Arc<dyn SpeakerTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Открыть хранилище и запустить обработчик
    pub fn build(self) -> Result<TtsBook> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let persistence = match self.persistence {
            Some(persistence) => persistence,
            None => Box::new(JsonDirPersistence::new(&config.data_dir)?),
        };

        let events = Arc::new(BroadcastProgressReporter::default());
        events.add_observer(Box::new(LogProgressObserver::new()));

        let store = Arc::new(JobStore::open(persistence)?.with_reporter(events.clone()));

        let catalog = Arc::new(self.catalog.unwrap_or_else(VoiceCatalog::kokoro));
        let resolver = VoiceResolver::new(catalog, config.min_blend_total);
        let synthesizer = self
            .synthesizer
            .unwrap_or_else(|| Box::new(ToneSynthesizer::new(config.sample_rate, 160.0)));

        let mut worker = Worker::new(Arc::clone(&store), Arc::clone(&config), resolver, synthesizer);
        if config.use_cache {
            worker = worker.with_cache(SynthesisCache::new(
                config.resolved_cache_dir(),
                config.max_cache_size,
            )?);
        }
        if let Some(tagger) = self.tagger {
            worker = worker.with_tagger(tagger);
        }
        let worker = worker.spawn()?;

        log::info!("tts-book started, data in {}", config.data_dir.display());

        Ok(TtsBook {
            status: StatusReporter::new(Arc::clone(&store)),
            config,
            store,
            events,
            worker: Some(worker),
        })
    }
}
