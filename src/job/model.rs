//! Модель задания на озвучивание
//!
//! Задание описывается `JobSpec` (что озвучить и как), а его текущее
//! состояние хранится в `Job`. Наружу через запрос статуса отдается `JobStatus`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AudioFormat, SubtitleFormat};
use crate::subtitle::SubtitleStyle;
use crate::text::Granularity;

/// Состояние задания
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Конечное состояние: из него переходов нет
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Допустим ли переход в `next`
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled | Self::Failed),
            Self::Running => matches!(next, Self::Completed | Self::Failed | Self::Cancelled),
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Глава, текст которой подготовил внешний модуль извлечения
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInput {
    /// Номер главы в документе
    pub index: usize,
    pub title: String,
    pub text: String,
    /// Озвучивать ли главу
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ChapterInput {
    pub fn new(index: usize, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            title: title.into(),
            text: text.into(),
            enabled: true,
        }
    }
}

/// Настройки задания по умолчанию
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobDefaults {
    /// Формула голоса, например `af_bella*0.7+af_sky*0.3`
    pub voice: String,
    pub language: String,
    pub speed: f32,
    pub granularity: Granularity,
    pub audio_format: AudioFormat,
    pub subtitle_format: SubtitleFormat,
    pub subtitle_style: SubtitleStyle,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            voice: "af_heart".to_string(),
            language: "en-us".to_string(),
            speed: 1.0,
            granularity: Granularity::Paragraph,
            audio_format: AudioFormat::Wav,
            subtitle_format: SubtitleFormat::Srt,
            subtitle_style: SubtitleStyle::default(),
        }
    }
}

/// Переопределения для отдельной главы
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterOverride {
    pub voice: Option<String>,
    pub language: Option<String>,
    pub speed: Option<f32>,
    pub granularity: Option<Granularity>,
}

/// Запрос на озвучивание
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub title: String,
    /// Главы в порядке озвучивания
    pub chapters: Vec<ChapterInput>,
    #[serde(default)]
    pub defaults: JobDefaults,
    /// Переопределения по номеру главы
    #[serde(default)]
    pub chapter_overrides: HashMap<usize, ChapterOverride>,
    /// Голоса для меток говорящих
    #[serde(default)]
    pub speaker_voices: HashMap<String, String>,
}

impl JobSpec {
    pub fn new(title: impl Into<String>, chapters: Vec<ChapterInput>) -> Self {
        Self {
            title: title.into(),
            chapters,
            defaults: JobDefaults::default(),
            chapter_overrides: HashMap::new(),
            speaker_voices: HashMap::new(),
        }
    }

    pub fn with_defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_override(mut self, chapter_index: usize, chapter_override: ChapterOverride) -> Self {
        self.chapter_overrides.insert(chapter_index, chapter_override);
        self
    }

    pub fn with_speaker_voice(mut self, speaker: impl Into<String>, voice: impl Into<String>) -> Self {
        self.speaker_voices.insert(speaker.into(), voice.into());
        self
    }

    /// Включенные главы в порядке озвучивания
    pub fn enabled_chapters(&self) -> impl Iterator<Item = &ChapterInput> {
        self.chapters.iter().filter(|chapter| chapter.enabled)
    }
}

/// Счетчики прогресса
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Фрагмент, на котором задание упало
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChunk {
    /// Позиция фрагмента в задании, с нуля
    pub position: usize,
    pub chunk_id: String,
}

/// Готовые файлы задания
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobArtifacts {
    pub directory: PathBuf,
    pub audio: PathBuf,
    pub subtitles: Option<PathBuf>,
    pub chapters: PathBuf,
    pub timings: PathBuf,
}

/// Задание с текущим состоянием
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub spec: JobSpec,
    pub state: JobState,
    pub progress: Progress,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    #[serde(default)]
    pub failed_chunk: Option<FailedChunk>,
    #[serde(default)]
    pub cancel_requested: bool,
    #[serde(default)]
    pub artifacts: Option<JobArtifacts>,
}

impl Job {
    pub fn new(spec: JobSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            spec,
            state: JobState::Pending,
            progress: Progress::default(),
            logs: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            failed_chunk: None,
            cancel_requested: false,
            artifacts: None,
        }
    }

    /// Добавить строку в журнал задания с отметкой времени
    pub fn push_log(&mut self, message: impl AsRef<str>) {
        self.logs.push(format!(
            "[{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            message.as_ref()
        ));
    }
}

/// Ответ на запрос статуса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: Uuid,
    pub title: String,
    pub state: JobState,
    pub progress: Progress,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_chunk: Option<FailedChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<JobArtifacts>,
}

impl From<&Job> for JobStatus {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            title: job.spec.title.clone(),
            state: job.state,
            progress: job.progress,
            logs: job.logs.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error: job.error.clone(),
            failed_chunk: job.failed_chunk.clone(),
            artifacts: job.artifacts.clone(),
        }
    }
}
