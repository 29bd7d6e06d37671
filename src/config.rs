//! Модуль конфигурации библиотеки tts-book
//!
//! Этот модуль содержит структуры и перечисления для настройки фонового
//! обработчика, хранилища заданий и выходных артефактов.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsBookError};

/// Формат выходного аудио
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// Несжатый WAV (пишется напрямую)
    #[default]
    Wav,
    /// MP3 через ffmpeg
    Mp3,
    /// FLAC через ffmpeg
    Flac,
    /// M4B (AAC) через ffmpeg, с главами
    M4b,
}

impl AudioFormat {
    /// Расширение файла
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
            Self::M4b => "m4b",
        }
    }

    /// Требуется ли перекодирование через ffmpeg
    pub fn needs_transcode(&self) -> bool {
        !matches!(self, Self::Wav)
    }
}

/// Формат субтитров
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    /// Без субтитров
    None,
    /// SubRip
    #[default]
    Srt,
    /// WebVTT
    Vtt,
    /// Advanced SubStation Alpha
    Ass,
}

impl SubtitleFormat {
    /// Расширение файла, если субтитры вообще пишутся
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Srt => Some("srt"),
            Self::Vtt => Some("vtt"),
            Self::Ass => Some("ass"),
        }
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsBookConfig {
    /// Директория для записей заданий
    pub data_dir: PathBuf,
    /// Директория для готовых артефактов
    pub output_dir: PathBuf,
    /// Интервал опроса очереди и проверки отмены, мс
    pub poll_interval_ms: u64,
    /// Максимальная длина фрагмента в символах
    pub max_chunk_chars: usize,
    /// Количество повторов синтеза фрагмента после первой неудачи
    pub synthesis_retries: u32,
    /// Начальная задержка перед повтором, мс
    pub retry_backoff_ms: u64,
    /// Минимальная сумма весов смеси голосов до нормализации
    pub min_blend_total: f32,
    /// Сколько дней хранить завершенные задания
    pub retention_days: Option<u32>,
    /// Использовать кэш синтеза
    pub use_cache: bool,
    /// Директория для кэша
    pub cache_dir: Option<PathBuf>,
    /// Максимальный размер кэша в байтах
    pub max_cache_size: Option<u64>,
    /// Частота дискретизации выходного аудио
    pub sample_rate: u32,
    /// Путь к ffmpeg
    pub ffmpeg_path: String,
}

impl Default for TtsBookConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("tts-book");
        Self {
            data_dir: base.join("jobs"),
            output_dir: base.join("output"),
            poll_interval_ms: 100,
            max_chunk_chars: 500,
            synthesis_retries: 1,
            retry_backoff_ms: 500,
            min_blend_total: 0.5,
            retention_days: Some(30),
            use_cache: true,
            cache_dir: None,
            max_cache_size: Some(1024 * 1024 * 1024), // 1 GB
            sample_rate: 24_000,
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl TtsBookConfig {
    /// Загрузить конфигурацию из JSON-файла
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Переопределить значения из переменных окружения
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(dir) = std::env::var("TTS_BOOK_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("TTS_BOOK_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(ms) = std::env::var("TTS_BOOK_POLL_MS") {
            self.poll_interval_ms = ms.trim().parse().map_err(|_| {
                TtsBookError::Configuration(format!("TTS_BOOK_POLL_MS is not a number: {}", ms))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Проверить согласованность значений
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(TtsBookError::Configuration(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_chunk_chars == 0 {
            return Err(TtsBookError::Configuration(
                "max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if !(self.min_blend_total > 0.0) {
            return Err(TtsBookError::Configuration(
                "min_blend_total must be positive".to_string(),
            ));
        }
        if self.sample_rate == 0 {
            return Err(TtsBookError::Configuration(
                "sample_rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Директория кэша синтеза
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("cache"))
    }
}
