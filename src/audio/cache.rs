//! Модуль для кэширования результатов синтеза
//!
//! Повторный запуск задания с той же конфигурацией дает те же фрагменты,
//! поэтому уже синтезированное аудио можно взять из кэша и не занимать
//! движок повторно.

use std::fs;
use std::path::PathBuf;

use crate::audio::synthesis::SynthesizedAudio;
use crate::audio::wav::{read_wav, write_wav_atomic, WavEncoding};
use crate::error::Result;
use crate::voice::VoiceDirective;

/// Структура для управления кэшем
#[derive(Debug, Clone)]
pub struct SynthesisCache {
    /// Директория для кэша
    cache_dir: PathBuf,
    /// Максимальный размер кэша в байтах
    max_size: Option<u64>,
}

impl SynthesisCache {
    /// Создать кэш, при необходимости создав директорию
    pub fn new(cache_dir: PathBuf, max_size: Option<u64>) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }
        Ok(Self {
            cache_dir,
            max_size,
        })
    }

    /// Получить аудио из кэша
    pub fn get(&self, text: &str, directive: &VoiceDirective) -> Option<SynthesizedAudio> {
        let path = self.entry_path(text, directive);
        if !path.exists() {
            return None;
        }
        match read_wav(&path) {
            Ok((samples, sample_rate)) => Some(SynthesizedAudio::new(samples, sample_rate)),
            Err(e) => {
                log::warn!("Dropping unreadable cache entry {}: {}", path.display(), e);
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Добавить аудио в кэш
    pub fn put(&self, text: &str, directive: &VoiceDirective, audio: &SynthesizedAudio) -> Result<()> {
        let path = self.entry_path(text, directive);
        write_wav_atomic(&path, &audio.samples, audio.sample_rate, WavEncoding::Float32)?;
        self.check_cache_size()
    }

    /// Очистить кэш
    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    fn entry_path(&self, text: &str, directive: &VoiceDirective) -> PathBuf {
        let mut hasher = md5::Context::new();
        hasher.consume(text.as_bytes());
        hasher.consume(b"\0");
        hasher.consume(directive.cache_key().as_bytes());
        self.cache_dir.join(format!("{:x}.wav", hasher.compute()))
    }

    /// Удаляет самые старые файлы, если кэш превысил лимит
    fn check_cache_size(&self) -> Result<()> {
        let Some(max_size) = self.max_size else {
            return Ok(());
        };

        let mut total_size = 0;
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let metadata = entry.metadata()?;
                total_size += metadata.len();
                files.push((entry.path(), metadata.len(), metadata.modified()?));
            }
        }

        if total_size <= max_size {
            return Ok(());
        }

        // От старых к новым
        files.sort_by(|a, b| a.2.cmp(&b.2));
        for (path, len, _) in files {
            if total_size <= max_size {
                break;
            }
            fs::remove_file(&path)?;
            total_size -= len;
            log::debug!("Evicted cache entry {}", path.display());
        }
        Ok(())
    }
}
