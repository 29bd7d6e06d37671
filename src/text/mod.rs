//! Модуль подготовки текста
//!
//! Этот модуль содержит разбиение глав на фрагменты (абзацы или предложения)
//! и токенизацию предложений для поддерживаемых языков.

pub mod chunker;
pub mod sentence;

pub use chunker::{Chunk, Chunker, Granularity, NoSpeakers, SpeakerTagger};
pub use sentence::Segmenter;

/// Схлопывает все пробельные символы в одиночные пробелы
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<&str>>().join(" ")
}
