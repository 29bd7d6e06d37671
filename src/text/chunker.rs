//! Разбиение текста главы на фрагменты для синтеза
//!
//! Фрагмент: абзац или предложение. Идентификатор фрагмента строится из
//! номера главы, гранулярности и порядкового номера, поэтому повторное
//! разбиение той же главы с той же конфигурацией дает те же идентификаторы.

use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::normalize_whitespace;
use crate::text::sentence::Segmenter;

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex = Regex::new(r"\n[ \t\r\f]*\n").expect("valid paragraph regex");
    static ref WORD: Regex = Regex::new(r"\S+").expect("valid word regex");
}

/// Максимальная длина фрагмента по умолчанию, символов
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 500;

/// Гранулярность разбиения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Paragraph,
    Sentence,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Фрагмент текста, синтезируемый отдельно
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Стабильный идентификатор `chapter{NNN}-{granularity}-{NNNNN}`
    pub id: String,
    /// Номер главы
    pub chapter_index: usize,
    /// Порядковый номер внутри главы, с нуля
    pub sequence: usize,
    /// Исходный текст фрагмента (без пробелов по краям)
    pub text: String,
    /// Метка говорящего, если ее выставил внешний анализатор
    pub speaker: Option<String>,
}

impl Chunk {
    pub fn make_id(chapter_index: usize, granularity: Granularity, sequence: usize) -> String {
        format!("chapter{:03}-{}-{:05}", chapter_index, granularity.as_str(), sequence)
    }

    /// Текст для синтеза: пробельные символы схлопнуты
    pub fn speech_text(&self) -> String {
        normalize_whitespace(&self.text)
    }
}

/// Внешний анализатор, определяющий говорящего для фрагмента
pub trait SpeakerTagger: Send + Sync {
    fn tag(&self, chapter_index: usize, text: &str) -> Option<String>;
}

/// Анализатор, который никогда не выставляет метку
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpeakers;

impl SpeakerTagger for NoSpeakers {
    fn tag(&self, _chapter_index: usize, _text: &str) -> Option<String> {
        None
    }
}

impl<F> SpeakerTagger for F
where
    F: Fn(usize, &str) -> Option<String> + Send + Sync,
{
    fn tag(&self, chapter_index: usize, text: &str) -> Option<String> {
        self(chapter_index, text)
    }
}

/// Разбиение главы на фрагменты
#[derive(Clone)]
pub struct Chunker {
    granularity: Granularity,
    max_chars: usize,
    segmenter: Segmenter,
    tagger: Arc<dyn SpeakerTagger>,
}

impl fmt::Debug for Chunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunker")
            .field("granularity", &self.granularity)
            .field("max_chars", &self.max_chars)
            .field("segmenter", &self.segmenter.name())
            .finish()
    }
}

impl Chunker {
    pub fn new(granularity: Granularity, language: &str, max_chars: usize) -> Self {
        Self {
            granularity,
            max_chars: max_chars.max(1),
            segmenter: Segmenter::for_language(language),
            tagger: Arc::new(NoSpeakers),
        }
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn SpeakerTagger>) -> Self {
        self.tagger = tagger;
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Использует ли разбиение резервную регулярку вместо токенизатора языка
    pub fn uses_fallback(&self) -> bool {
        self.segmenter.is_fallback()
    }

    /// Разбить текст главы на упорядоченные фрагменты.
    ///
    /// Пустой текст дает пустой список. Абзац длиннее `max_chars` делится
    /// по границам предложений даже в режиме абзацев.
    pub fn split(&self, chapter_index: usize, chapter_text: &str) -> Vec<Chunk> {
        let mut pieces: Vec<&str> = Vec::new();

        for paragraph in PARAGRAPH_BREAK.split(chapter_text) {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            match self.granularity {
                Granularity::Paragraph if char_len(paragraph) <= self.max_chars => {
                    pieces.push(paragraph)
                }
                Granularity::Paragraph => pieces.extend(self.pack_sentences(paragraph)),
                Granularity::Sentence => {
                    for sentence in self.segmenter.split(paragraph) {
                        let sentence = sentence.trim();
                        if sentence.is_empty() {
                            continue;
                        }
                        if char_len(sentence) > self.max_chars {
                            pieces.extend(split_words(sentence, self.max_chars));
                        } else {
                            pieces.push(sentence);
                        }
                    }
                }
            }
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(sequence, text)| Chunk {
                id: Chunk::make_id(chapter_index, self.granularity, sequence),
                chapter_index,
                sequence,
                text: text.to_string(),
                speaker: self.tagger.tag(chapter_index, text),
            })
            .collect()
    }

    /// Жадно объединяет соседние предложения, не превышая `max_chars`
    fn pack_sentences<'a>(&self, paragraph: &'a str) -> Vec<&'a str> {
        let mut pieces = Vec::new();
        let mut current: Option<(usize, usize)> = None;

        for range in self.segmenter.split_ranges(paragraph) {
            let sentence = paragraph[range.clone()].trim();
            if sentence.is_empty() {
                continue;
            }
            if char_len(sentence) > self.max_chars {
                if let Some((start, end)) = current.take() {
                    pieces.push(paragraph[start..end].trim());
                }
                pieces.extend(split_words(sentence, self.max_chars));
                continue;
            }
            current = match current {
                Some((start, _)) if char_len(paragraph[start..range.end].trim()) <= self.max_chars => {
                    Some((start, range.end))
                }
                Some((start, end)) => {
                    pieces.push(paragraph[start..end].trim());
                    Some((range.start, range.end))
                }
                None => Some((range.start, range.end)),
            };
        }

        if let Some((start, end)) = current {
            pieces.push(paragraph[start..end].trim());
        }
        pieces
    }
}

/// Разбить по одному с параметрами по умолчанию (английский, 500 символов)
pub fn split(chapter_index: usize, chapter_text: &str, granularity: Granularity) -> Vec<Chunk> {
    Chunker::new(granularity, "en-us", DEFAULT_MAX_CHUNK_CHARS).split(chapter_index, chapter_text)
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Делит слишком длинное предложение по границам слов.
/// Слово длиннее лимита остается целым.
fn split_words(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;

    for word in WORD.find_iter(text) {
        match start {
            Some(s) if char_len(&text[s..word.end()]) > max_chars => {
                pieces.push(&text[s..end]);
                start = Some(word.start());
            }
            Some(_) => {}
            None => start = Some(word.start()),
        }
        end = word.end();
    }

    if let Some(s) = start {
        pieces.push(&text[s..end]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAPTER: &str = "It was a bright cold day in April.\n\n\
        The clocks were striking thirteen.   Winston Smith slipped quickly through the doors.\n\
        \n\
        \n\
        Nobody saw him.";

    fn stripped(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_paragraph_split() {
        let chunks = split(1, CHAPTER, Granularity::Paragraph);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].id, "chapter001-paragraph-00000");
        assert_eq!(chunks[2].id, "chapter001-paragraph-00002");
        assert_eq!(chunks[2].text, "Nobody saw him.");
        assert!(chunks.iter().enumerate().all(|(i, c)| c.sequence == i));
    }

    #[test]
    fn test_sentence_split() {
        let chunks = split(7, CHAPTER, Granularity::Sentence);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "It was a bright cold day in April.",
                "The clocks were striking thirteen.",
                "Winston Smith slipped quickly through the doors.",
                "Nobody saw him.",
            ]
        );
        assert_eq!(chunks[3].id, "chapter007-sentence-00003");
    }

    #[test]
    fn test_empty_chapter_has_no_chunks() {
        assert!(split(0, "", Granularity::Paragraph).is_empty());
        assert!(split(0, "  \n\n \t\n", Granularity::Sentence).is_empty());
    }

    #[test]
    fn test_ids_are_stable() {
        let first = split(3, CHAPTER, Granularity::Sentence);
        let second = split(3, CHAPTER, Granularity::Sentence);
        assert_eq!(first, second);
    }

    #[test]
    fn test_long_paragraph_is_subdivided() {
        let sentence = "This sentence is exactly long enough to matter here. ";
        let paragraph = sentence.repeat(6);
        let chunker = Chunker::new(Granularity::Paragraph, "en-us", 120);
        let chunks = chunker.split(0, &paragraph);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 120, "{}", chunk.text);
            assert!(chunk.id.contains("-paragraph-"));
        }
        let joined: Vec<String> = chunks.iter().map(|c| c.speech_text()).collect();
        assert_eq!(joined.join(" "), normalize_whitespace(&paragraph));
    }

    #[test]
    fn test_oversized_sentence_split_at_words() {
        let long = "word ".repeat(50);
        let chunker = Chunker::new(Granularity::Sentence, "en-us", 42);
        let chunks = chunker.split(0, &long);
        assert!(chunks.len() >= 5);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 42));
        assert_eq!(stripped(&long), stripped(&chunks.iter().map(|c| c.text.as_str()).collect::<String>()));
    }

    #[test]
    fn test_concatenation_reproduces_text() {
        let samples = [
            CHAPTER,
            "Short.",
            "Dr. Who? Mr. Smith!\n\nA line\nwrapped inside a paragraph. And another one here.",
            "日本語の文です。二つ目の文！\n\n三つ目。",
        ];
        for (granularity, max) in [
            (Granularity::Paragraph, 500),
            (Granularity::Sentence, 500),
            (Granularity::Paragraph, 25),
        ] {
            for (i, text) in samples.iter().enumerate() {
                let language = if i == 3 { "ja" } else { "en-us" };
                let chunks = Chunker::new(granularity, language, max).split(0, text);
                let joined: String = chunks.iter().map(|c| c.text.as_str()).collect();
                assert_eq!(stripped(&joined), stripped(text));
                if language == "en-us" {
                    let spaced: Vec<String> = chunks.iter().map(|c| c.speech_text()).collect();
                    assert_eq!(spaced.join(" "), normalize_whitespace(text));
                }
            }
        }
    }

    #[test]
    fn test_unknown_language_uses_fallback() {
        let chunker = Chunker::new(Granularity::Sentence, "klingon", 500);
        assert!(chunker.uses_fallback());
        let chunks = chunker.split(0, "One thing. Another thing.");
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_speaker_tagger_marks_dialogue() {
        let tagger = |_: usize, text: &str| {
            if text.starts_with('"') {
                Some("dialogue".to_string())
            } else {
                None
            }
        };
        let chunker = Chunker::new(Granularity::Paragraph, "en-us", 500).with_tagger(Arc::new(tagger));
        let chunks = chunker.split(2, "He waited.\n\n\"Hello,\" she said.");
        assert_eq!(chunks[0].speaker, None);
        assert_eq!(chunks[1].speaker.as_deref(), Some("dialogue"));
    }
}
