//! Контракт движка синтеза речи
//!
//! Нейросетевая модель находится вне этой библиотеки. Обработчик видит ее
//! только через трейт [`SpeechSynthesizer`]: текст и директива на входе,
//! PCM-семплы и частота дискретизации на выходе.

use std::f32::consts::PI;
use std::time::Duration;

use crate::error::{Result, TtsBookError};
use crate::voice::VoiceDirective;

/// Результат синтеза одного фрагмента
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    /// Семплы PCM (f32, моно)
    pub samples: Vec<f32>,
    /// Частота дискретизации
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Длительность аудио
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Движок синтеза речи.
///
/// Вызов `synthesize` считается атомарным: обработчик не прерывает его и
/// проверяет отмену только между фрагментами. Движок принадлежит потоку
/// обработчика, поэтому достаточно `Send`.
pub trait SpeechSynthesizer: Send {
    fn synthesize(&mut self, text: &str, directive: &VoiceDirective) -> Result<SynthesizedAudio>;

    /// Название движка для журнала
    fn name(&self) -> &str {
        "synthesizer"
    }
}

impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Box<T> {
    fn synthesize(&mut self, text: &str, directive: &VoiceDirective) -> Result<SynthesizedAudio> {
        (**self).synthesize(text, directive)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Движок без модели: синус, длительность которого пропорциональна
/// количеству слов. Подходит для пробных прогонов и проверки таймингов.
#[derive(Debug, Clone)]
pub struct ToneSynthesizer {
    sample_rate: u32,
    words_per_minute: f32,
}

impl ToneSynthesizer {
    pub fn new(sample_rate: u32, words_per_minute: f32) -> Self {
        Self {
            sample_rate,
            words_per_minute,
        }
    }
}

impl Default for ToneSynthesizer {
    fn default() -> Self {
        Self::new(24_000, 160.0)
    }
}

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(&mut self, text: &str, directive: &VoiceDirective) -> Result<SynthesizedAudio> {
        if !(self.words_per_minute > 0.0) || directive.speed <= 0.0 {
            return Err(TtsBookError::Configuration(
                "tone synthesizer needs a positive rate".to_string(),
            ));
        }

        let words = text.split_whitespace().count() as f32;
        let seconds = words * 60.0 / self.words_per_minute / directive.speed;
        let sample_count = (seconds * self.sample_rate as f32).round() as usize;

        // Высота тона зависит от первого голоса, чтобы смеси было слышно
        let seed: u32 = directive
            .voice
            .voices()
            .first()
            .map(|voice| voice.bytes().map(u32::from).sum())
            .unwrap_or(0);
        let frequency = 180.0 + (seed % 200) as f32;

        let samples = (0..sample_count)
            .map(|i| 0.2 * (2.0 * PI * frequency * i as f32 / self.sample_rate as f32).sin())
            .collect();

        Ok(SynthesizedAudio::new(samples, self.sample_rate))
    }

    fn name(&self) -> &str {
        "tone"
    }
}
