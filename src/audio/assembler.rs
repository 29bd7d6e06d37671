//! Склейка аудио фрагментов с учетом времени
//!
//! Фрагменты добавляются строго в порядке следования. Для каждого фрагмента
//! запоминается смещение начала и длительность в итоговом потоке; по этим
//! записям строятся субтитры и метки глав.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Положение фрагмента в итоговом аудио
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub chunk_id: String,
    /// Смещение начала, в семплах
    pub start_sample: u64,
    /// Длина фрагмента, в семплах
    pub sample_count: u64,
    pub sample_rate: u32,
}

impl TimingRecord {
    pub fn start(&self) -> Duration {
        samples_to_duration(self.start_sample, self.sample_rate)
    }

    pub fn duration(&self) -> Duration {
        samples_to_duration(self.sample_count, self.sample_rate)
    }

    pub fn end(&self) -> Duration {
        samples_to_duration(self.end_sample(), self.sample_rate)
    }

    pub fn end_sample(&self) -> u64 {
        self.start_sample + self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

/// Перевод количества семплов во время без накопления ошибки округления
pub fn samples_to_duration(samples: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = sample_rate as u64;
    let secs = samples / rate;
    let nanos = (samples % rate) * 1_000_000_000 / rate;
    Duration::new(secs, nanos as u32)
}

/// Итог склейки
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub records: Vec<TimingRecord>,
}

impl AssembledAudio {
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len() as u64, self.sample_rate)
    }
}

/// Сборщик аудио потока
#[derive(Debug)]
pub struct TimingAssembler {
    sample_rate: u32,
    samples: Vec<f32>,
    records: Vec<TimingRecord>,
}

impl TimingAssembler {
    /// Новый сборщик с частотой дискретизации итогового потока
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            samples: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Добавить фрагмент в конец потока.
    ///
    /// Аудио с другой частотой дискретизации приводится к частоте потока
    /// линейной интерполяцией. Фрагмент нулевой длины тоже получает запись.
    pub fn append(&mut self, chunk_id: &str, audio_samples: &[f32], sample_rate: u32) {
        let start_sample = self.samples.len() as u64;

        if sample_rate == self.sample_rate || audio_samples.is_empty() {
            self.samples.extend_from_slice(audio_samples);
        } else {
            log::debug!(
                "Resampling chunk {} from {} Hz to {} Hz",
                chunk_id,
                sample_rate,
                self.sample_rate
            );
            self.samples
                .extend(resample_linear(audio_samples, sample_rate, self.sample_rate));
        }

        let sample_count = self.samples.len() as u64 - start_sample;
        self.records.push(TimingRecord {
            chunk_id: chunk_id.to_string(),
            start_sample,
            sample_count,
            sample_rate: self.sample_rate,
        });
    }

    pub fn records(&self) -> &[TimingRecord] {
        &self.records
    }

    pub fn total_samples(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn total_duration(&self) -> Duration {
        samples_to_duration(self.total_samples(), self.sample_rate)
    }

    /// Завершить сборку: склеенный поток и записи в порядке добавления
    pub fn finalize(self) -> AssembledAudio {
        AssembledAudio {
            samples: self.samples,
            sample_rate: self.sample_rate,
            records: self.records,
        }
    }
}

/// Линейная интерполяция для смены частоты дискретизации
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == 0 || to_rate == 0 || input.is_empty() {
        return Vec::new();
    }
    let out_len = ((input.len() as u64 * to_rate as u64) / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = position.floor() as usize;
            let frac = (position - index as f64) as f32;
            let a = input[index.min(last)];
            let b = input[(index + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}
