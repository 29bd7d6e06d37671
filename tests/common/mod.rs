//! Общие помощники интеграционных тестов

#![allow(dead_code)]

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tts_book::voice::VoiceDirective;
use tts_book::{
    ChapterInput, JobSpec, Result, SpeechSynthesizer, SynthesizedAudio, TtsBook, TtsBookConfig,
    TtsBookError,
};

pub const SAMPLE_RATE: u32 = 8_000;
pub const SAMPLES_PER_CHAR: usize = 20;

/// Точка остановки: движок сообщает о входе в вызов и ждет разрешения
pub struct Gate {
    entered: mpsc::Receiver<usize>,
    release: mpsc::Sender<()>,
}

impl Gate {
    /// Дождаться, пока движок войдет в вызов; возвращает номер вызова
    pub fn wait_entered(&self) -> usize {
        self.entered
            .recv_timeout(Duration::from_secs(10))
            .expect("synthesizer never reached the gate")
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

struct GateInner {
    at_call: usize,
    entered: mpsc::Sender<usize>,
    release: mpsc::Receiver<()>,
}

/// Предсказуемый движок для тестов
pub struct ScriptedSynthesizer {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Vec<(String, usize)>,
    silent: Vec<String>,
    delay: Duration,
    gate: Option<GateInner>,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Vec::new(),
            silent: Vec::new(),
            delay: Duration::ZERO,
            gate: None,
        }
    }

    /// Общий журнал вызовов (тексты в порядке вызова)
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }

    /// Падать `times` раз подряд на текстах, содержащих `needle`
    pub fn fail_on(mut self, needle: &str, times: usize) -> Self {
        self.failures.push((needle.to_string(), times));
        self
    }

    /// Возвращать пустое аудио для текстов, содержащих `needle`
    pub fn silent_on(mut self, needle: &str) -> Self {
        self.silent.push(needle.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Остановиться в вызове номер `at_call` (с нуля) до разрешения
    pub fn with_gate(mut self, at_call: usize) -> (Self, Gate) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        self.gate = Some(GateInner {
            at_call,
            entered: entered_tx,
            release: release_rx,
        });
        (
            self,
            Gate {
                entered: entered_rx,
                release: release_tx,
            },
        )
    }
}

impl SpeechSynthesizer for ScriptedSynthesizer {
    fn synthesize(&mut self, text: &str, _directive: &VoiceDirective) -> Result<SynthesizedAudio> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(text.to_string());
            calls.len() - 1
        };

        if let Some(gate) = &self.gate {
            if gate.at_call == call {
                let _ = gate.entered.send(call);
                let _ = gate.release.recv_timeout(Duration::from_secs(10));
            }
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        for (needle, remaining) in self.failures.iter_mut() {
            if text.contains(needle.as_str()) && *remaining > 0 {
                *remaining -= 1;
                return Err(TtsBookError::Synthesis {
                    chunk_id: String::new(),
                    message: "scripted failure".to_string(),
                });
            }
        }

        if self.silent.iter().any(|needle| text.contains(needle.as_str())) {
            return Ok(SynthesizedAudio::new(Vec::new(), SAMPLE_RATE));
        }
        Ok(SynthesizedAudio::new(
            vec![0.25; text.chars().count() * SAMPLES_PER_CHAR],
            SAMPLE_RATE,
        ))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Конфигурация во временной директории
pub fn test_config(dir: &tempfile::TempDir) -> TtsBookConfig {
    TtsBookConfig {
        data_dir: dir.path().join("data"),
        output_dir: dir.path().join("output"),
        poll_interval_ms: 10,
        retry_backoff_ms: 1,
        use_cache: false,
        sample_rate: SAMPLE_RATE,
        ..TtsBookConfig::default()
    }
}

pub fn book(config: TtsBookConfig, synthesizer: ScriptedSynthesizer) -> TtsBook {
    TtsBook::new(config, Box::new(synthesizer)).expect("failed to start tts-book")
}

/// Книга из `n` глав по одному абзацу
pub fn chapters(n: usize) -> JobSpec {
    JobSpec::new(
        "Test Book",
        (0..n)
            .map(|i| ChapterInput::new(i, format!("Chapter {}", i + 1), format!("Paragraph of chapter {}.", i + 1)))
            .collect(),
    )
}

pub const WAIT: Duration = Duration::from_secs(10);
