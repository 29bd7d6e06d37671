//! Модуль для работы с аудио
//!
//! Контракт движка синтеза, склейка фрагментов с учетом времени,
//! WAV-кодирование и кэш синтеза.

pub mod assembler;
pub mod cache;
pub mod synthesis;
pub mod wav;

pub use assembler::{AssembledAudio, TimingAssembler, TimingRecord};
pub use cache::SynthesisCache;
pub use synthesis::{SpeechSynthesizer, SynthesizedAudio, ToneSynthesizer};
