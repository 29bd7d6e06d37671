//! Модуль для работы с субтитрами
//!
//! Построение реплик по записям времени склейки, запись SRT/WebVTT/ASS
//! и чтение SRT/WebVTT.

pub mod parser;
pub mod types;
pub mod writer;

pub use parser::{parse_srt, parse_subtitle_file, parse_vtt};
pub use types::{SubtitleCue, SubtitleStyle};
pub use writer::{cues_from_timings, render};
