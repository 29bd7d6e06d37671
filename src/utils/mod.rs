//! Вспомогательные функции: атомарная запись файлов и вызов ffmpeg.

pub mod atomic;
pub mod ffmpeg;
