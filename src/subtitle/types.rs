//! Типы субтитров

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Одна реплика субтитров
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleCue {
    /// Номер реплики, с единицы
    pub index: usize,
    /// Время начала
    pub start: Duration,
    /// Время окончания
    pub end: Duration,
    /// Текст реплики
    pub text: String,
}

impl SubtitleCue {
    pub fn new(index: usize, start: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// Длительность реплики
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

/// Оформление субтитров (ASS и блок STYLE в WebVTT)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    /// Имя шрифта
    pub font_name: String,
    /// Размер шрифта
    pub font_size: u32,
    /// Основной цвет в формате `#RRGGBB`
    pub primary_color: String,
    /// Цвет обводки в формате `#RRGGBB`
    pub outline_color: String,
    /// Жирный шрифт
    pub bold: bool,
    /// Положение на экране (нумерация цифрового блока клавиатуры, 2 = снизу по центру)
    pub alignment: u8,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 24,
            primary_color: "#FFFFFF".to_string(),
            outline_color: "#000000".to_string(),
            bold: false,
            alignment: 2,
        }
    }
}
