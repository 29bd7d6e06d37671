//! Модуль обработки ошибок библиотеки tts-book
//!
//! Этот модуль содержит типы ошибок, которые могут возникнуть при конвертации
//! документа в аудиокнигу. Все ошибки конвейера попадают в журнал задания и
//! в поле `error` статуса; вызывающей стороне возвращаются только ошибки
//! некорректных запросов.

use thiserror::Error;

use crate::voice::formula::FormulaError;

/// Ошибки библиотеки tts-book
#[derive(Debug, Error)]
pub enum TtsBookError {
    /// Ошибка конфигурации (неизвестный голос, пустой выбор глав, неверная смесь)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Ошибка синтеза конкретного фрагмента
    #[error("Synthesis error in chunk {chunk_id}: {message}")]
    Synthesis { chunk_id: String, message: String },

    /// Ошибка записи временных или выходных файлов
    #[error("Storage error: {0}")]
    Storage(String),

    /// Некорректный запрос (например, неверный идентификатор задания)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Задание не найдено
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Ошибка разбора формулы голоса
    #[error("Invalid voice formula: {0}")]
    FormulaParse(#[from] FormulaError),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ошибка WAV-кодирования
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Другая ошибка
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TtsBookError {
    /// Категория ошибки для журнала задания
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) | Self::FormulaParse(_) => "configuration",
            Self::Synthesis { .. } => "synthesis",
            Self::Storage(_) | Self::Io(_) | Self::Wav(_) => "storage",
            Self::InvalidRequest(_) => "invalid_request",
            Self::JobNotFound(_) => "not_found",
            Self::Json(_) => "serialization",
            Self::Other(_) => "other",
        }
    }

    /// Можно ли повторить операцию, вызвавшую ошибку
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Synthesis { .. })
    }

    pub(crate) fn synthesis(chunk_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Synthesis {
            chunk_id: chunk_id.into(),
            message: message.into(),
        }
    }
}

/// Тип Result для библиотеки tts-book
pub type Result<T> = std::result::Result<T, TtsBookError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(TtsBookError::Configuration("x".into()).kind(), "configuration");
        assert_eq!(TtsBookError::synthesis("c1", "boom").kind(), "synthesis");
        assert_eq!(TtsBookError::Storage("disk".into()).kind(), "storage");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "full");
        assert_eq!(TtsBookError::from(io).kind(), "storage");
    }

    #[test]
    fn test_only_synthesis_is_retryable() {
        assert!(TtsBookError::synthesis("c1", "oom").is_retryable());
        assert!(!TtsBookError::Storage("disk".into()).is_retryable());
        assert!(!TtsBookError::Configuration("voice".into()).is_retryable());
    }

    #[test]
    fn test_synthesis_message_names_chunk() {
        let err = TtsBookError::synthesis("chapter001-paragraph-00003", "device lost");
        assert_eq!(
            err.to_string(),
            "Synthesis error in chunk chapter001-paragraph-00003: device lost"
        );
    }
}
