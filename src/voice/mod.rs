//! Модуль голосов
//!
//! Разбор формул смеси голосов, каталог голосов движка и получение
//! директивы синтеза для каждого фрагмента.

pub mod catalog;
pub mod formula;
pub mod resolver;

pub use catalog::{Gender, VoiceCatalog, VoiceInfo};
pub use formula::{BlendTerm, FormulaError, VoiceSpec};
pub use resolver::{VoiceDirective, VoiceResolver};
