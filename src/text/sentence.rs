//! Разбиение текста на предложения.
//!
//! Для языков с известными правилами используется токенизатор, учитывающий
//! сокращения и инициалы. Для остальных языков применяется простое
//! разбиение регулярным выражением по знакам конца предложения.

use std::ops::Range;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SENTENCE_END: Regex =
        Regex::new(r#"[.!?。！？…।]+["'”’)\]»」』]*\s+"#).expect("valid sentence regex");
}

const TERMINALS: &[char] = &['.', '!', '?', '…'];
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '»'];
const OPENERS: &[char] = &['"', '\'', '“', '‘', '(', '[', '«', '¿', '¡', '—', '-'];
const CJK_TERMINALS: &[char] = &['。', '！', '？', '!', '?'];
const CJK_CLOSERS: &[char] = &['」', '』', '）', '"', '”', '’'];

const EN_ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "vs", "etc", "e.g", "i.e", "no", "vol",
    "ch", "fig", "inc", "ltd", "co", "gen", "col", "capt", "lt", "sgt", "rev", "hon", "mt", "ave",
];
const FR_ABBREVIATIONS: &[&str] = &[
    "mme", "mlle", "dr", "pr", "st", "ste", "etc", "cf", "vol", "ch", "env", "av", "bd",
];
const ES_ABBREVIATIONS: &[&str] = &[
    "sr", "sra", "srta", "dr", "dra", "ud", "uds", "etc", "pág", "vol", "cap", "núm", "lic",
];
const IT_ABBREVIATIONS: &[&str] = &[
    "sig", "sig.ra", "dott", "prof", "ing", "avv", "ecc", "pag", "vol", "cap",
];
const PT_ABBREVIATIONS: &[&str] = &[
    "sr", "sra", "dr", "dra", "prof", "etc", "pág", "vol", "cap", "av",
];
const DE_ABBREVIATIONS: &[&str] = &[
    "hr", "fr", "dr", "prof", "bzw", "usw", "z.b", "d.h", "ca", "nr", "vgl", "str",
];

/// Способ разбиения на предложения для конкретного языка
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmenter {
    /// Правила с учетом сокращений
    Rules {
        language: &'static str,
        abbreviations: &'static [&'static str],
    },
    /// Китайский и японский: конец предложения не требует пробела
    Cjk,
    /// Резервное разбиение регулярным выражением
    Regex,
}

impl Segmenter {
    /// Подобрать токенизатор для языка; незнакомый язык получает регулярку.
    pub fn for_language(language: &str) -> Self {
        let language = language.trim().to_lowercase();
        let base = language.split(&['-', '_'][..]).next().unwrap_or("");
        match base {
            "en" => Self::Rules { language: "en", abbreviations: EN_ABBREVIATIONS },
            "fr" => Self::Rules { language: "fr", abbreviations: FR_ABBREVIATIONS },
            "es" => Self::Rules { language: "es", abbreviations: ES_ABBREVIATIONS },
            "it" => Self::Rules { language: "it", abbreviations: IT_ABBREVIATIONS },
            "pt" => Self::Rules { language: "pt", abbreviations: PT_ABBREVIATIONS },
            "de" => Self::Rules { language: "de", abbreviations: DE_ABBREVIATIONS },
            "ja" | "zh" => Self::Cjk,
            _ => {
                log::warn!(
                    "No sentence tokenizer for language '{}', falling back to punctuation rules",
                    language
                );
                Self::Regex
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Regex)
    }

    /// Название токенизатора для журнала
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rules { language, .. } => *language,
            Self::Cjk => "cjk",
            Self::Regex => "regex",
        }
    }

    /// Разбить текст на предложения. Срезы покрывают весь исходный текст
    /// и могут содержать пробелы по краям.
    pub fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.split_ranges(text)
            .into_iter()
            .map(|range| &text[range])
            .collect()
    }

    /// Байтовые диапазоны предложений, идущие подряд от начала до конца текста
    pub fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        let boundaries = match self {
            Self::Rules { abbreviations, .. } => rule_boundaries(text, abbreviations),
            Self::Cjk => cjk_boundaries(text),
            Self::Regex => SENTENCE_END
                .find_iter(text)
                .map(|m| m.end())
                .filter(|&end| end < text.len())
                .collect(),
        };
        ranges_from_boundaries(text.len(), boundaries)
    }
}

fn ranges_from_boundaries(len: usize, boundaries: Vec<usize>) -> Vec<Range<usize>> {
    let mut ranges = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for boundary in boundaries {
        if boundary > start {
            ranges.push(start..boundary);
            start = boundary;
        }
    }
    if start < len {
        ranges.push(start..len);
    }
    ranges
}

fn rule_boundaries(text: &str, abbreviations: &[&str]) -> Vec<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let mut boundaries = Vec::new();
    let mut i = 0;

    while i < n {
        let c = chars[i].1;
        if !TERMINALS.contains(&c) {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j < n && TERMINALS.contains(&chars[j].1) {
            j += 1;
        }
        let single_period = c == '.' && j == i + 1;
        while j < n && CLOSERS.contains(&chars[j].1) {
            j += 1;
        }
        if j >= n || !chars[j].1.is_whitespace() {
            i = j.max(i + 1);
            continue;
        }

        let mut k = j;
        while k < n && chars[k].1.is_whitespace() {
            k += 1;
        }
        if k >= n {
            break;
        }

        let next = chars[k].1;
        let starts_sentence = next.is_uppercase() || next.is_numeric() || OPENERS.contains(&next);
        if starts_sentence && !(single_period && is_abbreviation(text, chars[i].0, abbreviations)) {
            boundaries.push(chars[k].0);
        }
        i = k;
    }

    boundaries
}

/// Является ли слово перед точкой сокращением или инициалом
fn is_abbreviation(text: &str, period_at: usize, abbreviations: &[&str]) -> bool {
    let before = &text[..period_at];
    let word_start = before
        .char_indices()
        .rev()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '.'))
        .map(|(idx, c)| idx + c.len_utf8())
        .unwrap_or(0);
    let word = before[word_start..].trim_end_matches('.');
    if word.is_empty() {
        return false;
    }

    let mut letters = word.chars();
    if let (Some(first), None) = (letters.next(), letters.next()) {
        if first.is_alphabetic() {
            return true;
        }
    }

    let lower = word.to_lowercase();
    abbreviations.contains(&lower.as_str())
}

fn cjk_boundaries(text: &str) -> Vec<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let mut boundaries = Vec::new();
    let mut i = 0;

    while i < n {
        if !CJK_TERMINALS.contains(&chars[i].1) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < n && (CJK_TERMINALS.contains(&chars[j].1) || CJK_CLOSERS.contains(&chars[j].1)) {
            j += 1;
        }
        while j < n && chars[j].1.is_whitespace() {
            j += 1;
        }
        if j < n {
            boundaries.push(chars[j].0);
        }
        i = j;
    }

    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(segmenter: &Segmenter, text: &str) -> Vec<String> {
        segmenter
            .split(text)
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    #[test]
    fn test_english_abbreviations() {
        let seg = Segmenter::for_language("en-us");
        let result = sentences(
            &seg,
            "Mr. Smith met Dr. Watson at 221 Baker St. in London. It rained! Did they care?",
        );
        assert_eq!(
            result,
            vec![
                "Mr. Smith met Dr. Watson at 221 Baker St. in London.",
                "It rained!",
                "Did they care?",
            ]
        );
    }

    #[test]
    fn test_initials_and_decimals() {
        let seg = Segmenter::for_language("en-gb");
        let result = sentences(&seg, "J. R. R. Tolkien wrote it. Pi is 3.14 roughly. Yes.");
        assert_eq!(
            result,
            vec!["J. R. R. Tolkien wrote it.", "Pi is 3.14 roughly.", "Yes."]
        );
    }

    #[test]
    fn test_quotes_close_sentence() {
        let seg = Segmenter::for_language("en");
        let result = sentences(&seg, "\"Run!\" she said. \"Now.\" He ran.");
        assert_eq!(result, vec!["\"Run!\" she said.", "\"Now.\"", "He ran."]);
    }

    #[test]
    fn test_spanish_inverted_marks() {
        let seg = Segmenter::for_language("es");
        let result = sentences(&seg, "Hola, Sr. García. ¿Cómo está? ¡Muy bien!");
        assert_eq!(result, vec!["Hola, Sr. García.", "¿Cómo está?", "¡Muy bien!"]);
    }

    #[test]
    fn test_cjk_without_spaces() {
        let seg = Segmenter::for_language("ja");
        let result = sentences(&seg, "今日は晴れです。明日は雨でしょう！「本当？」はい。");
        assert_eq!(
            result,
            vec!["今日は晴れです。", "明日は雨でしょう！", "「本当？」", "はい。"]
        );
    }

    #[test]
    fn test_unknown_language_falls_back_to_regex() {
        let seg = Segmenter::for_language("hi");
        assert!(seg.is_fallback());
        let result = sentences(&seg, "यह पहला वाक्य है। यह दूसरा है। Mr. X left.");
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn test_ranges_cover_text() {
        let text = "One. Two!  Three?\nFour";
        for seg in [Segmenter::for_language("en"), Segmenter::Regex, Segmenter::Cjk] {
            let joined: String = seg.split(text).concat();
            assert_eq!(joined, text);
        }
    }
}
