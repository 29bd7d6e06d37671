//! Разбор и сериализация формулы голоса
//!
//! Формула описывает один голос (`af_bella`) или взвешенную смесь голосов
//! (`af_bella*0.5+af_sky*0.5`). Строка разбирается один раз на границе
//! системы в [`VoiceSpec`]; дальше по коду строка уже не используется.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ошибки разбора формулы
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("formula is empty")]
    Empty,

    #[error("term {position} has an empty voice id")]
    EmptyVoiceId { position: usize },

    #[error("voice id '{0}' contains invalid characters")]
    InvalidVoiceId(String),

    #[error("weight '{raw}' for voice '{voice}' is not a number")]
    InvalidWeight { voice: String, raw: String },

    #[error("weight {weight} for voice '{voice}' must be a positive number")]
    NonPositiveWeight { voice: String, weight: f32 },

    #[error("voice '{voice}' needs an explicit weight in a multi-voice blend")]
    MissingWeight { voice: String },

    #[error("blend weights sum to zero")]
    Degenerate,
}

/// Элемент смеси голосов
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendTerm {
    pub voice: String,
    pub weight: f32,
}

impl BlendTerm {
    pub fn new(voice: impl Into<String>, weight: f32) -> Self {
        Self {
            voice: voice.into(),
            weight,
        }
    }
}

/// Разобранная формула голоса
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum VoiceSpec {
    /// Один голос с полным весом
    Single(String),
    /// Взвешенная смесь нескольких голосов
    Blend(Vec<BlendTerm>),
}

impl VoiceSpec {
    /// Разобрать формулу вида `voiceId*weight+voiceId*weight`.
    ///
    /// Одиночный терм может не иметь веса; любой вес одиночного терма
    /// отбрасывается, потому что после нормализации он всегда равен 1.0.
    /// В смеси из нескольких термов вес обязателен. Повторяющиеся голоса
    /// складываются.
    pub fn parse(formula: &str) -> Result<Self, FormulaError> {
        let formula = formula.trim();
        if formula.is_empty() {
            return Err(FormulaError::Empty);
        }

        let raw_terms: Vec<&str> = formula.split('+').collect();
        let multi = raw_terms.len() > 1;
        let mut terms: Vec<BlendTerm> = Vec::with_capacity(raw_terms.len());

        for (position, raw) in raw_terms.iter().enumerate() {
            let (voice, weight) = parse_term(raw, position, multi)?;
            match terms.iter_mut().find(|t| t.voice == voice) {
                Some(existing) => existing.weight += weight,
                None => terms.push(BlendTerm::new(voice, weight)),
            }
        }

        if terms.len() == 1 {
            let term = terms.remove(0);
            return Ok(Self::Single(term.voice));
        }
        Ok(Self::Blend(terms))
    }

    /// Нормализовать веса так, чтобы их сумма была равна 1.0.
    ///
    /// Если исходная сумма меньше `min_total`, веса сначала масштабируются
    /// до этого минимума, затем делятся на сумму.
    pub fn normalize(self, min_total: f32) -> Result<Self, FormulaError> {
        let mut terms = match self {
            Self::Single(voice) => return Ok(Self::Single(voice)),
            Self::Blend(terms) => terms,
        };

        for term in &terms {
            if !(term.weight > 0.0) || !term.weight.is_finite() {
                return Err(FormulaError::NonPositiveWeight {
                    voice: term.voice.clone(),
                    weight: term.weight,
                });
            }
        }

        let mut total: f32 = terms.iter().map(|t| t.weight).sum();
        if !(total > 0.0) || !total.is_finite() {
            return Err(FormulaError::Degenerate);
        }
        if total < min_total {
            let scale = min_total / total;
            for term in terms.iter_mut() {
                term.weight *= scale;
            }
            total = terms.iter().map(|t| t.weight).sum();
        }

        for term in terms.iter_mut() {
            term.weight /= total;
        }

        if terms.len() == 1 {
            return Ok(Self::Single(terms.remove(0).voice));
        }

        // Последний вес добирает остаток, чтобы сумма была ровно 1.0,
        // если остаток после округления еще положителен
        let head: f32 = terms[..terms.len() - 1].iter().map(|t| t.weight).sum();
        if let Some(last) = terms.last_mut() {
            let remainder = 1.0 - head;
            if remainder > 0.0 {
                last.weight = remainder;
            }
        }

        Ok(Self::Blend(terms))
    }

    /// Веса голосов в порядке формулы
    pub fn weights(&self) -> Vec<f32> {
        match self {
            Self::Single(_) => vec![1.0],
            Self::Blend(terms) => terms.iter().map(|t| t.weight).collect(),
        }
    }

    /// Идентификаторы голосов в порядке формулы
    pub fn voices(&self) -> Vec<&str> {
        match self {
            Self::Single(voice) => vec![voice.as_str()],
            Self::Blend(terms) => terms.iter().map(|t| t.voice.as_str()).collect(),
        }
    }

    pub fn is_blend(&self) -> bool {
        matches!(self, Self::Blend(_))
    }

    /// Каноническая строка формулы
    pub fn to_formula(&self) -> String {
        match self {
            Self::Single(voice) => voice.clone(),
            Self::Blend(terms) => terms
                .iter()
                .map(|t| format!("{}*{}", t.voice, format_weight(t.weight)))
                .collect::<Vec<_>>()
                .join("+"),
        }
    }
}

fn parse_term(raw: &str, position: usize, multi: bool) -> Result<(String, f32), FormulaError> {
    let mut parts = raw.splitn(2, '*');
    let voice = parts.next().unwrap_or("").trim();
    let weight_raw = parts.next().map(str::trim);

    if voice.is_empty() {
        return Err(FormulaError::EmptyVoiceId { position });
    }
    if !voice
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(FormulaError::InvalidVoiceId(voice.to_string()));
    }

    let weight = match weight_raw {
        Some(raw) => {
            let weight: f32 = raw.parse().map_err(|_| FormulaError::InvalidWeight {
                voice: voice.to_string(),
                raw: raw.to_string(),
            })?;
            if !(weight > 0.0) || !weight.is_finite() {
                return Err(FormulaError::NonPositiveWeight {
                    voice: voice.to_string(),
                    weight,
                });
            }
            weight
        }
        None if multi => {
            return Err(FormulaError::MissingWeight {
                voice: voice.to_string(),
            })
        }
        None => 1.0,
    };

    Ok((voice.to_string(), weight))
}

/// Кратчайшая запись, которая читается обратно в тот же `f32`;
/// положительный вес никогда не печатается как `0`
fn format_weight(weight: f32) -> String {
    format!("{}", weight)
}

impl fmt::Display for VoiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_formula())
    }
}

impl FromStr for VoiceSpec {
    type Err = FormulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<VoiceSpec> for String {
    fn from(spec: VoiceSpec) -> Self {
        spec.to_formula()
    }
}

impl TryFrom<String> for VoiceSpec {
    type Error = FormulaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(weights: &[f32]) -> f32 {
        weights.iter().sum()
    }

    #[test]
    fn test_parse_even_blend() {
        let spec = VoiceSpec::parse("af_bella*0.5+af_sky*0.5")
            .unwrap()
            .normalize(0.5)
            .unwrap();
        assert_eq!(spec.voices(), vec!["af_bella", "af_sky"]);
        assert_eq!(spec.weights(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_single_voice_has_full_weight() {
        let spec = VoiceSpec::parse("af_bella").unwrap();
        assert_eq!(spec, VoiceSpec::Single("af_bella".to_string()));
        assert_eq!(spec.weights(), vec![1.0]);
    }

    #[test]
    fn test_single_term_low_weight_is_full_weight() {
        let spec = VoiceSpec::parse("af_bella*0.1")
            .unwrap()
            .normalize(0.5)
            .unwrap();
        assert_eq!(spec.weights(), vec![1.0]);
    }

    #[test]
    fn test_weights_are_normalized() {
        let spec = VoiceSpec::parse("af_bella*3 + am_adam*1")
            .unwrap()
            .normalize(0.5)
            .unwrap();
        let weights = spec.weights();
        assert!((weights[0] - 0.75).abs() < 1e-6);
        assert!((weights[1] - 0.25).abs() < 1e-6);
        assert!((sum(&weights) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tiny_blend_is_floored_not_rejected() {
        let spec = VoiceSpec::parse("af_bella*0.001+af_sky*0.003")
            .unwrap()
            .normalize(0.5)
            .unwrap();
        let weights = spec.weights();
        assert!((weights[0] - 0.25).abs() < 1e-5);
        assert!((sum(&weights) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_duplicate_voices_are_merged() {
        let spec = VoiceSpec::parse("af_bella*0.2+af_sky*0.4+af_bella*0.2").unwrap();
        assert_eq!(spec.voices(), vec!["af_bella", "af_sky"]);
        let weights = spec.weights();
        assert!((weights[0] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(VoiceSpec::parse("   "), Err(FormulaError::Empty));
        assert_eq!(
            VoiceSpec::parse("af_bella*0.5+"),
            Err(FormulaError::EmptyVoiceId { position: 1 })
        );
        assert_eq!(
            VoiceSpec::parse("af_bella+af_sky*0.5"),
            Err(FormulaError::MissingWeight {
                voice: "af_bella".to_string()
            })
        );
        assert!(matches!(
            VoiceSpec::parse("af_bella*abc+af_sky*1"),
            Err(FormulaError::InvalidWeight { .. })
        ));
        assert!(matches!(
            VoiceSpec::parse("af_bella*-1+af_sky*1"),
            Err(FormulaError::NonPositiveWeight { .. })
        ));
        assert!(matches!(
            VoiceSpec::parse("af bella"),
            Err(FormulaError::InvalidVoiceId(_))
        ));
    }

    #[test]
    fn test_zero_weight_rejected() {
        assert!(matches!(
            VoiceSpec::parse("af_bella*0+af_sky*0"),
            Err(FormulaError::NonPositiveWeight { .. })
        ));
    }

    #[test]
    fn test_round_trip_preserves_weights() {
        for formula in [
            "af_bella*0.5+af_sky*0.5",
            "af_bella*1+am_adam*2+bf_emma*3",
            "af_heart*0.7+af_nicole*0.2+am_michael*0.1",
            "af_sky*0.001+am_echo*0.002",
            "af_bella*1+af_sky*0.00001",
            "af_bella*1+af_sky*0.00000001",
            "af_bella*1+af_sky*1+af_heart*1",
        ] {
            let resolved = VoiceSpec::parse(formula).unwrap().normalize(0.5).unwrap();
            let reparsed = VoiceSpec::parse(&resolved.to_formula())
                .unwrap()
                .normalize(0.5)
                .unwrap();
            assert_eq!(resolved.voices(), reparsed.voices());
            for (a, b) in resolved.weights().iter().zip(reparsed.weights()) {
                assert!(*a > 0.0, "zero weight in {}", resolved.to_formula());
                assert!((a - b).abs() < 1e-6, "{} vs {} for {}", a, b, formula);
            }
        }
    }

    #[test]
    fn test_canonical_formula_text() {
        let spec = VoiceSpec::parse("af_bella * 1 + af_sky * 3")
            .unwrap()
            .normalize(0.5)
            .unwrap();
        assert_eq!(spec.to_formula(), "af_bella*0.25+af_sky*0.75");
        assert_eq!(VoiceSpec::Single("am_adam".into()).to_string(), "am_adam");
    }

    #[test]
    fn test_serde_uses_formula_string() {
        let spec = VoiceSpec::parse("af_bella*0.5+af_sky*0.5").unwrap();
        let json = serde_json::to_string(&spec).unwrap();
        assert_eq!(json, "\"af_bella*0.5+af_sky*0.5\"");
        let back: VoiceSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
        assert!(serde_json::from_str::<VoiceSpec>("\"af_bella+\"").is_err());
    }
}
