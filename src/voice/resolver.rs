//! Преобразование пользовательской формулы голоса в директиву синтеза.

use std::ops::RangeInclusive;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TtsBookError};
use crate::voice::catalog::{Gender, VoiceCatalog};
use crate::voice::formula::{BlendTerm, FormulaError, VoiceSpec};

/// Допустимый множитель скорости речи
pub const SPEED_RANGE: RangeInclusive<f32> = 0.5..=2.0;

/// Максимальное количество голосов в случайной смеси
pub const MAX_RANDOM_VOICES: usize = 4;

/// Готовая инструкция синтеза для одного фрагмента
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceDirective {
    pub voice: VoiceSpec,
    pub language: String,
    pub speed: f32,
}

impl VoiceDirective {
    /// Ключ, однозначно описывающий директиву (используется кэшем синтеза)
    pub fn cache_key(&self) -> String {
        format!("{}|{}|{:.3}", self.voice.to_formula(), self.language, self.speed)
    }
}

/// Разрешает формулы голосов относительно каталога
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    catalog: Arc<VoiceCatalog>,
    min_blend_total: f32,
}

impl VoiceResolver {
    pub fn new(catalog: Arc<VoiceCatalog>, min_blend_total: f32) -> Self {
        Self {
            catalog,
            min_blend_total,
        }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Разобрать формулу, проверить голоса и нормализовать веса
    pub fn resolve(&self, raw: &str) -> Result<VoiceSpec> {
        let spec = VoiceSpec::parse(raw)?;

        if let Some(unknown) = spec.voices().into_iter().find(|v| !self.catalog.contains(v)) {
            return Err(TtsBookError::Configuration(format!(
                "unknown voice '{}' in formula '{}'",
                unknown, raw
            )));
        }

        spec.normalize(self.min_blend_total).map_err(|e| match e {
            FormulaError::Degenerate => {
                TtsBookError::Configuration(format!("formula '{}' produces an empty blend", raw))
            }
            other => TtsBookError::FormulaParse(other),
        })
    }

    /// Полная директива: голос, язык и скорость
    pub fn directive(&self, raw: &str, language: &str, speed: f32) -> Result<VoiceDirective> {
        if !SPEED_RANGE.contains(&speed) {
            return Err(TtsBookError::Configuration(format!(
                "speed {} is outside {:?}",
                speed, SPEED_RANGE
            )));
        }
        if !self.catalog.supports_language(language) {
            return Err(TtsBookError::Configuration(format!(
                "language '{}' is not supported by any voice",
                language
            )));
        }
        Ok(VoiceDirective {
            voice: self.resolve(raw)?,
            language: language.to_string(),
            speed,
        })
    }

    /// Случайная смесь из 1..=4 голосов с заданным полом.
    pub fn random_blend<R: Rng + ?Sized>(
        &self,
        gender: Option<Gender>,
        language: Option<&str>,
        rng: &mut R,
    ) -> Result<VoiceSpec> {
        let candidates = self.catalog.filter(gender, language);
        if candidates.is_empty() {
            return Err(TtsBookError::Configuration(format!(
                "no voices match gender {:?} and language {:?}",
                gender, language
            )));
        }

        let count = rng.gen_range(1..=candidates.len().min(MAX_RANDOM_VOICES));
        let terms: Vec<BlendTerm> = candidates
            .choose_multiple(rng, count)
            .map(|info| BlendTerm::new(info.id.clone(), rng.gen_range(0.05f32..1.0)))
            .collect();

        log::debug!("Random blend picked {} voice(s)", terms.len());

        let spec = if terms.len() == 1 {
            VoiceSpec::Single(terms[0].voice.clone())
        } else {
            VoiceSpec::Blend(terms)
        };
        spec.normalize(self.min_blend_total)
            .map_err(TtsBookError::FormulaParse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn resolver() -> VoiceResolver {
        VoiceResolver::new(Arc::new(VoiceCatalog::kokoro()), 0.5)
    }

    #[test]
    fn test_resolve_known_blend() {
        let spec = resolver().resolve("af_bella*0.5+af_sky*0.5").unwrap();
        assert_eq!(spec.weights(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_unknown_voice_is_configuration_error() {
        let err = resolver().resolve("af_bella*0.5+zz_ghost*0.5").unwrap_err();
        assert!(matches!(err, TtsBookError::Configuration(_)));
        assert!(err.to_string().contains("zz_ghost"));
    }

    #[test]
    fn test_malformed_formula_is_parse_error() {
        let err = resolver().resolve("af_bella*").unwrap_err();
        assert!(matches!(err, TtsBookError::FormulaParse(_)));
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_directive_checks_speed_and_language() {
        let r = resolver();
        assert!(r.directive("af_bella", "en-us", 1.0).is_ok());
        assert!(matches!(
            r.directive("af_bella", "en-us", 3.0),
            Err(TtsBookError::Configuration(_))
        ));
        assert!(matches!(
            r.directive("af_bella", "xx", 1.0),
            Err(TtsBookError::Configuration(_))
        ));
    }

    #[test]
    fn test_random_blend_is_seeded_and_normalized() {
        let r = resolver();
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);

        for _ in 0..20 {
            let first = r.random_blend(Some(Gender::Female), None, &mut a).unwrap();
            let second = r.random_blend(Some(Gender::Female), None, &mut b).unwrap();
            assert_eq!(first, second);

            let voices = first.voices();
            assert!((1..=MAX_RANDOM_VOICES).contains(&voices.len()));
            for voice in voices {
                assert_eq!(r.catalog().get(voice).unwrap().gender, Gender::Female);
            }
            let total: f32 = first.weights().iter().sum();
            assert!((total - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_random_blend_without_candidates() {
        let r = resolver();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(r.random_blend(Some(Gender::Male), Some("xx"), &mut rng).is_err());
    }
}
