//! Каталог доступных голосов.
//!
//! Идентификатор голоса Kokoro кодирует язык (первая буква) и пол (вторая
//! буква): `af_bella` означает американский английский и женский голос.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Пол голоса
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
}

/// Описание голоса
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub id: String,
    pub language: String,
    pub gender: Gender,
}

impl VoiceInfo {
    /// Построить описание по соглашению об именах Kokoro (`af_bella`).
    pub fn from_kokoro_id(id: &str) -> Option<Self> {
        let mut chars = id.chars();
        let lang = chars.next()?;
        let gender = match chars.next()? {
            'f' => Gender::Female,
            'm' => Gender::Male,
            _ => return None,
        };
        if chars.next()? != '_' {
            return None;
        }
        Some(Self {
            id: id.to_string(),
            language: language_for_prefix(lang)?.to_string(),
            gender,
        })
    }
}

/// Код языка по первой букве идентификатора голоса
pub fn language_for_prefix(prefix: char) -> Option<&'static str> {
    match prefix {
        'a' => Some("en-us"),
        'b' => Some("en-gb"),
        'e' => Some("es"),
        'f' => Some("fr"),
        'h' => Some("hi"),
        'i' => Some("it"),
        'j' => Some("ja"),
        'p' => Some("pt-br"),
        'z' => Some("zh"),
        _ => None,
    }
}

const KOKORO_VOICES: &[&str] = &[
    "af_alloy", "af_aoede", "af_bella", "af_heart", "af_jessica", "af_kore", "af_nicole",
    "af_nova", "af_river", "af_sarah", "af_sky", "am_adam", "am_echo", "am_eric", "am_fenrir",
    "am_liam", "am_michael", "am_onyx", "am_puck", "am_santa", "bf_alice", "bf_emma",
    "bf_isabella", "bf_lily", "bm_daniel", "bm_fable", "bm_george", "bm_lewis", "ef_dora",
    "em_alex", "em_santa", "ff_siwis", "hf_alpha", "hf_beta", "hm_omega", "hm_psi", "if_sara",
    "im_nicola", "jf_alpha", "jf_gongitsune", "jf_nezumi", "jf_tebukuro", "jm_kumo", "pf_dora",
    "pm_alex", "pm_santa", "zf_xiaobei", "zf_xiaoni", "zf_xiaoxiao", "zf_xiaoyi", "zm_yunjian",
    "zm_yunxi", "zm_yunxia", "zm_yunyang",
];

/// Набор голосов, которые понимает движок синтеза
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: BTreeMap<String, VoiceInfo>,
}

impl VoiceCatalog {
    /// Стандартный набор голосов Kokoro
    pub fn kokoro() -> Self {
        Self::with_voices(KOKORO_VOICES.iter().filter_map(|id| VoiceInfo::from_kokoro_id(id)))
    }

    pub fn with_voices<I: IntoIterator<Item = VoiceInfo>>(voices: I) -> Self {
        Self {
            voices: voices.into_iter().map(|v| (v.id.clone(), v)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&VoiceInfo> {
        self.voices.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.voices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Голоса с указанным полом (и языком, если задан), в порядке идентификаторов
    pub fn filter(&self, gender: Option<Gender>, language: Option<&str>) -> Vec<&VoiceInfo> {
        self.voices
            .values()
            .filter(|v| gender.map_or(true, |g| v.gender == g))
            .filter(|v| language.map_or(true, |l| v.language == l))
            .collect()
    }

    /// Поддерживается ли язык хотя бы одним голосом
    pub fn supports_language(&self, language: &str) -> bool {
        self.voices.values().any(|v| v.language == language)
    }
}
