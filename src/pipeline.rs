//! Подготовка задания к синтезу
//!
//! Выполняется синхронно при входе в `running`: главы делятся на фрагменты,
//! затем для каждого фрагмента вычисляется директива голоса. Любая ошибка
//! конфигурации обнаруживается здесь, до первого вызова движка.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Result, TtsBookError};
use crate::job::model::JobSpec;
use crate::text::{Chunk, Chunker, Granularity, SpeakerTagger};
use crate::voice::{Gender, VoiceDirective, VoiceResolver, VoiceSpec};

/// Префикс формулы, запрашивающей случайную смесь голосов
pub const RANDOM_VOICE: &str = "random";

/// Итоговые настройки главы с учетом переопределений
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterSettings {
    pub voice: String,
    pub language: String,
    pub speed: f32,
    pub granularity: Granularity,
}

impl ChapterSettings {
    pub fn for_chapter(spec: &JobSpec, chapter_index: usize) -> Self {
        let defaults = &spec.defaults;
        let chapter_override = spec.chapter_overrides.get(&chapter_index);
        Self {
            voice: chapter_override
                .and_then(|o| o.voice.clone())
                .unwrap_or_else(|| defaults.voice.clone()),
            language: chapter_override
                .and_then(|o| o.language.clone())
                .unwrap_or_else(|| defaults.language.clone()),
            speed: chapter_override.and_then(|o| o.speed).unwrap_or(defaults.speed),
            granularity: chapter_override
                .and_then(|o| o.granularity)
                .unwrap_or(defaults.granularity),
        }
    }
}

/// Положение главы в общем списке фрагментов
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterPlan {
    pub index: usize,
    pub title: String,
    pub settings: ChapterSettings,
    /// Позиция первого фрагмента главы
    pub first_chunk: usize,
    pub chunk_count: usize,
}

/// Фрагменты всех включенных глав в порядке озвучивания
#[derive(Debug, Clone, Default)]
pub struct JobPlan {
    pub chapters: Vec<ChapterPlan>,
    pub chunks: Vec<Chunk>,
}

impl JobPlan {
    pub fn total(&self) -> usize {
        self.chunks.len()
    }

    /// Глава, которой принадлежит фрагмент на позиции `position`
    pub fn chapter_of(&self, position: usize) -> Option<&ChapterPlan> {
        self.chapters
            .iter()
            .find(|c| position >= c.first_chunk && position < c.first_chunk + c.chunk_count)
    }
}

/// Разбить включенные главы на фрагменты
pub fn plan_chunks(
    spec: &JobSpec,
    max_chunk_chars: usize,
    tagger: Option<&Arc<dyn SpeakerTagger>>,
) -> Result<JobPlan> {
    let mut seen = HashSet::new();
    let mut plan = JobPlan::default();

    for chapter in spec.enabled_chapters() {
        if !seen.insert(chapter.index) {
            return Err(TtsBookError::Configuration(format!(
                "chapter index {} is selected more than once",
                chapter.index
            )));
        }

        let settings = ChapterSettings::for_chapter(spec, chapter.index);
        let mut chunker = Chunker::new(settings.granularity, &settings.language, max_chunk_chars);
        if let Some(tagger) = tagger {
            chunker = chunker.with_tagger(Arc::clone(tagger));
        }

        let chunks = chunker.split(chapter.index, &chapter.text);
        if chunks.is_empty() {
            log::warn!("Chapter {} ('{}') has no text", chapter.index, chapter.title);
        }

        plan.chapters.push(ChapterPlan {
            index: chapter.index,
            title: chapter.title.clone(),
            settings,
            first_chunk: plan.chunks.len(),
            chunk_count: chunks.len(),
        });
        plan.chunks.extend(chunks);
    }

    if plan.chapters.is_empty() {
        return Err(TtsBookError::Configuration(
            "no chapters selected for narration".to_string(),
        ));
    }

    Ok(plan)
}

/// Директивы голоса для каждого фрагмента плана.
///
/// Приоритет: голос говорящего, затем переопределение главы, затем голос
/// задания. Каждая различная комбинация разрешается один раз; голоса всех
/// включенных глав и всех говорящих проверяются, даже если не используются.
pub fn resolve_directives(
    plan: &JobPlan,
    spec: &JobSpec,
    resolver: &VoiceResolver,
    seed: u64,
) -> Result<Vec<Arc<VoiceDirective>>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut memo: HashMap<(String, String, u32), Arc<VoiceDirective>> = HashMap::new();

    let mut lookup = |formula: &str, settings: &ChapterSettings| -> Result<Arc<VoiceDirective>> {
        let key = (formula.to_string(), settings.language.clone(), settings.speed.to_bits());
        if let Some(directive) = memo.get(&key) {
            return Ok(Arc::clone(directive));
        }
        let directive = if let Some(filter) = formula.strip_prefix(RANDOM_VOICE) {
            let gender = parse_gender_filter(filter)?;
            let voice = resolver.random_blend(gender, Some(&settings.language), &mut rng)?;
            log::info!("Random voice for '{}': {}", formula, voice);
            resolver.directive(&voice.to_formula(), &settings.language, settings.speed)?
        } else {
            resolver.directive(formula, &settings.language, settings.speed)?
        };
        let directive = Arc::new(directive);
        memo.insert(key, Arc::clone(&directive));
        Ok(directive)
    };

    for chapter in &plan.chapters {
        lookup(chapter.settings.voice.as_str(), &chapter.settings)?;
    }
    for (speaker, formula) in &spec.speaker_voices {
        if !formula.starts_with(RANDOM_VOICE) {
            resolver.resolve(formula).map_err(|e| {
                TtsBookError::Configuration(format!("voice for speaker '{}': {}", speaker, e))
            })?;
        }
    }

    let mut directives = Vec::with_capacity(plan.chunks.len());
    for chapter in &plan.chapters {
        let chunks = &plan.chunks[chapter.first_chunk..chapter.first_chunk + chapter.chunk_count];
        for chunk in chunks {
            let formula = chunk
                .speaker
                .as_ref()
                .and_then(|speaker| spec.speaker_voices.get(speaker))
                .unwrap_or(&chapter.settings.voice);
            directives.push(lookup(formula.as_str(), &chapter.settings)?);
        }
    }
    Ok(directives)
}

/// Синтаксическая проверка всех формул запроса при постановке в очередь.
///
/// Наличие голосов в каталоге здесь не проверяется: это ошибка
/// конфигурации, и она фиксируется в задании при старте.
pub fn check_formula_syntax(spec: &JobSpec) -> Result<()> {
    let overrides = spec
        .chapter_overrides
        .values()
        .filter_map(|o| o.voice.as_deref());
    let speakers = spec.speaker_voices.values().map(String::as_str);

    for formula in std::iter::once(spec.defaults.voice.as_str())
        .chain(overrides)
        .chain(speakers)
    {
        if let Some(filter) = formula.strip_prefix(RANDOM_VOICE) {
            parse_gender_filter(filter)
                .map_err(|e| TtsBookError::InvalidRequest(e.to_string()))?;
            continue;
        }
        VoiceSpec::parse(formula).map_err(|e| {
            TtsBookError::InvalidRequest(format!("bad voice formula '{}': {}", formula, e))
        })?;
    }
    Ok(())
}

/// `random`, `random:f`, `random:m`
fn parse_gender_filter(filter: &str) -> Result<Option<Gender>> {
    match filter.trim_start_matches(':') {
        "" => Ok(None),
        "f" | "female" => Ok(Some(Gender::Female)),
        "m" | "male" => Ok(Some(Gender::Male)),
        other => Err(TtsBookError::Configuration(format!(
            "unknown gender filter '{}' in random voice",
            other
        ))),
    }
}
