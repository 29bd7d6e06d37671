//! Запись готовых файлов задания
//!
//! Все файлы пишутся в `<output_dir>/<job_id>/` через временный файл и
//! переименование. Если запись хоть одного файла не удалась, директория
//! задания удаляется целиком: частичный результат не публикуется.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uuid::Uuid;

use crate::audio::wav::{write_wav_atomic, WavEncoding};
use crate::audio::{AssembledAudio, TimingRecord};
use crate::config::TtsBookConfig;
use crate::error::{Result, TtsBookError};
use crate::job::model::{JobArtifacts, JobSpec};
use crate::pipeline::JobPlan;
use crate::subtitle::{cues_from_timings, render};
use crate::utils::atomic::write_string_atomic;
use crate::utils::ffmpeg::transcode_atomic;

/// Метка главы в итоговом аудио
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterMarker {
    pub title: String,
    pub start: Duration,
    pub end: Duration,
}

/// Метки глав по записям времени; главы без фрагментов пропускаются
pub fn chapter_markers(plan: &JobPlan, records: &[TimingRecord]) -> Vec<ChapterMarker> {
    plan.chapters
        .iter()
        .filter(|chapter| chapter.chunk_count > 0)
        .filter_map(|chapter| {
            let first = records.get(chapter.first_chunk)?;
            let last = records.get(chapter.first_chunk + chapter.chunk_count - 1)?;
            Some(ChapterMarker {
                title: chapter.title.clone(),
                start: first.start(),
                end: last.end(),
            })
        })
        .collect()
}

/// Метаданные глав в формате FFMETADATA1
pub fn render_ffmetadata(title: &str, markers: &[ChapterMarker]) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    let _ = writeln!(out, "title={}", escape_ffmetadata(title));
    for marker in markers {
        out.push_str("\n[CHAPTER]\nTIMEBASE=1/1000\n");
        let _ = writeln!(out, "START={}", marker.start.as_millis());
        let _ = writeln!(out, "END={}", marker.end.as_millis());
        let _ = writeln!(out, "title={}", escape_ffmetadata(&marker.title));
    }
    out
}

fn escape_ffmetadata(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Имя файла из названия книги
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "audiobook".to_string()
    } else {
        slug
    }
}

/// Директория с результатами задания
pub fn job_output_dir(config: &TtsBookConfig, job_id: Uuid) -> PathBuf {
    config.output_dir.join(job_id.to_string())
}

/// Записать аудио, субтитры, метки глав и записи времени
pub fn write_artifacts(
    config: &TtsBookConfig,
    job_id: Uuid,
    spec: &JobSpec,
    plan: &JobPlan,
    assembled: &AssembledAudio,
) -> Result<JobArtifacts> {
    let directory = job_output_dir(config, job_id);
    let result = write_all(config, &directory, spec, plan, assembled);
    if result.is_err() && directory.exists() {
        if let Err(e) = fs::remove_dir_all(&directory) {
            log::warn!("Failed to remove partial output {}: {}", directory.display(), e);
        }
    }
    result
}

fn write_all(
    config: &TtsBookConfig,
    directory: &Path,
    spec: &JobSpec,
    plan: &JobPlan,
    assembled: &AssembledAudio,
) -> Result<JobArtifacts> {
    fs::create_dir_all(directory).map_err(|e| {
        TtsBookError::Storage(format!("Failed to create {}: {}", directory.display(), e))
    })?;

    let slug = slugify(&spec.title);
    let defaults = &spec.defaults;

    let chapters = directory.join(format!("{}.chapters.txt", slug));
    let markers = chapter_markers(plan, &assembled.records);
    write_string_atomic(&chapters, &render_ffmetadata(&spec.title, &markers))?;

    let audio = directory.join(format!("{}.{}", slug, defaults.audio_format.extension()));
    if defaults.audio_format.needs_transcode() {
        let staging = tempfile::Builder::new()
            .prefix(".assembled-")
            .suffix(".wav")
            .tempfile_in(directory)
            .map_err(|e| TtsBookError::Storage(format!("Failed to create temp file: {}", e)))?;
        write_wav_atomic(staging.path(), &assembled.samples, assembled.sample_rate, WavEncoding::Pcm16)?;
        transcode_atomic(
            &config.ffmpeg_path,
            staging.path(),
            &audio,
            defaults.audio_format,
            Some(&chapters),
        )?;
    } else {
        write_wav_atomic(&audio, &assembled.samples, assembled.sample_rate, WavEncoding::Pcm16)?;
    }

    let cues = cues_from_timings(&assembled.records, &plan.chunks);
    let subtitles = match (
        defaults.subtitle_format.extension(),
        render(defaults.subtitle_format, &cues, &defaults.subtitle_style, &spec.title),
    ) {
        (Some(extension), Some(content)) => {
            let path = directory.join(format!("{}.{}", slug, extension));
            write_string_atomic(&path, &content)?;
            Some(path)
        }
        _ => None,
    };

    let timings = directory.join(format!("{}.timings.json", slug));
    write_string_atomic(&timings, &serde_json::to_string_pretty(&assembled.records)?)?;

    log::info!(
        "Wrote {} ({:.1}s, {} cues)",
        audio.display(),
        assembled.duration().as_secs_f64(),
        cues.len()
    );

    Ok(JobArtifacts {
        directory: directory.to_path_buf(),
        audio,
        subtitles,
        chapters,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::TimingAssembler;
    use crate::config::SubtitleFormat;
    use crate::job::model::ChapterInput;
    use crate::pipeline::plan_chunks;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("The Time Machine!"), "the-time-machine");
        assert_eq!(slugify("  ...  "), "audiobook");
        assert_eq!(slugify("Война и мир"), "война-и-мир");
    }

    #[test]
    fn test_ffmetadata() {
        let markers = vec![ChapterMarker {
            title: "One; Two".to_string(),
            start: Duration::ZERO,
            end: Duration::from_millis(1_500),
        }];
        let meta = render_ffmetadata("Book", &markers);
        assert!(meta.starts_with(";FFMETADATA1\ntitle=Book\n"));
        assert!(meta.contains("START=0\nEND=1500\ntitle=One\\; Two\n"));
    }

    #[test]
    fn test_write_artifacts_wav() {
        let dir = tempfile::tempdir().unwrap();
        let config = TtsBookConfig {
            output_dir: dir.path().to_path_buf(),
            ..TtsBookConfig::default()
        };
        let mut spec = JobSpec::new(
            "My Book",
            vec![
                ChapterInput::new(0, "One", "Hello."),
                ChapterInput::new(1, "Two", "World."),
            ],
        );
        spec.defaults.subtitle_format = SubtitleFormat::Vtt;
        let plan = plan_chunks(&spec, 500, None).unwrap();

        let mut assembler = TimingAssembler::new(1_000);
        assembler.append(&plan.chunks[0].id, &[0.1; 500], 1_000);
        assembler.append(&plan.chunks[1].id, &[0.1; 700], 1_000);
        let assembled = assembler.finalize();

        let job_id = Uuid::new_v4();
        let artifacts = write_artifacts(&config, job_id, &spec, &plan, &assembled).unwrap();

        assert_eq!(artifacts.directory, dir.path().join(job_id.to_string()));
        assert!(artifacts.audio.ends_with("my-book.wav"));
        let vtt = fs::read_to_string(artifacts.subtitles.unwrap()).unwrap();
        assert!(vtt.contains("00:00:00.500 --> 00:00:01.200\nWorld."));
        let chapters = fs::read_to_string(&artifacts.chapters).unwrap();
        assert!(chapters.contains("START=500\nEND=1200\ntitle=Two"));
        let records: Vec<TimingRecord> =
            serde_json::from_str(&fs::read_to_string(&artifacts.timings).unwrap()).unwrap();
        assert_eq!(records, assembled.records);
    }

    #[test]
    fn test_failed_transcode_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = TtsBookConfig {
            output_dir: dir.path().to_path_buf(),
            ffmpeg_path: "definitely-not-ffmpeg-binary".to_string(),
            ..TtsBookConfig::default()
        };
        let mut spec = JobSpec::new("Book", vec![ChapterInput::new(0, "One", "Hello.")]);
        spec.defaults.audio_format = crate::config::AudioFormat::Mp3;
        let plan = plan_chunks(&spec, 500, None).unwrap();
        let mut assembler = TimingAssembler::new(1_000);
        assembler.append(&plan.chunks[0].id, &[0.0; 10], 1_000);

        let job_id = Uuid::new_v4();
        let err = write_artifacts(&config, job_id, &spec, &plan, &assembler.finalize()).unwrap_err();
        assert_eq!(err.kind(), "storage");
        assert!(!job_output_dir(&config, job_id).exists());
    }
}
