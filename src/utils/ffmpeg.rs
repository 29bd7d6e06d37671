//! Модуль для работы с FFmpeg
//!
//! WAV пишется напрямую; остальные контейнеры получаются перекодированием
//! собранного WAV через ffmpeg во временный файл с последующим переименованием.

use std::path::Path;
use std::process::Command;

use crate::config::AudioFormat;
use crate::error::{Result, TtsBookError};

/// Проверка наличия FFmpeg
pub fn check_ffmpeg_installed(ffmpeg: &str) -> bool {
    Command::new(ffmpeg)
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Аргументы ffmpeg для перекодирования WAV в нужный формат
pub fn transcode_args(
    input_wav: &Path,
    output: &Path,
    format: AudioFormat,
    chapters: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input_wav.to_string_lossy().to_string(),
    ];

    if let Some(chapters) = chapters {
        args.push("-i".to_string());
        args.push(chapters.to_string_lossy().to_string());
        args.push("-map_metadata".to_string());
        args.push("1".to_string());
        args.push("-map".to_string());
        args.push("0:a".to_string());
    }

    let codec: &[&str] = match format {
        AudioFormat::Wav => &["-c:a", "pcm_s16le", "-f", "wav"],
        AudioFormat::Mp3 => &["-c:a", "libmp3lame", "-q:a", "4", "-f", "mp3"],
        AudioFormat::Flac => &["-c:a", "flac", "-f", "flac"],
        AudioFormat::M4b => &["-c:a", "aac", "-b:a", "64k", "-f", "mp4"],
    };
    args.extend(codec.iter().map(|s| s.to_string()));
    args.push("-y".to_string());
    args.push(output.to_string_lossy().to_string());
    args
}

/// Запуск команды FFmpeg
pub fn run_ffmpeg_command(ffmpeg: &str, args: &[String]) -> Result<()> {
    log::debug!("Running {} {}", ffmpeg, args.join(" "));
    let output = Command::new(ffmpeg)
        .args(args)
        .output()
        .map_err(|e| TtsBookError::Storage(format!("Failed to start {}: {}", ffmpeg, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TtsBookError::Storage(format!(
            "FFmpeg command failed with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

/// Перекодировать WAV в `output` атомарно
pub fn transcode_atomic(
    ffmpeg: &str,
    input_wav: &Path,
    output: &Path,
    format: AudioFormat,
    chapters: Option<&Path>,
) -> Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".transcode-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(parent)
        .map_err(|e| TtsBookError::Storage(format!("Failed to create temp file: {}", e)))?;

    let args = transcode_args(input_wav, temp.path(), format, chapters);
    run_ffmpeg_command(ffmpeg, &args)?;

    temp.persist(output).map_err(|e| {
        TtsBookError::Storage(format!("Failed to move file into {}: {}", output.display(), e.error))
    })?;
    Ok(())
}
