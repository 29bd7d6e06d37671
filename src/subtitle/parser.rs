//! Модуль для парсинга субтитров
//!
//! Чтение ранее записанных SRT и VTT файлов: нужно для проверки артефактов
//! и для повторного использования субтитров готового задания.

use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TtsBookError};
use crate::subtitle::types::SubtitleCue;

/// Парсинг файла субтитров по расширению
pub fn parse_subtitle_file<P: AsRef<Path>>(path: P) -> Result<Vec<SubtitleCue>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("srt") => parse_srt(&content),
        Some("vtt") => parse_vtt(&content),
        _ => Err(TtsBookError::InvalidRequest(format!(
            "Unsupported subtitle file: {}",
            path.display()
        ))),
    }
}

/// Парсинг SubRip
pub fn parse_srt(content: &str) -> Result<Vec<SubtitleCue>> {
    let content = content.trim_start_matches('\u{feff}');
    Ok(blocks(content)
        .filter_map(|block| parse_cue_block(&block, ','))
        .collect())
}

/// Парсинг WebVTT
pub fn parse_vtt(content: &str) -> Result<Vec<SubtitleCue>> {
    let content = content.trim_start_matches('\u{feff}');
    if !content.starts_with("WEBVTT") {
        return Err(TtsBookError::InvalidRequest(
            "Invalid VTT file format: missing WEBVTT header".to_string(),
        ));
    }

    Ok(blocks(content)
        .skip(1)
        .filter(|block| {
            !block
                .first()
                .map(|line| line.starts_with("STYLE") || line.starts_with("NOTE"))
                .unwrap_or(false)
        })
        .filter_map(|block| parse_cue_block(&block, '.'))
        .map(|mut cue| {
            cue.text = unescape_vtt(&cue.text);
            cue
        })
        .collect())
}

/// Блоки, разделенные пустыми строками
fn blocks(content: &str) -> impl Iterator<Item = Vec<&str>> {
    let mut result = Vec::new();
    let mut current = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        result.push(current);
    }
    result.into_iter()
}

/// Парсинг блока субтитра
fn parse_cue_block(lines: &[&str], fraction_separator: char) -> Option<SubtitleCue> {
    let timing_pos = lines.iter().position(|line| line.contains("-->"))?;
    let (start, end) = lines[timing_pos].split_once("-->")?;

    let start = parse_time_str(start.trim(), fraction_separator)?;
    // В VTT после времени окончания могут идти настройки реплики
    let end = parse_time_str(end.split_whitespace().next()?, fraction_separator)?;

    let index = if timing_pos > 0 {
        lines[0].trim().parse::<usize>().ok()
    } else {
        None
    };

    let text = lines[timing_pos + 1..]
        .iter()
        .map(|line| line.trim())
        .collect::<Vec<&str>>()
        .join("\n");

    Some(SubtitleCue::new(index.unwrap_or(0), start, end, text))
}

/// Парсинг строки времени в формате `HH:MM:SS.mmm` (или `MM:SS.mmm`)
fn parse_time_str(time_str: &str, fraction_separator: char) -> Option<Duration> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, *s),
        [m, s] => (0, m.parse::<u64>().ok()?, *s),
        _ => return None,
    };

    let (secs, fraction) = match seconds.split_once(fraction_separator) {
        Some((secs, fraction)) => (secs.parse::<u64>().ok()?, fraction),
        None => (seconds.parse::<u64>().ok()?, ""),
    };

    let millis = if fraction.is_empty() {
        0
    } else {
        let value = fraction.parse::<u64>().ok()?;
        match fraction.len() {
            1 => value * 100,
            2 => value * 10,
            3 => value,
            n => value / 10_u64.pow(n as u32 - 3),
        }
    };

    Some(Duration::from_millis(
        hours * 3_600_000 + minutes * 60_000 + secs * 1000 + millis,
    ))
}

fn unescape_vtt(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
