//! Построение субтитров по записям времени и их сериализация
//!
//! Каждая запись времени, заметная на миллисекундной шкале, превращается в одну реплику
//! с исходным текстом фрагмента. Нумерация реплик сплошная, с единицы.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::audio::TimingRecord;
use crate::config::SubtitleFormat;
use crate::subtitle::types::{SubtitleCue, SubtitleStyle};
use crate::text::Chunk;

/// Построить реплики по записям времени.
///
/// Пропускаются фрагменты, у которых начало и конец совпадают с точностью
/// до миллисекунды: такая реплика не была бы видна.
pub fn cues_from_timings(records: &[TimingRecord], chunks: &[Chunk]) -> Vec<SubtitleCue> {
    let texts: HashMap<&str, &str> = chunks
        .iter()
        .map(|chunk| (chunk.id.as_str(), chunk.text.as_str()))
        .collect();

    let mut cues = Vec::with_capacity(records.len());
    for record in records {
        if record.is_empty() || record.start().as_millis() == record.end().as_millis() {
            log::debug!("Skipping zero-length chunk {} in subtitles", record.chunk_id);
            continue;
        }
        let Some(text) = texts.get(record.chunk_id.as_str()) else {
            log::warn!("No text for timing record {}", record.chunk_id);
            continue;
        };
        cues.push(SubtitleCue::new(
            cues.len() + 1,
            record.start(),
            record.end(),
            *text,
        ));
    }
    cues
}

/// Сериализовать реплики в выбранный формат; `None` для `SubtitleFormat::None`
pub fn render(
    format: SubtitleFormat,
    cues: &[SubtitleCue],
    style: &SubtitleStyle,
    title: &str,
) -> Option<String> {
    match format {
        SubtitleFormat::None => None,
        SubtitleFormat::Srt => Some(render_srt(cues)),
        SubtitleFormat::Vtt => Some(render_vtt(cues, Some(style))),
        SubtitleFormat::Ass => Some(render_ass(cues, style, title)),
    }
}

/// SubRip
pub fn render_srt(cues: &[SubtitleCue]) -> String {
    let mut out = String::new();
    for cue in cues {
        let _ = writeln!(out, "{}", cue.index);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_srt_time(cue.start),
            format_srt_time(cue.end)
        );
        for line in text_lines(&cue.text) {
            let _ = writeln!(out, "{}", line);
        }
        out.push('\n');
    }
    out
}

/// WebVTT, с блоком STYLE если задано оформление
pub fn render_vtt(cues: &[SubtitleCue], style: Option<&SubtitleStyle>) -> String {
    let mut out = String::from("WEBVTT\n\n");

    if let Some(style) = style {
        out.push_str("STYLE\n::cue {\n");
        let _ = writeln!(out, "  font-family: {};", style.font_name);
        let _ = writeln!(out, "  font-size: {}px;", style.font_size);
        let _ = writeln!(out, "  color: {};", style.primary_color);
        let _ = writeln!(out, "  text-shadow: 0 0 2px {};", style.outline_color);
        if style.bold {
            out.push_str("  font-weight: bold;\n");
        }
        out.push_str("}\n\n");
    }

    for cue in cues {
        let _ = writeln!(out, "{}", cue.index);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_vtt_time(cue.start),
            format_vtt_time(cue.end)
        );
        for line in text_lines(&cue.text) {
            let _ = writeln!(out, "{}", escape_vtt(line));
        }
        out.push('\n');
    }
    out
}

/// Advanced SubStation Alpha
pub fn render_ass(cues: &[SubtitleCue], style: &SubtitleStyle, title: &str) -> String {
    let mut out = String::new();
    out.push_str("[Script Info]\n");
    let _ = writeln!(out, "Title: {}", title);
    out.push_str("ScriptType: v4.00+\n");
    out.push_str("WrapStyle: 0\n");
    out.push_str("ScaledBorderAndShadow: yes\n\n");

    out.push_str("[V4+ Styles]\n");
    out.push_str(
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, \
         BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, \
         BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding\n",
    );
    let _ = writeln!(
        out,
        "Style: Default,{},{},{},&H000000FF,{},&H80000000,{},0,0,0,100,100,0,0,1,2,0,{},10,10,10,1",
        style.font_name,
        style.font_size,
        ass_color(&style.primary_color),
        ass_color(&style.outline_color),
        if style.bold { -1 } else { 0 },
        style.alignment
    );
    out.push('\n');

    out.push_str("[Events]\n");
    out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
    for cue in cues {
        let text = text_lines(&cue.text).collect::<Vec<_>>().join("\\N");
        let _ = writeln!(
            out,
            "Dialogue: 0,{},{},Default,,0,0,0,,{}",
            format_ass_time(cue.start),
            format_ass_time(cue.end),
            text
        );
    }
    out
}

/// `HH:MM:SS,mmm`
pub fn format_srt_time(time: Duration) -> String {
    let (h, m, s, ms) = split_time(time);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// `HH:MM:SS.mmm`
pub fn format_vtt_time(time: Duration) -> String {
    let (h, m, s, ms) = split_time(time);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// `H:MM:SS.cc`
pub fn format_ass_time(time: Duration) -> String {
    let (h, m, s, ms) = split_time(time);
    format!("{}:{:02}:{:02}.{:02}", h, m, s, ms / 10)
}

fn split_time(time: Duration) -> (u128, u128, u128, u128) {
    let total_ms = time.as_millis();
    (
        total_ms / 3_600_000,
        (total_ms / 60_000) % 60,
        (total_ms / 1000) % 60,
        total_ms % 1000,
    )
}

/// Непустые строки текста без пробелов по краям
fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !line.is_empty())
}

fn escape_vtt(line: &str) -> String {
    line.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `#RRGGBB` -> `&H00BBGGRR`
fn ass_color(color: &str) -> String {
    let hex = color.trim_start_matches('#');
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        let (r, g, b) = (&hex[0..2], &hex[2..4], &hex[4..6]);
        format!("&H00{}{}{}", b, g, r).to_uppercase()
    } else {
        log::warn!("Invalid subtitle color '{}', using white", color);
        "&H00FFFFFF".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::Granularity;

    fn chunk(seq: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::make_id(0, Granularity::Paragraph, seq),
            chapter_index: 0,
            sequence: seq,
            text: text.to_string(),
            speaker: None,
        }
    }

    fn record(seq: usize, start: u64, count: u64) -> TimingRecord {
        TimingRecord {
            chunk_id: Chunk::make_id(0, Granularity::Paragraph, seq),
            start_sample: start,
            sample_count: count,
            sample_rate: 1_000,
        }
    }

    #[test]
    fn test_zero_length_records_are_skipped() {
        let chunks = vec![chunk(0, "First."), chunk(1, "   "), chunk(2, "Third.")];
        let records = vec![record(0, 0, 1_500), record(1, 1_500, 0), record(2, 1_500, 500)];

        let cues = cues_from_timings(&records, &chunks);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[1].index, 2);
        assert_eq!(cues[1].text, "Third.");
        assert_eq!(cues[1].start, Duration::from_millis(1_500));
        assert_eq!(cues[1].end, Duration::from_millis(2_000));
    }

    #[test]
    fn test_sub_millisecond_records_are_skipped() {
        let chunks = vec![chunk(0, "Blip."), chunk(1, "Second.")];
        let records = vec![
            TimingRecord {
                sample_rate: 24_000,
                ..record(0, 0, 1)
            },
            TimingRecord {
                sample_rate: 24_000,
                ..record(1, 1, 24_000)
            },
        ];

        let cues = cues_from_timings(&records, &chunks);
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[0].text, "Second.");
        assert!(render_srt(&cues).starts_with("1\n00:00:00,000 --> 00:00:01,000\n"));
    }

    #[test]
    fn test_time_formats() {
        let t = Duration::from_millis(3_723_456);
        assert_eq!(format_srt_time(t), "01:02:03,456");
        assert_eq!(format_vtt_time(t), "01:02:03.456");
        assert_eq!(format_ass_time(t), "1:02:03.45");
    }

    #[test]
    fn test_render_srt() {
        let cues = vec![
            SubtitleCue::new(1, Duration::ZERO, Duration::from_millis(1_200), "Hello there."),
            SubtitleCue::new(2, Duration::from_millis(1_200), Duration::from_secs(2), "Line one\nline two"),
        ];
        let srt = render_srt(&cues);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,200\nHello there.\n\n\
             2\n00:00:01,200 --> 00:00:02,000\nLine one\nline two\n\n"
        );
    }

    #[test]
    fn test_render_vtt_with_style() {
        let cues = vec![SubtitleCue::new(1, Duration::ZERO, Duration::from_secs(1), "a < b")];
        let style = SubtitleStyle {
            bold: true,
            ..SubtitleStyle::default()
        };
        let vtt = render_vtt(&cues, Some(&style));
        assert!(vtt.starts_with("WEBVTT\n\nSTYLE\n::cue {"));
        assert!(vtt.contains("font-weight: bold;"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:01.000\na &lt; b\n"));
    }

    #[test]
    fn test_render_ass() {
        let cues = vec![SubtitleCue::new(1, Duration::from_millis(10), Duration::from_secs(1), "One\nTwo")];
        let style = SubtitleStyle {
            primary_color: "#FF8000".to_string(),
            ..SubtitleStyle::default()
        };
        let ass = render_ass(&cues, &style, "Book");
        assert!(ass.contains("Title: Book"));
        assert!(ass.contains("Style: Default,Arial,24,&H000080FF,"));
        assert!(ass.contains("Dialogue: 0,0:00:00.01,0:00:01.00,Default,,0,0,0,,One\\NTwo"));
    }

    #[test]
    fn test_render_none() {
        assert!(render(SubtitleFormat::None, &[], &SubtitleStyle::default(), "x").is_none());
    }
}
