//! Кодирование и декодирование WAV через hound.

use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Result, TtsBookError};
use crate::utils::atomic::write_atomic;

/// Формат семплов в WAV-файле
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavEncoding {
    /// 16 бит целые: выходные артефакты
    Pcm16,
    /// 32 бит с плавающей точкой: кэш без потерь
    Float32,
}

impl WavEncoding {
    fn spec(&self, sample_rate: u32) -> WavSpec {
        match self {
            Self::Pcm16 => WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            Self::Float32 => WavSpec {
                channels: 1,
                sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            },
        }
    }
}

/// Атомарно записывает моно-семплы в WAV-файл.
pub fn write_wav_atomic<P: AsRef<Path>>(
    path: P,
    samples: &[f32],
    sample_rate: u32,
    encoding: WavEncoding,
) -> Result<()> {
    write_atomic(path, |file| {
        let mut writer = WavWriter::new(BufWriter::new(file), encoding.spec(sample_rate))?;
        match encoding {
            WavEncoding::Pcm16 => {
                for &sample in samples {
                    let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                    writer.write_sample(value)?;
                }
            }
            WavEncoding::Float32 => {
                for &sample in samples {
                    writer.write_sample(sample)?;
                }
            }
        }
        writer.finalize()?;
        Ok(())
    })
}

/// Декодирует WAV-файл в моно PCM (f32).
///
/// Поддерживаются 16/24/32-битные целые и 32-битные float файлы;
/// многоканальное аудио сводится в моно.
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, u32)> {
    let mut reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();

    let pcm: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        (format, bits) => {
            return Err(TtsBookError::Storage(format!(
                "Unsupported WAV format: {:?}, {} bits",
                format, bits
            )))
        }
    };

    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return Ok((pcm, spec.sample_rate));
    }
    let mono = pcm
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Количество семплов в WAV-файле без чтения данных
pub fn wav_sample_count<P: AsRef<Path>>(path: P) -> Result<(u32, u32)> {
    let reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let frames = reader.duration();
    Ok((frames, spec.sample_rate))
}
