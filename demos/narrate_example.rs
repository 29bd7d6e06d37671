//! Пример использования библиотеки tts-book
//!
//! Ставит в очередь книгу из трех глав, озвучивает ее синусоидальным движком
//! и печатает статус и пути к готовым файлам.

use std::time::Duration;

use tts_book::logger::init_logger;
use tts_book::notification::LogProgressObserver;
use tts_book::{
    ChapterInput, ChapterOverride, JobSpec, JobState, SubtitleFormat, ToneSynthesizer, TtsBook,
    TtsBookConfig,
};

fn main() -> anyhow::Result<()> {
    init_logger();

    let config = TtsBookConfig::default().apply_env()?;
    let synthesizer = ToneSynthesizer::new(config.sample_rate, 170.0);
    let mut book = TtsBook::new(config, Box::new(synthesizer))?;
    book.add_observer(Box::new(LogProgressObserver::with_prefix("[demo] ")));

    let mut spec = JobSpec::new(
        "The Time Machine",
        vec![
            ChapterInput::new(
                1,
                "Introduction",
                "The Time Traveller was expounding a recondite matter to us.\n\n\
                 His grey eyes shone and twinkled.",
            ),
            ChapterInput::new(
                2,
                "The Machine",
                "The thing the Time Traveller held in his hand was a glittering metallic framework.",
            ),
            ChapterInput::new(
                3,
                "The Return",
                "I am afraid I cannot convey the peculiar sensations of time travelling.",
            ),
        ],
    )
    .with_override(
        2,
        ChapterOverride {
            voice: Some("am_adam*0.7+am_michael*0.3".to_string()),
            speed: Some(1.1),
            ..ChapterOverride::default()
        },
    );
    spec.defaults.voice = "af_bella*0.5+af_sky*0.5".to_string();
    spec.defaults.subtitle_format = SubtitleFormat::Vtt;

    let id = book.submit(spec)?.to_string();
    println!("Submitted job {}", id);

    let status = book.wait_for(&id, Duration::from_secs(60))?;
    println!("{}", book.status_json(&id)?);

    match status.state {
        JobState::Completed => {
            if let Some(artifacts) = status.artifacts {
                println!("Audio:     {}", artifacts.audio.display());
                if let Some(subtitles) = artifacts.subtitles {
                    println!("Subtitles: {}", subtitles.display());
                }
                println!("Chapters:  {}", artifacts.chapters.display());
            }
        }
        state => println!("Job ended as {}: {:?}", state, status.error),
    }

    book.shutdown();
    Ok(())
}
