//! Фоновый обработчик заданий
//!
//! Один поток забирает задания из очереди по одному и проводит их через
//! конвейер: разбиение, разрешение голосов, синтез по фрагментам, склейка,
//! запись результата. Движок синтеза принадлежит этому потоку целиком.
//! Отмена проверяется между фрагментами; начатый вызов синтеза всегда
//! доводится до конца.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::artifacts::write_artifacts;
use crate::audio::{SpeechSynthesizer, SynthesisCache, SynthesizedAudio, TimingAssembler};
use crate::config::TtsBookConfig;
use crate::error::{Result, TtsBookError};
use crate::job::{CancellationToken, FailedChunk, Job, JobArtifacts, JobStore};
use crate::pipeline::{plan_chunks, resolve_directives};
use crate::text::{Chunk, SpeakerTagger};
use crate::utils::ffmpeg::check_ffmpeg_installed;
use crate::voice::{VoiceDirective, VoiceResolver};

/// Как часто проверять срок хранения завершенных заданий
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Итог выполнения задания
enum Outcome {
    Completed(JobArtifacts),
    Cancelled,
}

/// Причина неудачи с позицией фрагмента, если она известна
struct JobFailure {
    error: TtsBookError,
    chunk: Option<FailedChunk>,
}

impl From<TtsBookError> for JobFailure {
    fn from(error: TtsBookError) -> Self {
        Self { error, chunk: None }
    }
}

/// Обработчик заданий
pub struct Worker {
    store: Arc<JobStore>,
    config: Arc<TtsBookConfig>,
    resolver: VoiceResolver,
    synthesizer: Box<dyn SpeechSynthesizer>,
    cache: Option<SynthesisCache>,
    tagger: Option<Arc<dyn SpeakerTagger>>,
    last_cleanup: Option<Instant>,
}

impl Worker {
    pub fn new(
        store: Arc<JobStore>,
        config: Arc<TtsBookConfig>,
        resolver: VoiceResolver,
        synthesizer: Box<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            store,
            config,
            resolver,
            synthesizer,
            cache: None,
            tagger: None,
            last_cleanup: None,
        }
    }

    pub fn with_cache(mut self, cache: SynthesisCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_tagger(mut self, tagger: Arc<dyn SpeakerTagger>) -> Self {
        self.tagger = Some(tagger);
        self
    }

    /// Запустить обработчик в отдельном потоке
    pub fn spawn(self) -> Result<WorkerHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let store = Arc::clone(&self.store);
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("tts-book-worker".to_string())
            .spawn(move || self.run(&flag))
            .map_err(|e| TtsBookError::Other(anyhow::anyhow!("failed to spawn worker: {}", e)))?;

        Ok(WorkerHandle {
            shutdown,
            store,
            thread: Some(thread),
        })
    }

    /// Цикл обработки до выставления `shutdown`
    pub fn run(mut self, shutdown: &AtomicBool) {
        log::info!("Worker started using {} synthesizer", self.synthesizer.name());
        let poll = self.config.poll_interval();

        while !shutdown.load(Ordering::SeqCst) {
            match self.store.wait_next_pending(poll) {
                Some(id) => self.run_job(id),
                None => self.maybe_cleanup(),
            }
        }
        log::info!("Worker stopped");
    }

    /// Выполнить одно задание до конечного состояния
    pub fn run_job(&mut self, id: Uuid) {
        let (job, token) = match self.store.start(id) {
            Ok(started) => started,
            Err(e) => {
                log::warn!("Skipping job {}: {}", id, e);
                return;
            }
        };

        let finished = match self.execute(&job, &token) {
            Ok(Outcome::Completed(artifacts)) => self.store.complete(id, artifacts),
            Ok(Outcome::Cancelled) => self.store.mark_cancelled(id),
            Err(failure) => self.store.fail(id, &failure.error, failure.chunk),
        };
        if let Err(e) = finished {
            log::error!("Failed to finalize job {}: {}", id, e);
        }
    }

    fn execute(&mut self, job: &Job, token: &CancellationToken) -> std::result::Result<Outcome, JobFailure> {
        let id = job.id;
        let plan = plan_chunks(&job.spec, self.config.max_chunk_chars, self.tagger.as_ref())?;
        self.store.set_total(id, plan.total())?;
        self.store.log(
            id,
            format!(
                "Split {} chapter(s) into {} chunk(s)",
                plan.chapters.len(),
                plan.total()
            ),
        )?;

        let format = job.spec.defaults.audio_format;
        if format.needs_transcode() && !check_ffmpeg_installed(&self.config.ffmpeg_path) {
            return Err(TtsBookError::Configuration(format!(
                "{} output requires ffmpeg ('{}' not found)",
                format.extension(),
                self.config.ffmpeg_path
            ))
            .into());
        }

        let seed = id.as_u128() as u64;
        let directives = resolve_directives(&plan, &job.spec, &self.resolver, seed)?;

        let mut assembler = TimingAssembler::new(self.config.sample_rate);
        for (position, (chunk, directive)) in plan.chunks.iter().zip(&directives).enumerate() {
            if token.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            if let Some(chapter) = plan.chapters.iter().find(|c| c.first_chunk == position && c.chunk_count > 0) {
                self.store
                    .log(id, format!("Narrating chapter {}: {}", chapter.index, chapter.title))?;
            }

            let synthesized = self
                .synthesize_chunk(id, chunk, directive, token)
                .map_err(|error| JobFailure {
                    error,
                    chunk: Some(FailedChunk {
                        position,
                        chunk_id: chunk.id.clone(),
                    }),
                })?;
            let Some(audio) = synthesized else {
                return Ok(Outcome::Cancelled);
            };

            assembler.append(&chunk.id, &audio.samples, audio.sample_rate);
            self.store.advance(id)?;
        }

        if token.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let assembled = assembler.finalize();
        let artifacts = write_artifacts(&self.config, id, &job.spec, &plan, &assembled)?;
        Ok(Outcome::Completed(artifacts))
    }

    /// Синтез фрагмента с кэшем и повторами.
    ///
    /// `None`, если отмену запросили, пока фрагмент ждал повтора.
    fn synthesize_chunk(
        &mut self,
        job_id: Uuid,
        chunk: &Chunk,
        directive: &VoiceDirective,
        token: &CancellationToken,
    ) -> Result<Option<SynthesizedAudio>> {
        let text = chunk.speech_text();
        if let Some(audio) = self.cache.as_ref().and_then(|cache| cache.get(&text, directive)) {
            log::debug!("Cache hit for chunk {}", chunk.id);
            return Ok(Some(audio));
        }

        let attempts = self.config.synthesis_retries + 1;
        let mut backoff = self.config.retry_backoff();
        let mut attempt = 1;
        loop {
            let error = match self.synthesizer.synthesize(&text, directive) {
                Ok(audio) => {
                    if let Some(cache) = &self.cache {
                        if let Err(e) = cache.put(&text, directive, &audio) {
                            log::warn!("Failed to cache chunk {}: {}", chunk.id, e);
                        }
                    }
                    return Ok(Some(audio));
                }
                Err(e) if e.kind() == "storage" => return Err(e),
                Err(TtsBookError::Synthesis { message, .. }) => TtsBookError::synthesis(&chunk.id, message),
                Err(other) => TtsBookError::synthesis(&chunk.id, other.to_string()),
            };

            if token.is_cancelled() {
                log::info!("Chunk {} failed after cancellation; not retrying", chunk.id);
                return Ok(None);
            }
            if attempt >= attempts {
                return Err(error);
            }
            self.store.log(
                job_id,
                format!(
                    "Chunk {} failed (attempt {}/{}): {}; retrying in {} ms",
                    chunk.id,
                    attempt,
                    attempts,
                    error,
                    backoff.as_millis()
                ),
            )?;
            thread::sleep(backoff);
            if token.is_cancelled() {
                return Ok(None);
            }
            backoff *= 2;
            attempt += 1;
        }
    }

    /// Удаление заданий старше срока хранения, не чаще раза в час
    fn maybe_cleanup(&mut self) {
        let Some(days) = self.config.retention_days else {
            return;
        };
        if self
            .last_cleanup
            .map(|t| t.elapsed() < CLEANUP_INTERVAL)
            .unwrap_or(false)
        {
            return;
        }
        self.last_cleanup = Some(Instant::now());

        match self
            .store
            .cleanup_finished(Duration::from_secs(u64::from(days) * 24 * 3600))
        {
            Ok(removed) => {
                for job in removed {
                    if let Some(artifacts) = job.artifacts {
                        if let Err(e) = fs::remove_dir_all(&artifacts.directory) {
                            log::warn!("Failed to remove {}: {}", artifacts.directory.display(), e);
                        }
                    }
                }
            }
            Err(e) => log::error!("Retention cleanup failed: {}", e),
        }
    }
}

/// Управление запущенным обработчиком
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    store: Arc<JobStore>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Остановить обработчик и дождаться завершения потока.
    ///
    /// Выполняющееся задание дорабатывается до конца.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.store.wake_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Worker thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|thread| !thread.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
