//! Модуль заданий
//!
//! Модель задания, кооперативная отмена, долговременное хранение записей
//! и общее хранилище с очередью.

pub mod cancel;
pub mod model;
pub mod persistence;
pub mod store;

pub use cancel::CancellationToken;
pub use model::{
    ChapterInput, ChapterOverride, FailedChunk, Job, JobArtifacts, JobDefaults, JobSpec, JobState,
    JobStatus, Progress,
};
pub use persistence::{JobPersistence, JsonDirPersistence, MemoryPersistence};
pub use store::JobStore;
