//! Per-chunk navigation mesh generation. Tasks are populated from the live scene on the thread
//! that owns it, then turned into a traversability graph on worker threads through the
//! collaborators of a [GenerationContext].

pub use context::{
    ColliderCollector, CollaboratorError, ContentIndex, GenerationContext, ProbeHit, SceneQuery,
    ShapesOf, TriggerInteraction, VerticalProbe, Volume,
};
pub use geometry::{Aabb, AgentVoxels, ChunkLayout, ChunkVolume, GridGeometry, GridRegion};
pub use height::HeightRangeCache;
pub use observer::{GenerationObserver, ProfileReport, ProfilingObserver, TaskEvent};
pub use profile::{profiles_from_config, AgentProfile, LayerMask, ProfileError};
pub use scheduler::{
    BlockForAllError, BlockingWorkerPool, CompletionHook, GenerationScheduler, ThreadedWorkerPool,
    WorkerPool, WorkerReport,
};
pub use task::{
    Checkpoint, ChunkTask, CompletionCallback, GenerationEnv, GenerationError, Phase,
    PipelineStage, StopHandle, TaskKey, TaskOutcome, TaskState,
};

mod context;
pub mod geometry;
mod height;
mod observer;
mod profile;
mod scheduler;
mod task;

#[cfg(test)]
mod helpers;
