//! One unit of navmesh generation: a chunk column for one agent profile. Driven through three
//! phases by a scheduler:
//!
//! 1. [ChunkTask::populate_host] on the thread that owns the scene, resolves the chunk height,
//!    derives the voxel grid and gathers colliding surfaces
//! 2. [ChunkTask::populate_content] on any thread, adds area modifiers
//! 3. [ChunkTask::thread_worker] on a worker thread, builds the volume and then the graph
//!
//! [ChunkTask::stop] may be called at any time from anywhere. It is only observed at fixed
//! checkpoints during phase 3.

use std::hash::Hasher;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use misc::*;
use unit::world::ChunkLocation;

use crate::context::{
    ColliderCollector, CollaboratorError, ContentIndex, GenerationContext, SceneQuery,
    TriggerInteraction, Volume,
};
use crate::geometry::{ChunkLayout, ChunkVolume};
use crate::height::HeightRangeCache;
use crate::observer::{GenerationObserver, ProfilingObserver, TaskEvent};
use crate::profile::{AgentProfile, ProfileError};

/// Invoked on the worker thread once the graph is ready
pub type CompletionCallback<C> = Box<dyn FnOnce(&mut ChunkTask<C>) + Send>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Created,
    HostPopulated,
    ContentPopulated,
    Generating,
    Done,
    Aborted,
    Failed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Host,
    Content,
    Generation,
}

/// Where a stopped task noticed it was stopped
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    BeforeCollect,
    AfterCollect,
    AfterVolume,
    AfterGraph,
    BeforeCallback,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Collect,
    Volume,
    Graph,
}

slog_value_debug!(TaskState);
slog_value_debug!(Checkpoint);
slog_value_debug!(PipelineStage);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Graph was built and the callback invoked
    Completed,
    Aborted(Checkpoint),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Invalid agent profile: {0}")]
    InvalidProfile(#[from] ProfileError),

    #[error("Invalid grid: {0}")]
    InvalidGrid(&'static str),

    #[error("Cannot run {phase:?} phase in state {state:?}")]
    OutOfOrder { phase: Phase, state: TaskState },

    #[error("{stage:?} stage failed: {source}")]
    Collaborator {
        stage: PipelineStage,
        #[source]
        source: CollaboratorError,
    },
}

/// Cancellation flag shared between a task and whoever may want to stop it
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Identity of a task. Equal only for the same chunk and the same profile *instance*, a
/// different instance with identical values is a different agent type
#[derive(Clone, Debug)]
pub struct TaskKey {
    pub chunk: ChunkLocation,
    pub profile: Arc<AgentProfile>,
}

impl TaskKey {
    pub fn matches(&self, chunk: ChunkLocation, profile: &Arc<AgentProfile>) -> bool {
        self.chunk == chunk && Arc::ptr_eq(&self.profile, profile)
    }
}

impl PartialEq for TaskKey {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.chunk, &other.profile)
    }
}

impl Eq for TaskKey {}

impl Hash for TaskKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chunk.hash(state);
        std::ptr::hash(Arc::as_ptr(&self.profile), state);
    }
}

/// State shared by every task: the collaborators, the height range cache and the grid settings
pub struct GenerationEnv<C: GenerationContext> {
    context: C,
    heights: HeightRangeCache,
    grid: config::Grid,
    observer: Option<Arc<dyn GenerationObserver>>,
}

impl<C: GenerationContext> GenerationEnv<C> {
    pub fn new(context: C, grid: config::Grid) -> Result<Self, GenerationError> {
        if !(grid.cell_size.is_finite() && grid.cell_size > 0.0) {
            return Err(GenerationError::InvalidGrid("cell size must be positive"));
        }

        if grid.lowest > grid.highest {
            return Err(GenerationError::InvalidGrid(
                "lowest layer is above highest layer",
            ));
        }

        Ok(Self {
            context,
            heights: HeightRangeCache::default(),
            grid,
            observer: None,
        })
    }

    /// Attaches a [ProfilingObserver] if profiling is enabled
    pub fn from_config(context: C, config: &config::Config) -> Result<Self, GenerationError> {
        let env = Self::new(context, config.grid)?;
        Ok(if config.generation.profiling {
            env.with_observer(Arc::new(ProfilingObserver::default()))
        } else {
            env
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn GenerationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn heights(&self) -> &HeightRangeCache {
        &self.heights
    }

    pub fn grid(&self) -> &config::Grid {
        &self.grid
    }
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ChunkTask<C: GenerationContext> {
    #[derivative(Debug = "ignore")]
    env: Arc<GenerationEnv<C>>,
    chunk: ChunkLocation,
    profile: Arc<AgentProfile>,
    stop: StopHandle,
    state: TaskState,

    /// Set in host population
    layout: Option<ChunkLayout>,
    #[derivative(Debug = "ignore")]
    collector: Option<C::Collector>,

    #[derivative(Debug = "ignore")]
    graph: Option<C::Graph>,
    #[derivative(Debug = "ignore")]
    callback: Option<CompletionCallback<C>>,
}

/// Releases the volume exactly once, on whichever path drops it
struct VolumeGuard<C: GenerationContext>(C::Volume);

impl<C: GenerationContext> Drop for VolumeGuard<C> {
    fn drop(&mut self) {
        self.0.release();
    }
}

impl<C: GenerationContext> ChunkTask<C> {
    pub fn new(
        env: Arc<GenerationEnv<C>>,
        chunk: ChunkLocation,
        profile: Arc<AgentProfile>,
    ) -> Result<Self, GenerationError> {
        profile.validate()?;
        Ok(Self {
            env,
            chunk,
            profile,
            stop: StopHandle::default(),
            state: TaskState::Created,
            layout: None,
            collector: None,
            graph: None,
            callback: None,
        })
    }

    pub fn with_callback(mut self, callback: CompletionCallback<C>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn set_callback(&mut self, callback: CompletionCallback<C>) {
        self.callback = Some(callback);
    }

    pub fn chunk(&self) -> ChunkLocation {
        self.chunk
    }

    pub fn profile(&self) -> &Arc<AgentProfile> {
        &self.profile
    }

    pub fn key(&self) -> TaskKey {
        TaskKey {
            chunk: self.chunk,
            profile: self.profile.clone(),
        }
    }

    pub fn matches(&self, chunk: ChunkLocation, profile: &Arc<AgentProfile>) -> bool {
        self.chunk == chunk && Arc::ptr_eq(&self.profile, profile)
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Only set once host population has run
    pub fn layout(&self) -> Option<&ChunkLayout> {
        self.layout.as_ref()
    }

    pub fn chunk_volume(&self) -> Option<&ChunkVolume> {
        self.layout.as_ref().map(|layout| &layout.volume)
    }

    pub fn graph(&self) -> Option<&C::Graph> {
        self.graph.as_ref()
    }

    pub fn take_graph(&mut self) -> Option<C::Graph> {
        self.graph.take()
    }

    pub fn ignored_tags_contains(&self, tag: &str) -> bool {
        self.profile.ignored_tags.iter().any(|t| t == tag)
    }

    /// Never blocks, the task notices at its next checkpoint
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    fn expect_state(&self, phase: Phase, expected: TaskState) -> Result<(), GenerationError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(GenerationError::OutOfOrder {
                phase,
                state: self.state,
            })
        }
    }

    fn notify(&self, event: TaskEvent) {
        if let Some(observer) = self.env.observer.as_ref() {
            observer.on_event(self.chunk, &self.profile, event);
        }
    }

    /// Must run on the thread that owns the scene, and before any other phase
    pub fn populate_host<Q>(&mut self, scene: &Q) -> Result<(), GenerationError>
    where
        Q: SceneQuery<C::Surface> + ?Sized,
    {
        self.expect_state(Phase::Host, TaskState::Created)?;
        let env = self.env.clone();
        let chunk = self.chunk;

        let range = env
            .heights
            .resolve(chunk, &env.grid, self.profile.included_layers, scene);
        let volume = ChunkVolume::new(chunk, range, env.grid.cell_size);
        let layout = ChunkLayout::new(volume, &self.profile)?;

        // queries can report the same surface many times for composite objects
        let bounds = layout.geometry.bled_bounds;
        let mut reported = Vec::new();
        scene.overlap_box(
            bounds.centre,
            bounds.extents(),
            self.profile.included_layers,
            TriggerInteraction::Ignore,
            &mut reported,
        );
        let total_reported = reported.len();
        let surfaces = reported.into_iter().unique().collect_vec();

        debug!("populated task on host"; chunk, range, "profile" => &self.profile.name,
            "surfaces" => surfaces.len(), "duplicates" => total_reported - surfaces.len(),
            "extra_offset" => layout.geometry.extra_offset);

        let surface_count = surfaces.len();
        let mut collector = env.context.new_collector(self, &layout);
        collector.add_surfaces(surfaces);

        self.layout = Some(layout);
        self.collector = Some(collector);
        self.state = TaskState::HostPopulated;
        self.notify(TaskEvent::HostPopulated {
            surfaces: surface_count,
        });
        Ok(())
    }

    /// Can run on any thread, after [populate_host](Self::populate_host)
    pub fn populate_content<I>(&mut self, content: &I) -> Result<(), GenerationError>
    where
        I: ContentIndex<C::Modifier> + ?Sized,
    {
        self.expect_state(Phase::Content, TaskState::HostPopulated)?;
        let chunk = self.chunk;

        let total = content.content_count(chunk);
        let mut modifiers = Vec::new();
        content.content_at(chunk, &mut modifiers);
        let modifier_count = modifiers.len();
        trace!("populating content"; chunk, "modifiers" => modifier_count, "total" => total);

        let collector = self.collector.as_mut().ok_or(GenerationError::OutOfOrder {
            phase: Phase::Content,
            state: self.state,
        })?;
        collector.add_modifiers(modifiers);

        self.env.context.assign_passability_hashes(self);

        self.state = TaskState::ContentPopulated;
        self.notify(TaskEvent::ContentPopulated {
            modifiers: modifier_count,
            content: total,
        });
        Ok(())
    }

    /// Entry point for worker threads. A missing or unpopulated task is logged and ignored.
    /// Failures are logged with the task details and then propagated, panics included
    pub fn thread_worker(task: Option<&mut Self>) -> Result<Option<TaskOutcome>, GenerationError> {
        let task = match task {
            Some(task) if task.state == TaskState::ContentPopulated => task,
            Some(task) => {
                error!("invalid task passed to worker"; task.chunk, "state" => task.state);
                return Ok(None);
            }
            None => {
                error!("no task passed to worker");
                return Ok(None);
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| task.generate_graph())) {
            Ok(Ok(outcome)) => Ok(Some(outcome)),
            Ok(Err(err)) => {
                error!("navmesh generation failed"; task.chunk, "profile" => &task.profile.name,
                    "state" => task.state, "error" => %err);
                Err(err)
            }
            Err(payload) => {
                // a panicking callback runs after the task has already finished
                if task.state != TaskState::Done {
                    task.state = TaskState::Failed;
                    task.notify(TaskEvent::Failed);
                }

                let message = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<unknown>");
                crit!("navmesh generation panicked"; task.chunk, "profile" => &task.profile.name,
                    "message" => message);
                panic::resume_unwind(payload)
            }
        }
    }

    /// Phase 3, on a worker thread after both population phases
    pub fn generate_graph(&mut self) -> Result<TaskOutcome, GenerationError> {
        self.expect_state(Phase::Generation, TaskState::ContentPopulated)?;
        self.state = TaskState::Generating;
        self.notify(TaskEvent::GenerationStarted);

        let result = self.run_pipeline();
        if result.is_err() {
            self.state = TaskState::Failed;
            self.notify(TaskEvent::Failed);
        }
        result
    }

    fn run_pipeline(&mut self) -> Result<TaskOutcome, GenerationError> {
        let env = self.env.clone();
        let out_of_order = GenerationError::OutOfOrder {
            phase: Phase::Generation,
            state: self.state,
        };
        let (layout, mut collector) = match (self.layout, self.collector.take()) {
            (Some(layout), Some(collector)) => (layout, collector),
            _ => return Err(out_of_order),
        };

        if let Some(outcome) = self.checkpoint(Checkpoint::BeforeCollect) {
            return Ok(outcome);
        }

        let shapes = collector
            .collect()
            .map_err(|source| GenerationError::Collaborator {
                stage: PipelineStage::Collect,
                source,
            })?;
        drop(collector);
        self.notify(TaskEvent::StageFinished(PipelineStage::Collect));

        if let Some(outcome) = self.checkpoint(Checkpoint::AfterCollect) {
            return Ok(outcome);
        }

        // from here the volume is released whenever the guard goes out of scope
        let volume_err = |source: CollaboratorError| GenerationError::Collaborator {
            stage: PipelineStage::Volume,
            source,
        };
        let volume = env.context.new_volume(self, &layout).map_err(volume_err)?;
        let mut volume = VolumeGuard::<C>(volume);
        volume.0.add_shapes(shapes);
        volume.0.process().map_err(volume_err)?;
        self.notify(TaskEvent::StageFinished(PipelineStage::Volume));

        if let Some(outcome) = self.checkpoint(Checkpoint::AfterVolume) {
            return Ok(outcome);
        }

        let graph = env.context.build_graph(&volume.0, self, &layout);
        drop(volume);
        let graph = graph.map_err(|source| GenerationError::Collaborator {
            stage: PipelineStage::Graph,
            source,
        })?;
        self.notify(TaskEvent::StageFinished(PipelineStage::Graph));

        if let Some(outcome) = self.checkpoint(Checkpoint::AfterGraph) {
            return Ok(outcome);
        }

        self.graph = Some(graph);
        self.notify(TaskEvent::GraphReady);

        if let Some(outcome) = self.checkpoint(Checkpoint::BeforeCallback) {
            self.graph = None;
            return Ok(outcome);
        }

        self.state = TaskState::Done;
        self.notify(TaskEvent::Finished);
        debug!("generated graph"; self.chunk, "profile" => &self.profile.name);

        if let Some(callback) = self.callback.take() {
            callback(self);
        }

        Ok(TaskOutcome::Completed)
    }

    fn checkpoint(&mut self, checkpoint: Checkpoint) -> Option<TaskOutcome> {
        if !self.stop.is_stopped() {
            return None;
        }

        debug!("task stopped"; self.chunk, "profile" => &self.profile.name, "at" => checkpoint);
        self.state = TaskState::Aborted;
        self.notify(TaskEvent::Aborted(checkpoint));
        Some(TaskOutcome::Aborted(checkpoint))
    }
}

impl<C: GenerationContext> Drop for ChunkTask<C> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            TaskState::HostPopulated | TaskState::ContentPopulated | TaskState::Generating
        ) {
            trace!("dropping unfinished task"; self.chunk, "state" => self.state);
            self.notify(TaskEvent::Dropped);
        }
    }
}

impl<C: GenerationContext> PartialEq for ChunkTask<C> {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.chunk, &other.profile)
    }
}

impl<C: GenerationContext> Eq for ChunkTask<C> {}

impl<C: GenerationContext> Hash for ChunkTask<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.chunk.hash(state);
        std::ptr::hash(Arc::as_ptr(&self.profile), state);
    }
}
