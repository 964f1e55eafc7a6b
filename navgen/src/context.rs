//! Capabilities consumed by chunk generation. The core never talks to a scene, physics engine or
//! rasterizer directly, everything goes through these.

use misc::*;
use unit::world::ChunkLocation;

use crate::geometry::ChunkLayout;
use crate::profile::LayerMask;
use crate::task::ChunkTask;

/// Error type returned by collectors, volumes and graph builders
pub type CollaboratorError = Box<dyn Error + Send + Sync>;

/// Shapes produced by a context's collector
pub type ShapesOf<C> =
    <<C as GenerationContext>::Collector as ColliderCollector<C>>::Shapes;

pub trait GenerationContext: 'static + Send + Sync + Sized {
    /// Handle to a collidable surface in the scene. Composite objects may report the same surface
    /// several times from a single query, so this must compare by identity
    type Surface: Clone + Eq + Hash + Debug + Send;

    /// Area modifier held in the content index
    type Modifier: Send;

    type Collector: ColliderCollector<Self>;
    type Volume: Volume<Self>;

    /// Final traversability graph for one chunk and agent
    type Graph: Send;

    fn new_collector(&self, task: &ChunkTask<Self>, layout: &ChunkLayout) -> Self::Collector;

    fn new_volume(
        &self,
        task: &ChunkTask<Self>,
        layout: &ChunkLayout,
    ) -> Result<Self::Volume, CollaboratorError>;

    fn build_graph(
        &self,
        volume: &Self::Volume,
        task: &ChunkTask<Self>,
        layout: &ChunkLayout,
    ) -> Result<Self::Graph, CollaboratorError>;

    /// Commits any passability hashes registered for area modifiers, for this chunk and agent.
    /// Called at the end of content population
    fn assign_passability_hashes(&self, _task: &ChunkTask<Self>) {}
}

pub trait ColliderCollector<C: GenerationContext>: Send {
    type Shapes: Send;

    fn add_surfaces(&mut self, surfaces: Vec<C::Surface>);
    fn add_modifiers(&mut self, modifiers: Vec<C::Modifier>);

    /// Heavy lifting, runs on a worker thread
    fn collect(&mut self) -> Result<Self::Shapes, CollaboratorError>;
}

/// Intermediate voxelized representation of collected shapes. Holds resources that must be
/// released exactly once through [Volume::release]
pub trait Volume<C: GenerationContext> {
    fn add_shapes(&mut self, shapes: ShapesOf<C>);
    fn process(&mut self) -> Result<(), CollaboratorError>;
    fn release(&mut self);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerInteraction {
    Include,
    Ignore,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProbeHit {
    pub point: Vec3,
}

/// Casts against live scene geometry. Only usable from the thread that owns the scene
pub trait VerticalProbe {
    /// All hits of a box swept from `origin` along `direction`, in no particular order
    fn cast_box(
        &self,
        origin: Vec3,
        half_extents: Vec3,
        direction: Vec3,
        max_distance: f32,
        layers: LayerMask,
    ) -> Vec<ProbeHit>;
}

pub trait SceneQuery<S>: VerticalProbe {
    /// Appends every surface overlapping the box to `out`, duplicates allowed
    fn overlap_box(
        &self,
        centre: Vec3,
        extents: Vec3,
        layers: LayerMask,
        triggers: TriggerInteraction,
        out: &mut Vec<S>,
    );
}

/// Grid based index of area modifiers placed in the world
pub trait ContentIndex<M> {
    /// Diagnostics only
    fn content_count(&self, chunk: ChunkLocation) -> usize;

    fn content_at(&self, chunk: ChunkLocation, out: &mut Vec<M>);
}
