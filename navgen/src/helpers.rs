//! Fixtures shared by tests: an in-memory scene, a content index and a context whose collaborators
//! only record what they were given

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use misc::parking_lot::Mutex;
use misc::*;
use unit::world::ChunkLocation;

use crate::context::{
    ColliderCollector, CollaboratorError, ContentIndex, GenerationContext, ProbeHit, SceneQuery,
    TriggerInteraction, VerticalProbe, Volume,
};
use crate::geometry::{Aabb, ChunkLayout};
use crate::profile::{AgentProfile, LayerMask};
use crate::task::{ChunkTask, GenerationEnv, PipelineStage, StopHandle};

/// 10 unit chunks, probed from layer -10 to 10
pub fn test_grid() -> config::Grid {
    config::Grid {
        cell_size: 10.0,
        lowest: -10,
        highest: 10,
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u32);

#[derive(Default)]
pub struct FixtureScene {
    /// Hit heights per chunk column
    columns: HashMap<ChunkLocation, Vec<f32>>,
    surfaces: Vec<(SurfaceId, Aabb, u8)>,
    /// Report every surface this many extra times
    duplicates: usize,
    probes: AtomicUsize,
    overlaps: Mutex<Vec<(Vec3, Vec3, LayerMask, TriggerInteraction)>>,
}

impl FixtureScene {
    pub fn with_column_hits(
        mut self,
        chunk: (i32, i32),
        heights: impl IntoIterator<Item = f32>,
    ) -> Self {
        self.columns
            .entry(chunk.into())
            .or_default()
            .extend(heights);
        self
    }

    pub fn with_surface(mut self, id: u32, min: Vec3, size: Vec3, layer: u8) -> Self {
        self.surfaces
            .push((SurfaceId(id), Aabb::from_min_size(min, size), layer));
        self
    }

    pub fn with_duplicates(mut self, n: usize) -> Self {
        self.duplicates = n;
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Every overlap query made so far
    pub fn overlaps(&self) -> Vec<(Vec3, Vec3, LayerMask, TriggerInteraction)> {
        self.overlaps.lock().clone()
    }
}

impl VerticalProbe for FixtureScene {
    fn cast_box(
        &self,
        origin: Vec3,
        _: Vec3,
        _: Vec3,
        _: f32,
        _: LayerMask,
    ) -> Vec<ProbeHit> {
        self.probes.fetch_add(1, Ordering::SeqCst);

        let cell = test_grid().cell_size;
        let chunk = ChunkLocation(
            (origin.x / cell).floor() as i32,
            (origin.z / cell).floor() as i32,
        );

        self.columns
            .get(&chunk)
            .map(|heights| {
                heights
                    .iter()
                    .map(|y| ProbeHit {
                        point: vec3(origin.x, *y, origin.z),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl SceneQuery<SurfaceId> for FixtureScene {
    fn overlap_box(
        &self,
        centre: Vec3,
        extents: Vec3,
        layers: LayerMask,
        triggers: TriggerInteraction,
        out: &mut Vec<SurfaceId>,
    ) {
        self.overlaps.lock().push((centre, extents, layers, triggers));

        let query = Aabb {
            centre,
            size: extents * 2.0,
        };
        for (id, bounds, layer) in &self.surfaces {
            if layers.contains(*layer) && bounds.intersects(&query) {
                out.extend(std::iter::repeat(*id).take(1 + self.duplicates));
            }
        }
    }
}

#[derive(Default)]
pub struct FixtureContent {
    modifiers: HashMap<ChunkLocation, Vec<u32>>,
}

impl FixtureContent {
    pub fn with_modifiers(
        mut self,
        chunk: (i32, i32),
        modifiers: impl IntoIterator<Item = u32>,
    ) -> Self {
        self.modifiers
            .entry(chunk.into())
            .or_default()
            .extend(modifiers);
        self
    }
}

impl ContentIndex<u32> for FixtureContent {
    fn content_count(&self, chunk: ChunkLocation) -> usize {
        self.modifiers.get(&chunk).map(Vec::len).unwrap_or_default()
    }

    fn content_at(&self, chunk: ChunkLocation, out: &mut Vec<u32>) {
        if let Some(modifiers) = self.modifiers.get(&chunk) {
            out.extend_from_slice(modifiers);
        }
    }
}

/// Collaborators that record everything, with hooks to fail, panic or stop the task at a stage
#[derive(Default, Clone)]
pub struct DummyContext(Arc<DummyShared>);

#[derive(Default)]
struct DummyShared {
    fail_at: Mutex<Option<PipelineStage>>,
    panic_at: Mutex<Option<PipelineStage>>,
    stop_after: Mutex<Option<(PipelineStage, StopHandle)>>,

    collectors: AtomicUsize,
    volumes_created: AtomicUsize,
    volumes_released: AtomicUsize,
    graphs: AtomicUsize,
    hashes_assigned: AtomicUsize,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DummyStats {
    pub collectors: usize,
    pub volumes_created: usize,
    pub volumes_released: usize,
    pub graphs: usize,
    pub hashes_assigned: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DummyShapes {
    pub surfaces: Vec<SurfaceId>,
    pub modifiers: Vec<u32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DummyGraph {
    pub chunk: ChunkLocation,
    pub profile: String,
    pub layout: ChunkLayout,
    pub shapes: DummyShapes,
}

pub struct DummyCollector {
    shared: Arc<DummyShared>,
    shapes: DummyShapes,
}

pub struct DummyVolume {
    shared: Arc<DummyShared>,
    shapes: Option<DummyShapes>,
    processed: bool,
    released: bool,
}

impl DummyContext {
    pub fn failing_at(self, stage: PipelineStage) -> Self {
        *self.0.fail_at.lock() = Some(stage);
        self
    }

    pub fn panicking_at(self, stage: PipelineStage) -> Self {
        *self.0.panic_at.lock() = Some(stage);
        self
    }

    /// Stops the task once the given stage has finished, as if from another thread
    pub fn stop_after(&self, stage: PipelineStage, handle: StopHandle) {
        *self.0.stop_after.lock() = Some((stage, handle));
    }

    pub fn stats(&self) -> DummyStats {
        let load = |n: &AtomicUsize| n.load(Ordering::SeqCst);
        DummyStats {
            collectors: load(&self.0.collectors),
            volumes_created: load(&self.0.volumes_created),
            volumes_released: load(&self.0.volumes_released),
            graphs: load(&self.0.graphs),
            hashes_assigned: load(&self.0.hashes_assigned),
        }
    }
}

impl DummyShared {
    fn stage(&self, stage: PipelineStage) -> Result<(), CollaboratorError> {
        if *self.panic_at.lock() == Some(stage) {
            panic!("dummy panic in {:?}", stage);
        }

        if *self.fail_at.lock() == Some(stage) {
            return Err(format!("dummy failure in {:?}", stage).into());
        }

        Ok(())
    }

    fn finished(&self, stage: PipelineStage) {
        if let Some((at, handle)) = self.stop_after.lock().as_ref() {
            if *at == stage {
                handle.stop();
            }
        }
    }
}

impl GenerationContext for DummyContext {
    type Surface = SurfaceId;
    type Modifier = u32;
    type Collector = DummyCollector;
    type Volume = DummyVolume;
    type Graph = DummyGraph;

    fn new_collector(&self, _: &ChunkTask<Self>, _: &ChunkLayout) -> Self::Collector {
        self.0.collectors.fetch_add(1, Ordering::SeqCst);
        DummyCollector {
            shared: self.0.clone(),
            shapes: DummyShapes::default(),
        }
    }

    fn new_volume(
        &self,
        _: &ChunkTask<Self>,
        _: &ChunkLayout,
    ) -> Result<Self::Volume, CollaboratorError> {
        self.0.volumes_created.fetch_add(1, Ordering::SeqCst);
        Ok(DummyVolume {
            shared: self.0.clone(),
            shapes: None,
            processed: false,
            released: false,
        })
    }

    fn build_graph(
        &self,
        volume: &Self::Volume,
        task: &ChunkTask<Self>,
        layout: &ChunkLayout,
    ) -> Result<Self::Graph, CollaboratorError> {
        assert!(volume.processed, "graph built from unprocessed volume");
        assert!(!volume.released, "graph built from released volume");
        self.0.stage(PipelineStage::Graph)?;

        self.0.graphs.fetch_add(1, Ordering::SeqCst);
        let graph = DummyGraph {
            chunk: task.chunk(),
            profile: task.profile().name.clone(),
            layout: *layout,
            shapes: volume.shapes.clone().unwrap_or_default(),
        };
        self.0.finished(PipelineStage::Graph);
        Ok(graph)
    }

    fn assign_passability_hashes(&self, _: &ChunkTask<Self>) {
        self.0.hashes_assigned.fetch_add(1, Ordering::SeqCst);
    }
}

impl ColliderCollector<DummyContext> for DummyCollector {
    type Shapes = DummyShapes;

    fn add_surfaces(&mut self, surfaces: Vec<SurfaceId>) {
        self.shapes.surfaces.extend(surfaces);
    }

    fn add_modifiers(&mut self, modifiers: Vec<u32>) {
        self.shapes.modifiers.extend(modifiers);
    }

    fn collect(&mut self) -> Result<Self::Shapes, CollaboratorError> {
        self.shared.stage(PipelineStage::Collect)?;
        let shapes = std::mem::take(&mut self.shapes);
        self.shared.finished(PipelineStage::Collect);
        Ok(shapes)
    }
}

impl Volume<DummyContext> for DummyVolume {
    fn add_shapes(&mut self, shapes: DummyShapes) {
        self.shapes = Some(shapes);
    }

    fn process(&mut self) -> Result<(), CollaboratorError> {
        self.shared.stage(PipelineStage::Volume)?;
        self.processed = true;
        self.shared.finished(PipelineStage::Volume);
        Ok(())
    }

    fn release(&mut self) {
        assert!(!self.released, "volume released twice");
        self.released = true;
        self.shared.volumes_released.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn dummy_env(context: DummyContext) -> Arc<GenerationEnv<DummyContext>> {
    Arc::new(GenerationEnv::new(context, test_grid()).expect("bad grid"))
}

/// Runs both population phases
pub fn populated_task(
    env: &Arc<GenerationEnv<DummyContext>>,
    chunk: (i32, i32),
    profile: &Arc<AgentProfile>,
    scene: &FixtureScene,
    content: &FixtureContent,
) -> ChunkTask<DummyContext> {
    let mut task = ChunkTask::new(env.clone(), chunk.into(), profile.clone()).expect("bad task");
    task.populate_host(scene).expect("host population failed");
    task.populate_content(content).expect("content population failed");
    task
}
