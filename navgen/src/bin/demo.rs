//! Generates graphs for a synthetic scene of boxes and logs a summary of each.
//!
//! Usage: navgen-demo [config.ron]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use petgraph::graph::{NodeIndex, UnGraph};

use config::ConfigType;
use misc::logging::LoggerBuilder;
use misc::*;
use navgen::{
    profiles_from_config, Aabb, ChunkLayout, ChunkTask, CollaboratorError, ColliderCollector,
    ContentIndex, GenerationContext, GenerationScheduler, LayerMask, ProbeHit, SceneQuery,
    TriggerInteraction, VerticalProbe, Volume, WorkerReport,
};
use unit::world::ChunkLocation;

const DEFAULT_CONFIG: &str = include_str!("../../demo.ron");
const RADIUS: i32 = 2;

const GROUND_LAYER: u8 = 0;
const PROP_LAYER: u8 = 1;

#[derive(Copy, Clone)]
struct SceneBox {
    bounds: Aabb,
    layer: u8,
}

/// Static boxes, indexed by position in the list
struct DemoScene {
    boxes: Arc<Vec<SceneBox>>,
}

/// Areas that are never walkable
struct Blockers(HashMap<ChunkLocation, Vec<Aabb>>);

struct DemoContext {
    boxes: Arc<Vec<SceneBox>>,
}

struct BoxCollector {
    boxes: Arc<Vec<SceneBox>>,
    surfaces: Vec<usize>,
    blockers: Vec<Aabb>,
}

struct CollectedBoxes {
    solid: Vec<Aabb>,
    blockers: Vec<Aabb>,
}

/// Highest walkable surface per voxel column of the extra region
struct Heightfield {
    layout: ChunkLayout,
    shapes: Option<CollectedBoxes>,
    cells: Vec<Option<f32>>,
}

struct DemoGraph {
    graph: UnGraph<Vec3, f32>,
}

fn main() {
    let exit = match run() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err);
            1
        }
    };

    std::process::exit(exit);
}

fn run() -> BoxedResult<()> {
    let _logger = LoggerBuilder::with_env()?.thread_name("navgen-log").init()?;

    let config_path = std::env::args().nth(1);
    let config = match config_path.as_deref() {
        Some(path) => config::init(ConfigType::File(Path::new(path)))?,
        None => config::init(ConfigType::String(DEFAULT_CONFIG))?,
    };

    let profiles = profiles_from_config(&config)?;
    let scene = DemoScene::generate(config.grid.cell_size);
    let blockers = Blockers::generate(config.grid.cell_size);

    let context = DemoContext {
        boxes: scene.boxes.clone(),
    };
    let mut scheduler = GenerationScheduler::from_config(context, &config::get())?;

    for chunk in ChunkLocation(-RADIUS, -RADIUS).iter_until(ChunkLocation(RADIUS, RADIUS)) {
        for profile in &profiles {
            scheduler.request(chunk, profile)?;
        }
    }

    // cancel one to show it off
    if let Some(profile) = profiles.last() {
        scheduler.cancel(ChunkLocation(RADIUS, RADIUS), profile);
    }

    let mut completed = 0;
    while scheduler.queued_count() > 0 {
        scheduler.pump(&scene, &blockers);

        for report in scheduler.block_for_all(Duration::from_secs(30))? {
            match report {
                WorkerReport::Completed {
                    key,
                    graph: Some(graph),
                } => {
                    completed += 1;
                    info!("generated graph"; key.chunk, "agent" => &key.profile.name,
                        "nodes" => graph.graph.node_count(), "edges" => graph.graph.edge_count());
                }
                WorkerReport::Completed { key, graph: None } => {
                    warn!("graph went missing"; key.chunk);
                }
                WorkerReport::Aborted { key, at } => {
                    info!("generation aborted"; key.chunk,
                        "agent" => &key.profile.name, "at" => at);
                }
                WorkerReport::Failed { key, reason } => {
                    error!("generation failed"; key.chunk, "agent" => &key.profile.name,
                        "reason" => reason);
                }
            }
        }
    }

    info!("finished"; "completed" => completed, "height_ranges" => scheduler.env().heights().len());
    Ok(())
}

/// Cheap deterministic noise in 0..1
fn noise(x: i32, z: i32, seed: u32) -> f32 {
    let mut h = (x as u32).wrapping_mul(0x9E37_79B1) ^ (z as u32).wrapping_mul(0x85EB_CA77) ^ seed;
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    (h & 0xFFFF) as f32 / 65535.0
}

impl DemoScene {
    fn generate(cell_size: f32) -> Self {
        let mut boxes = Vec::new();
        let extent = (RADIUS + 1) as f32 * cell_size;

        // one ground slab under the whole area
        boxes.push(SceneBox {
            bounds: Aabb::from_min_size(
                vec3(-extent, -1.0, -extent),
                vec3(extent * 2.0, 1.0, extent * 2.0),
            ),
            layer: GROUND_LAYER,
        });

        for chunk in ChunkLocation(-RADIUS, -RADIUS).iter_until(ChunkLocation(RADIUS, RADIUS)) {
            let (x, z) = chunk.world_origin(cell_size);
            for i in 0..3 {
                let seed = i as u32 * 7919;
                let size = vec3(
                    1.0 + noise(chunk.x(), chunk.z(), seed) * 4.0,
                    0.3 + noise(chunk.x(), chunk.z(), seed + 1) * 3.0,
                    1.0 + noise(chunk.x(), chunk.z(), seed + 2) * 4.0,
                );
                let min = vec3(
                    x + noise(chunk.x(), chunk.z(), seed + 3) * cell_size,
                    0.0,
                    z + noise(chunk.x(), chunk.z(), seed + 4) * cell_size,
                );
                boxes.push(SceneBox {
                    bounds: Aabb::from_min_size(min, size),
                    layer: if i == 0 { GROUND_LAYER } else { PROP_LAYER },
                });
            }
        }

        Self {
            boxes: Arc::new(boxes),
        }
    }

    fn matching(&self, query: Aabb, layers: LayerMask) -> impl Iterator<Item = (usize, &SceneBox)> {
        self.boxes
            .iter()
            .enumerate()
            .filter(move |(_, b)| layers.contains(b.layer) && b.bounds.intersects(&query))
    }
}

impl VerticalProbe for DemoScene {
    fn cast_box(
        &self,
        origin: Vec3,
        half_extents: Vec3,
        direction: Vec3,
        max_distance: f32,
        layers: LayerMask,
    ) -> Vec<ProbeHit> {
        let end = origin + direction * max_distance;
        let swept = Aabb::from_min_size(
            origin.min(end) - half_extents,
            (origin - end).abs() + half_extents * 2.0,
        );

        self.matching(swept, layers)
            .map(|(_, b)| ProbeHit {
                point: vec3(origin.x, b.bounds.max().y, origin.z),
            })
            .collect()
    }
}

impl SceneQuery<usize> for DemoScene {
    fn overlap_box(
        &self,
        centre: Vec3,
        extents: Vec3,
        layers: LayerMask,
        _: TriggerInteraction,
        out: &mut Vec<usize>,
    ) {
        let query = Aabb {
            centre,
            size: extents * 2.0,
        };
        out.extend(self.matching(query, layers).map(|(i, _)| i));
    }
}

impl Blockers {
    fn generate(cell_size: f32) -> Self {
        let blockers = ChunkLocation(-RADIUS, -RADIUS)
            .iter_until(ChunkLocation(RADIUS, RADIUS))
            .filter(|c| noise(c.x(), c.z(), 31337) > 0.6)
            .map(|chunk| {
                let (x, z) = chunk.world_centre(cell_size);
                let area = Aabb {
                    centre: vec3(x, 0.0, z),
                    size: vec3(2.0, 10.0, 2.0),
                };
                (chunk, vec![area])
            })
            .collect();

        Self(blockers)
    }
}

impl ContentIndex<Aabb> for Blockers {
    fn content_count(&self, chunk: ChunkLocation) -> usize {
        self.0.get(&chunk).map(Vec::len).unwrap_or_default()
    }

    fn content_at(&self, chunk: ChunkLocation, out: &mut Vec<Aabb>) {
        if let Some(blockers) = self.0.get(&chunk) {
            out.extend_from_slice(blockers);
        }
    }
}

impl GenerationContext for DemoContext {
    type Surface = usize;
    type Modifier = Aabb;
    type Collector = BoxCollector;
    type Volume = Heightfield;
    type Graph = DemoGraph;

    fn new_collector(&self, _: &ChunkTask<Self>, _: &ChunkLayout) -> Self::Collector {
        BoxCollector {
            boxes: self.boxes.clone(),
            surfaces: Vec::new(),
            blockers: Vec::new(),
        }
    }

    fn new_volume(
        &self,
        _: &ChunkTask<Self>,
        layout: &ChunkLayout,
    ) -> Result<Self::Volume, CollaboratorError> {
        let (w, d) = layout.geometry.extra.length;
        Ok(Heightfield {
            layout: *layout,
            shapes: None,
            cells: vec![None; (w * d) as usize],
        })
    }

    fn build_graph(
        &self,
        volume: &Self::Volume,
        _: &ChunkTask<Self>,
        layout: &ChunkLayout,
    ) -> Result<Self::Graph, CollaboratorError> {
        let geometry = &layout.geometry;
        let offset = geometry.extra_offset;
        let step = layout.agent.max_step_height.max(1) as f32 * geometry.voxel_size;
        let (cx, cz) = geometry.central.length;

        let mut graph = UnGraph::default();
        let mut nodes: HashMap<(i32, i32), NodeIndex> = HashMap::new();

        // only central voxels become nodes, the border is there for clearance
        for (x, z) in (offset..offset + cx).cartesian_product(offset..offset + cz) {
            let height = some_or_continue!(volume.walkable(x, z, layout.agent.radius, step));
            let node = graph.add_node(volume.position(x, z, height));
            nodes.insert((x, z), node);
        }

        for (&(x, z), &node) in &nodes {
            for neighbour in [(x + 1, z), (x, z + 1)] {
                let other = some_or_continue!(nodes.get(&neighbour));
                let (a, b) = (graph[node], graph[*other]);
                if (a.y - b.y).abs() <= step {
                    graph.add_edge(node, *other, a.distance(b));
                }
            }
        }

        Ok(DemoGraph { graph })
    }
}

impl ColliderCollector<DemoContext> for BoxCollector {
    type Shapes = CollectedBoxes;

    fn add_surfaces(&mut self, surfaces: Vec<usize>) {
        self.surfaces.extend(surfaces);
    }

    fn add_modifiers(&mut self, modifiers: Vec<Aabb>) {
        self.blockers.extend(modifiers);
    }

    fn collect(&mut self) -> Result<Self::Shapes, CollaboratorError> {
        let solid = self
            .surfaces
            .iter()
            .map(|i| {
                self.boxes
                    .get(*i)
                    .map(|b| b.bounds)
                    .ok_or_else(|| format!("unknown surface {}", i))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CollectedBoxes {
            solid,
            blockers: std::mem::take(&mut self.blockers),
        })
    }
}

impl Heightfield {
    fn index(&self, x: i32, z: i32) -> Option<usize> {
        let (w, d) = self.layout.geometry.extra.length;
        if (0..w).contains(&x) && (0..d).contains(&z) {
            Some((z * w + x) as usize)
        } else {
            None
        }
    }

    /// Centre of the voxel column at the given height
    fn position(&self, x: i32, z: i32, height: f32) -> Vec3 {
        let geometry = &self.layout.geometry;
        let corner = geometry.offset_position()
            + vec3(x as f32, 0.0, z as f32) * geometry.voxel_size
            + geometry.half_voxel_offset();
        vec3(corner.x, height, corner.z)
    }

    /// Height of the voxel if an agent of the given radius fits there
    fn walkable(&self, x: i32, z: i32, radius: i32, step: f32) -> Option<f32> {
        let height = self.cells[self.index(x, z)?]?;

        let clear = (-radius..=radius)
            .cartesian_product(-radius..=radius)
            .filter_map(|(dx, dz)| self.index(x + dx, z + dz))
            .all(|i| self.cells[i].map_or(true, |h| h - height <= step));

        clear.then(|| height)
    }
}

impl Volume<DemoContext> for Heightfield {
    fn add_shapes(&mut self, shapes: CollectedBoxes) {
        self.shapes = Some(shapes);
    }

    fn process(&mut self) -> Result<(), CollaboratorError> {
        let shapes = self.shapes.take().ok_or("no shapes added to heightfield")?;
        let (w, d) = self.layout.geometry.extra.length;
        let floor = self.layout.volume.origin().y;

        for (x, z) in (0..w).cartesian_product(0..d) {
            let centre = self.position(x, z, 0.0);
            let inside = |b: &Aabb| {
                let (min, max) = (b.min(), b.max());
                (min.x..=max.x).contains(&centre.x) && (min.z..=max.z).contains(&centre.z)
            };

            if shapes.blockers.iter().any(inside) {
                continue;
            }

            let top = shapes
                .solid
                .iter()
                .filter(|b| inside(b))
                .map(|b| b.max().y)
                .filter(|y| *y >= floor)
                .max_by(f32::total_cmp);

            if let Some(i) = self.index(x, z) {
                self.cells[i] = top;
            }
        }

        Ok(())
    }

    fn release(&mut self) {
        trace!("releasing heightfield"; self.layout.volume.chunk, "cells" => self.cells.len());
        self.cells = Vec::new();
        self.shapes = None;
    }
}
