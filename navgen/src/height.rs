use std::collections::HashMap;

use misc::parking_lot::Mutex;
use misc::*;
use unit::world::{ChunkLocation, HeightRange};

use crate::context::VerticalProbe;
use crate::profile::LayerMask;

/// Vertical extent of every chunk column seen so far, shared by all generation tasks. Scene
/// geometry is assumed not to change during generation, so entries are never invalidated
#[derive(Default)]
pub struct HeightRangeCache {
    ranges: Mutex<HashMap<ChunkLocation, HeightRange>>,
}

impl HeightRangeCache {
    /// Returns the cached range for the column, probing the scene if it is not known yet.
    ///
    /// The lock is not held while probing, so two callers may probe the same column at once. The
    /// first value stored wins and is returned to both
    pub fn resolve(
        &self,
        chunk: ChunkLocation,
        grid: &config::Grid,
        layers: LayerMask,
        probe: &(impl VerticalProbe + ?Sized),
    ) -> HeightRange {
        if let Some(range) = self.get(chunk) {
            return range;
        }

        let probed = probe_column(chunk, grid, layers, probe);

        let range = *self.ranges.lock().entry(chunk).or_insert(probed);
        if range != probed {
            warn!("height range was resolved concurrently with a different result";
                chunk, "kept" => range, "discarded" => probed);
        } else {
            trace!("resolved height range"; chunk, range);
        }

        range
    }

    /// Provides a known range for a column. Returns false if the column already had one, which is
    /// left unchanged
    pub fn define(&self, chunk: ChunkLocation, range: HeightRange) -> bool {
        let mut ranges = self.ranges.lock();
        if ranges.contains_key(&chunk) {
            false
        } else {
            ranges.insert(chunk, range);
            true
        }
    }

    pub fn get(&self, chunk: ChunkLocation) -> Option<HeightRange> {
        self.ranges.lock().get(&chunk).copied()
    }

    pub fn len(&self) -> usize {
        self.ranges.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sweeps a box the size of one cell down through the whole vertical domain, through the middle
/// of the column
fn probe_column(
    chunk: ChunkLocation,
    grid: &config::Grid,
    layers: LayerMask,
    probe: &(impl VerticalProbe + ?Sized),
) -> HeightRange {
    let half = grid.cell_size * 0.5;
    let (x, z) = chunk.world_centre(grid.cell_size);

    let lowest = grid.lowest as f32 * grid.cell_size;
    let highest = grid.highest as f32 * grid.cell_size;
    let distance = (highest - lowest).abs();

    let hits = probe.cast_box(
        vec3(x, highest, z),
        Vec3::splat(half),
        Vec3::NEG_Y,
        distance,
        layers,
    );

    HeightRange::from_hit_heights(hits.iter().map(|hit| hit.point.y), grid.cell_size)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    use super::*;
    use crate::context::ProbeHit;
    use crate::helpers::{test_grid, FixtureScene};

    #[test]
    fn resolve_from_hits() {
        let scene = FixtureScene::default().with_column_hits((0, 0), [5.2, 12.7]);
        let cache = HeightRangeCache::default();

        let range = cache.resolve(ChunkLocation(0, 0), &test_grid(), LayerMask::ALL, &scene);
        assert_eq!(range, HeightRange::new(-1, 1));
        assert_eq!(cache.get(ChunkLocation(0, 0)), Some(range));
    }

    #[test]
    fn no_hits_is_flat() {
        let scene = FixtureScene::default();
        let cache = HeightRangeCache::default();

        let range = cache.resolve(ChunkLocation(4, -2), &test_grid(), LayerMask::ALL, &scene);
        assert_eq!(range, HeightRange::FLAT);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn probes_once() {
        let scene = FixtureScene::default().with_column_hits((1, 1), [3.0]);
        let cache = HeightRangeCache::default();

        let a = cache.resolve(ChunkLocation(1, 1), &test_grid(), LayerMask::ALL, &scene);
        let b = cache.resolve(ChunkLocation(1, 1), &test_grid(), LayerMask::ALL, &scene);
        assert_eq!(a, b);
        assert_eq!(scene.probe_count(), 1);
    }

    #[test]
    fn probe_covers_vertical_domain() {
        struct Recorder(Mutex<Vec<(Vec3, Vec3, Vec3, f32, LayerMask)>>);
        impl VerticalProbe for Recorder {
            fn cast_box(
                &self,
                origin: Vec3,
                half_extents: Vec3,
                direction: Vec3,
                max_distance: f32,
                layers: LayerMask,
            ) -> Vec<ProbeHit> {
                self.0
                    .lock()
                    .push((origin, half_extents, direction, max_distance, layers));
                vec![]
            }
        }

        let recorder = Recorder(Mutex::new(vec![]));
        let grid = config::Grid {
            cell_size: 10.0,
            lowest: -2,
            highest: 5,
        };
        HeightRangeCache::default().resolve(ChunkLocation(1, -1), &grid, LayerMask(4), &recorder);

        let calls = recorder.0.into_inner();
        assert_eq!(calls.len(), 1);
        let (origin, half, dir, distance, layers) = calls[0];
        assert_eq!(origin, vec3(15.0, 50.0, -5.0));
        assert_eq!(half, Vec3::splat(5.0));
        assert_eq!(dir, Vec3::NEG_Y);
        assert!(distance.approx_eq(70.0, (f32::EPSILON, 2)));
        assert_eq!(layers, LayerMask(4));
    }

    #[test]
    fn defined_ranges_are_not_overwritten() {
        let scene = FixtureScene::default().with_column_hits((0, 0), [55.0]);
        let cache = HeightRangeCache::default();

        assert!(cache.define(ChunkLocation(0, 0), HeightRange::new(2, 3)));
        assert!(!cache.define(ChunkLocation(0, 0), HeightRange::new(8, 9)));

        let range = cache.resolve(ChunkLocation(0, 0), &test_grid(), LayerMask::ALL, &scene);
        assert_eq!(range, HeightRange::new(2, 3));
        assert_eq!(scene.probe_count(), 0);
    }

    #[test]
    fn concurrent_resolve_converges() {
        const THREADS: usize = 8;

        struct SlowProbe {
            barrier: Barrier,
            calls: AtomicUsize,
        }
        impl VerticalProbe for SlowProbe {
            fn cast_box(&self, _: Vec3, _: Vec3, _: Vec3, _: f32, _: LayerMask) -> Vec<ProbeHit> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                vec![
                    ProbeHit {
                        point: vec3(0.0, 5.2, 0.0),
                    },
                    ProbeHit {
                        point: vec3(0.0, 12.7, 0.0),
                    },
                ]
            }
        }

        let probe = SlowProbe {
            barrier: Barrier::new(THREADS),
            calls: AtomicUsize::new(0),
        };
        let cache = HeightRangeCache::default();
        let grid = test_grid();

        let results = std::thread::scope(|scope| {
            let handles = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        probe.barrier.wait();
                        cache.resolve(ChunkLocation(3, 3), &grid, LayerMask::ALL, &probe)
                    })
                })
                .collect_vec();

            handles
                .into_iter()
                .map(|h| h.join().expect("resolver panicked"))
                .collect_vec()
        });

        assert!(results.iter().all(|r| *r == HeightRange::new(-1, 1)));
        assert_eq!(cache.get(ChunkLocation(3, 3)), Some(HeightRange::new(-1, 1)));
        assert_eq!(cache.len(), 1);

        // redundant probes are tolerated but there's at least one
        let calls = probe.calls.load(Ordering::SeqCst);
        assert!((1..=THREADS).contains(&calls));
    }
}
