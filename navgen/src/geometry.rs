//! Voxel grid layout of a chunk for a given agent, including the border ("bleed") region that
//! extends past the chunk edges so geometry crossing the border is seen when rasterizing.

use misc::*;
use unit::world::{ChunkLocation, HeightRange};

use crate::profile::{AgentProfile, ProfileError};

/// Rounds half to even, matching the rounding the voxel grid was designed around
#[inline]
pub fn round_to_int(f: f32) -> i32 {
    f.round_ties_even() as i32
}

/// Axis aligned box in world space
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub centre: Vec3,
    pub size: Vec3,
}

impl Aabb {
    pub fn from_min_size(min: Vec3, size: Vec3) -> Self {
        Self {
            centre: min + size * 0.5,
            size,
        }
    }

    /// Half of the size
    pub fn extents(&self) -> Vec3 {
        self.size * 0.5
    }

    pub fn min(&self) -> Vec3 {
        self.centre - self.extents()
    }

    pub fn max(&self) -> Vec3 {
        self.centre + self.extents()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        a_min.cmple(b_max).all() && b_min.cmple(a_max).all()
    }
}

/// Concrete cuboid of a chunk column, between the bottom of its lowest layer and the top of its
/// highest layer
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChunkVolume {
    pub chunk: ChunkLocation,
    pub range: HeightRange,
    pub cell_size: f32,
}

impl ChunkVolume {
    pub fn new(chunk: ChunkLocation, range: HeightRange, cell_size: f32) -> Self {
        Self {
            chunk,
            range,
            cell_size,
        }
    }

    pub fn origin(&self) -> Vec3 {
        let (x, z) = self.chunk.world_origin(self.cell_size);
        vec3(x, self.range.min as f32 * self.cell_size, z)
    }

    pub fn size(&self) -> Vec3 {
        vec3(
            self.cell_size,
            self.range.layers() as f32 * self.cell_size,
            self.cell_size,
        )
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_min_size(self.origin(), self.size())
    }
}

/// Start, end and length of a voxel region on the horizontal x and z axes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GridRegion {
    pub start: (i32, i32),
    pub end: (i32, i32),
    pub length: (i32, i32),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridGeometry {
    pub voxel_size: f32,

    /// Voxels the central region is grown by on every horizontal side, always >= 1
    pub extra_offset: i32,

    /// Voxels that fall inside the chunk itself
    pub central: GridRegion,

    /// Central region grown by [extra_offset](Self::extra_offset)
    pub extra: GridRegion,

    /// Chunk bounds grown horizontally to cover the extra region
    pub bled_bounds: Aabb,

    /// Minimum corner of the extra region on x and z
    pub bled_origin: (f32, f32),
}

impl GridRegion {
    fn central(origin: f32, chunk_size: f32, voxel_size: f32) -> (i32, i32, i32) {
        let start = round_to_int(origin / voxel_size);
        let end = round_to_int((origin + chunk_size) / voxel_size);
        (start, end, (end - start).abs())
    }

    /// None if any index no longer fits
    fn grow(&self, by: i32) -> Option<Self> {
        let (sx, sz) = self.start;
        let (ex, ez) = self.end;
        let (lx, lz) = self.length;
        let both_sides = by.checked_mul(2)?;
        Some(Self {
            start: (sx.checked_sub(by)?, sz.checked_sub(by)?),
            end: (ex.checked_add(by)?, ez.checked_add(by)?),
            length: (lx.checked_add(both_sides)?, lz.checked_add(both_sides)?),
        })
    }
}

impl GridGeometry {
    pub fn for_profile(volume: &ChunkVolume, profile: &AgentProfile) -> Result<Self, ProfileError> {
        Self::derive(
            volume,
            profile.voxels_per_chunk,
            profile.radius,
            profile.bleed_multiplier,
        )
    }

    pub fn derive(
        volume: &ChunkVolume,
        voxels_per_chunk: u32,
        radius: f32,
        bleed_multiplier: f32,
    ) -> Result<Self, ProfileError> {
        debug_assert!(voxels_per_chunk > 0);
        let chunk_size = volume.cell_size;
        let voxel_size = chunk_size / voxels_per_chunk as f32;

        let (chunk_x, chunk_z) = volume.chunk.world_origin(chunk_size);
        let (start_x, end_x, length_x) = GridRegion::central(chunk_x, chunk_size, voxel_size);
        let (start_z, end_z, length_z) = GridRegion::central(chunk_z, chunk_size, voxel_size);
        let central = GridRegion {
            start: (start_x, start_z),
            end: (end_x, end_z),
            length: (length_x, length_z),
        };

        // at least one ring of context is needed even for point sized agents
        let bleed_voxels = (radius * bleed_multiplier) / voxel_size;
        let extra_offset = round_to_int(bleed_voxels).max(1);
        let extra = central
            .grow(extra_offset)
            .ok_or(ProfileError::BorderTooWide(bleed_voxels))?;

        let bleed = extra_offset as f32 * voxel_size;
        let chunk_bounds = volume.bounds();
        let bled_bounds = Aabb {
            centre: chunk_bounds.centre,
            size: chunk_bounds.size + vec3(bleed * 2.0, 0.0, bleed * 2.0),
        };

        Ok(Self {
            voxel_size,
            extra_offset,
            central,
            extra,
            bled_bounds,
            bled_origin: (chunk_x - bleed, chunk_z - bleed),
        })
    }

    pub fn half_voxel_offset(&self) -> Vec3 {
        let half = self.voxel_size * 0.5;
        vec3(half, 0.0, half)
    }

    /// World position of the extra region's minimum corner, on the ground plane
    pub fn offset_position(&self) -> Vec3 {
        vec3(self.bled_origin.0, 0.0, self.bled_origin.1)
    }
}

/// Agent dimensions converted to whole voxels
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentVoxels {
    pub radius: i32,
    pub height: i32,
    /// 0 if the agent can't crouch
    pub crouch_height: i32,
    pub max_step_height: i32,
    pub sample_point_density: Option<u32>,
    pub cover_extra_samples: u32,
}

impl AgentVoxels {
    pub fn new(profile: &AgentProfile, voxel_size: f32) -> Self {
        let voxels = |f: f32| round_to_int(f / voxel_size);
        Self {
            radius: voxels(profile.radius),
            height: voxels(profile.height),
            crouch_height: if profile.can_crouch {
                voxels(profile.crouch_height)
            } else {
                0
            },
            max_step_height: voxels(profile.max_step_height),
            sample_point_density: profile.sample_points,
            cover_extra_samples: profile.cover_extra_samples,
        }
    }
}

/// Everything derived for a task while populating it on the main thread
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ChunkLayout {
    pub volume: ChunkVolume,
    pub geometry: GridGeometry,
    pub agent: AgentVoxels,
}

impl ChunkLayout {
    pub fn new(volume: ChunkVolume, profile: &AgentProfile) -> Result<Self, ProfileError> {
        let geometry = GridGeometry::for_profile(&volume, profile)?;
        let agent = AgentVoxels::new(profile, geometry.voxel_size);
        Ok(Self {
            volume,
            geometry,
            agent,
        })
    }
}
