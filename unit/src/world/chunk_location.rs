use misc::derive_more::{From, Into};
use misc::*;

/// Location of a chunk column in the world, on the horizontal x and z axes
#[derive(Copy, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Into, From)]
pub struct ChunkLocation(pub i32, pub i32);

impl ChunkLocation {
    pub const fn x(&self) -> i32 {
        self.0
    }

    pub const fn z(&self) -> i32 {
        self.1
    }

    /// World space position of the minimum corner on the horizontal axes
    pub fn world_origin(self, chunk_size: f32) -> (f32, f32) {
        (self.0 as f32 * chunk_size, self.1 as f32 * chunk_size)
    }

    /// World space position of the middle of the column on the horizontal axes
    pub fn world_centre(self, chunk_size: f32) -> (f32, f32) {
        let half = chunk_size * 0.5;
        let (x, z) = self.world_origin(chunk_size);
        (x + half, z + half)
    }

    /// Inclusive
    pub fn iter_until(self, other: Self) -> impl Iterator<Item = ChunkLocation> + Clone {
        let ChunkLocation(x0, z0) = self;
        let ChunkLocation(x1, z1) = other;

        (x0..=x1)
            .cartesian_product(z0..=z1)
            .map(|(x, z)| ChunkLocation(x, z))
    }
}

impl Debug for ChunkLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}, {}]", self.0, self.1)
    }
}

impl Display for ChunkLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Debug::fmt(self, f)
    }
}

slog_value_debug!(ChunkLocation);
slog_kv_debug!(ChunkLocation, "chunk");
