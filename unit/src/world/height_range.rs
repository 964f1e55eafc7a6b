use misc::*;

/// Vertical extent of a chunk column in grid layers, both ends inclusive
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct HeightRange {
    pub min: i32,
    pub max: i32,
}

impl HeightRange {
    /// Single layer at the origin, used when nothing is found in a column
    pub const FLAT: Self = HeightRange { min: 0, max: 0 };

    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// One extra layer of margin is added below the lowest hit. An empty iterator produces
    /// [Self::FLAT]
    pub fn from_hit_heights(heights: impl Iterator<Item = f32>, layer_size: f32) -> Self {
        match heights.minmax_by(|a, b| a.total_cmp(b)) {
            MinMaxResult::NoElements => Self::FLAT,
            MinMaxResult::OneElement(y) => Self::from_extremes(y, y, layer_size),
            MinMaxResult::MinMax(lowest, highest) => {
                Self::from_extremes(lowest, highest, layer_size)
            }
        }
    }

    fn from_extremes(lowest: f32, highest: f32, layer_size: f32) -> Self {
        let min = (lowest / layer_size).floor() as i32 - 1;
        let max = (highest / layer_size).floor() as i32;
        Self { min, max }
    }

    /// Number of layers covered
    pub fn layers(&self) -> i32 {
        self.max - self.min + 1
    }
}

impl Debug for HeightRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "({}..={})", self.min, self.max)
    }
}

slog_value_debug!(HeightRange);
slog_kv_debug!(HeightRange, "range");
