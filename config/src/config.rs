use serde::Deserialize;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub grid: Grid,
    pub generation: Generation,
    #[serde(default)]
    pub agents: Vec<Agent>,
}

/// World grid that chunks are laid out on
#[derive(Deserialize, Copy, Clone, Debug, PartialEq)]
pub struct Grid {
    /// Side length of a chunk in world units
    pub cell_size: f32,
    /// Lowest grid layer that is probed for geometry
    pub lowest: i32,
    /// Highest grid layer that is probed for geometry
    pub highest: i32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Generation {
    pub worker_threads: usize,
    /// Max tasks populated on the main thread per pump
    pub tasks_per_pump: usize,
    #[serde(default)]
    pub profiling: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Agent {
    pub name: String,
    pub radius: f32,
    pub height: f32,
    #[serde(default)]
    pub crouch_height: f32,
    pub max_slope: f32,
    pub max_step_height: f32,
    pub voxels_per_chunk: u32,
    pub bleed_multiplier: f32,
    #[serde(default)]
    pub can_jump: bool,
    #[serde(default)]
    pub can_crouch: bool,
    #[serde(default)]
    pub can_cover: bool,
    #[serde(default)]
    pub can_half_cover: bool,
    #[serde(default)]
    pub cover_extra_samples: u32,
    /// Distance between sample points in voxels, none to disable them
    #[serde(default)]
    pub sample_points: Option<u32>,
    pub included_layers: u32,
    #[serde(default)]
    pub ignored_tags: Vec<String>,
    #[serde(default)]
    pub check_hierarchy_tag: bool,
}
