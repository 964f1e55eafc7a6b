use std::convert::TryFrom;
use std::sync::Arc;

use misc::*;

/// Bitmask of physics layers
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = LayerMask(0);
    pub const ALL: Self = LayerMask(u32::MAX);

    pub const fn with_layer(layer: u8) -> Self {
        if layer < 32 {
            LayerMask(1 << layer)
        } else {
            LayerMask::NONE
        }
    }

    pub const fn contains(self, layer: u8) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }
}

impl Debug for LayerMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "LayerMask({:#034b})", self.0)
    }
}

/// Describes one category of pathing agent. Compared by instance, so wrap in an [Arc] and share
/// the same instance between all requests for the same agent type
#[derive(Clone, Debug)]
pub struct AgentProfile {
    pub name: String,

    pub radius: f32,
    pub height: f32,
    pub crouch_height: f32,
    pub max_slope: f32,
    pub max_step_height: f32,

    /// Voxels along one horizontal side of a chunk
    pub voxels_per_chunk: u32,
    /// Scales the agent radius to get the width of the border region
    pub bleed_multiplier: f32,

    pub can_jump: bool,
    pub can_crouch: bool,
    pub can_cover: bool,
    pub can_half_cover: bool,
    pub cover_extra_samples: u32,
    /// Distance between sample points in voxels, none if disabled
    pub sample_points: Option<u32>,

    pub included_layers: LayerMask,
    pub ignored_tags: Vec<String>,
    pub check_hierarchy_tag: bool,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProfileError {
    #[error("Voxels per chunk must be positive")]
    NoVoxels,

    #[error("{0} must be finite and not negative but is {1}")]
    BadValue(&'static str, f32),

    #[error("Sample point density must be positive")]
    NoSamplePointDensity,

    #[error("Border of {0} voxels does not fit on the voxel grid")]
    BorderTooWide(f32),
}

impl AgentProfile {
    /// Default values for a human-ish agent with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            radius: 0.5,
            height: 2.0,
            crouch_height: 1.2,
            max_slope: 45.0,
            max_step_height: 0.5,
            voxels_per_chunk: 10,
            bleed_multiplier: 2.0,
            can_jump: false,
            can_crouch: false,
            can_cover: false,
            can_half_cover: false,
            cover_extra_samples: 0,
            sample_points: None,
            included_layers: LayerMask::ALL,
            ignored_tags: Vec::new(),
            check_hierarchy_tag: false,
        }
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.voxels_per_chunk == 0 {
            return Err(ProfileError::NoVoxels);
        }

        for (name, value) in [
            ("radius", self.radius),
            ("height", self.height),
            ("crouch height", self.crouch_height),
            ("max slope", self.max_slope),
            ("max step height", self.max_step_height),
            ("bleed multiplier", self.bleed_multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ProfileError::BadValue(name, value));
            }
        }

        if self.sample_points == Some(0) {
            return Err(ProfileError::NoSamplePointDensity);
        }

        Ok(())
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl TryFrom<&config::Agent> for AgentProfile {
    type Error = ProfileError;

    fn try_from(agent: &config::Agent) -> Result<Self, Self::Error> {
        let profile = Self {
            name: agent.name.clone(),
            radius: agent.radius,
            height: agent.height,
            crouch_height: agent.crouch_height,
            max_slope: agent.max_slope,
            max_step_height: agent.max_step_height,
            voxels_per_chunk: agent.voxels_per_chunk,
            bleed_multiplier: agent.bleed_multiplier,
            can_jump: agent.can_jump,
            can_crouch: agent.can_crouch,
            can_cover: agent.can_cover,
            can_half_cover: agent.can_half_cover,
            cover_extra_samples: agent.cover_extra_samples,
            sample_points: agent.sample_points,
            included_layers: LayerMask(agent.included_layers),
            ignored_tags: agent.ignored_tags.clone(),
            check_hierarchy_tag: agent.check_hierarchy_tag,
        };

        profile.validate()?;
        Ok(profile)
    }
}

/// One shared instance per configured agent
pub fn profiles_from_config(
    config: &config::Config,
) -> Result<Vec<Arc<AgentProfile>>, ProfileError> {
    config
        .agents
        .iter()
        .map(|agent| AgentProfile::try_from(agent).map(Arc::new))
        .collect()
}
