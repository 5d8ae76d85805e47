use std::fmt;

/// Fallback geometry when the companion files cannot be used
pub mod fallback;
/// Primary `.mdl` header and its descriptive tables
pub mod header;
/// Named ceilings for counts read from disk
pub mod limits;
/// Flattening, degeneracy filtering and scaling
pub mod mesh;
/// Triangle strip and list expansion
#[cfg(feature = "topology")]
pub mod strip;
/// `.vtx` strip hierarchy walker
#[cfg(feature = "topology")]
pub mod topology;
/// `.vvd` vertex buffer
pub mod vertex;

/// Position of a strip group inside the topology hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct StripGroupPath {
    pub body_part: usize,
    pub model: usize,
    pub mesh: usize,
    pub strip_group: usize,
}

impl fmt::Display for StripGroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "body part {} / model {} / mesh {} / group {}",
            self.body_part, self.model, self.mesh, self.strip_group
        )
    }
}
