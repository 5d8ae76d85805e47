//! Ceilings applied to counts read from disk.
//!
//! None of these are limits of the format itself. They bound what a single
//! well-formed model has been observed to contain, with headroom, so that a
//! corrupt count is caught before it drives a loop or an allocation. Raise
//! them if a legitimate asset trips one.

/// Bones in the primary file.
pub const MAX_BONES: usize = 256;
/// Texture records in the primary file.
pub const MAX_TEXTURES: usize = 256;
/// Texture search directories in the primary file.
pub const MAX_TEXTURE_DIRS: usize = 64;
/// Body parts, in either the primary or the topology file.
pub const MAX_BODY_PARTS: usize = 32;
/// Models per body part.
pub const MAX_MODELS: usize = 64;
/// Meshes per model (primary file) or per LOD (topology file).
pub const MAX_MESHES: usize = 1024;
/// Levels of detail declared by the vertex or topology file.
pub const MAX_LODS: usize = 8;
/// Strip groups per topology mesh.
pub const MAX_STRIP_GROUPS: usize = 64;
/// Vertices per strip group; local indices are 16-bit.
pub const MAX_GROUP_VERTICES: usize = 1 << 16;
/// Index-table entries per strip group.
pub const MAX_GROUP_INDICES: usize = 1 << 20;
/// Strips per strip group.
pub const MAX_STRIPS: usize = 1 << 16;
/// LOD-0 vertices in the vertex file.
pub const MAX_VERTICES: usize = 1 << 20;
/// Fixup records in the vertex file.
pub const MAX_FIXUPS: usize = 1 << 16;

/// Local index that ends the current strip segment.
pub const STRIP_RESTART: u16 = 0xFFFF;

/// A topology file with a larger share of out-of-range indices than this is
/// treated as corrupt rather than repaired.
pub const MAX_INVALID_INDEX_RATIO: f64 = 0.5;

/// Edge cross products at or below this magnitude mark a triangle as
/// degenerate. Measured in unscaled model units.
pub const DEGENERATE_EPSILON: f32 = 1e-6;
