//! Flat output mesh: positions and triangle indices ready for upload.

use glam::Vec3;
use rootcause::Report;
use tracing::debug;

use crate::error::AssetError;

/// Positions (`x, y, z` per vertex, already scaled) and triangle indices.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReconstructedMesh {
    pub positions: Vec<f32>,
    pub indices: Vec<u32>,
    scale: f32,
}

impl ReconstructedMesh {
    pub fn new(positions: Vec<f32>, indices: Vec<u32>, scale: f32) -> Self {
        Self {
            positions,
            indices,
            scale,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Change the applied scale, multiplying every coordinate by `new / old`.
    pub fn rescale(&mut self, new_scale: f32) -> Result<(), Report<AssetError>> {
        validate_scale(new_scale)?;
        let factor = new_scale / self.scale;
        for p in &mut self.positions {
            *p *= factor;
        }
        self.scale = new_scale;
        Ok(())
    }
}

/// Scale factors must be finite and non-zero.
pub fn validate_scale(scale: f32) -> Result<(), Report<AssetError>> {
    if scale.is_finite() && scale != 0.0 {
        Ok(())
    } else {
        Err(Report::new(AssetError::InvalidScale(scale)))
    }
}

/// What [`build_mesh`] discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BuildStats {
    pub kept: usize,
    pub degenerate: usize,
    pub out_of_range: usize,
}

/// True when the triangle has (near) zero area. Non-finite positions count
/// as degenerate.
pub fn is_degenerate(a: Vec3, b: Vec3, c: Vec3, epsilon: f32) -> bool {
    let area = (b - a).cross(c - a).length();
    area.is_nan() || area <= epsilon
}

/// Flatten vertices and triangles into a [`ReconstructedMesh`].
///
/// Degeneracy is judged on the unscaled positions so that the outcome does
/// not depend on `scale`.
pub fn build_mesh(
    positions: &[Vec3],
    triangles: &[[u32; 3]],
    scale: f32,
    epsilon: f32,
) -> (ReconstructedMesh, BuildStats) {
    let mut stats = BuildStats::default();
    let mut indices = Vec::with_capacity(triangles.len() * 3);

    for &[a, b, c] in triangles {
        let corners = [a, b, c].map(|i| positions.get(i as usize).copied());
        let [Some(pa), Some(pb), Some(pc)] = corners else {
            stats.out_of_range += 1;
            continue;
        };
        if is_degenerate(pa, pb, pc, epsilon) {
            stats.degenerate += 1;
            continue;
        }
        indices.extend([a, b, c]);
        stats.kept += 1;
    }

    let positions = positions
        .iter()
        .flat_map(|p| (*p * scale).to_array())
        .collect();

    debug!(
        kept = stats.kept,
        degenerate = stats.degenerate,
        out_of_range = stats.out_of_range,
        "built mesh"
    );
    (ReconstructedMesh::new(positions, indices, scale), stats)
}
