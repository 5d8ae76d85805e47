//! Geometry produced when the companion files cannot supply a real mesh.

use std::ops::Range;

use glam::Vec3;
use tracing::warn;

use crate::error::Warning;
use crate::models::header::{AssetHeader, BodyPart, mesh_ranges};
use crate::models::mesh::{ReconstructedMesh, is_degenerate};

/// Twelve triangles over the corners from [`BoundingBox::corners`](crate::models::header::BoundingBox::corners).
pub const BOX_INDICES: [u32; 36] = [
    0, 1, 2, 2, 3, 0, // -z
    1, 5, 6, 6, 2, 1, // +x
    5, 4, 7, 7, 6, 5, // +z
    4, 0, 3, 3, 7, 4, // -x
    3, 2, 6, 6, 7, 3, // +y
    4, 5, 1, 1, 0, 4, // -y
];

/// A box over the header's hull, or over the view volume when the hull is empty.
pub fn bounding_box(header: &AssetHeader, scale: f32) -> (ReconstructedMesh, Option<Warning>) {
    let (bbox, warning) = if header.hull.is_empty() {
        warn!("hull is empty, using the view bounding box");
        (header.view_bbox, Some(Warning::HullSubstituted))
    } else {
        (header.hull, None)
    };

    let positions = bbox
        .corners()
        .iter()
        .flat_map(|corner| (*corner * scale).to_array())
        .collect();
    (
        ReconstructedMesh::new(positions, BOX_INDICES.to_vec(), scale),
        warning,
    )
}

/// Triangles formed by consecutive vertex triples.
///
/// Triples never cross a header mesh boundary. Without header meshes the whole
/// array is treated as a single run.
pub fn naive_triangles(
    positions: &[Vec3],
    body_parts: &[BodyPart],
    epsilon: f32,
) -> Vec<[u32; 3]> {
    let len = positions.len();
    let mut ranges: Vec<Range<usize>> = mesh_ranges(body_parts)
        .map(|range| range.start.min(len)..range.end.min(len))
        .filter(|range| !range.is_empty())
        .collect();
    if ranges.is_empty() {
        ranges.push(0..len);
    }

    ranges
        .into_iter()
        .flat_map(|range| {
            let end = range.end;
            range.step_by(3).filter(move |&i| i + 2 < end)
        })
        .filter(|&i| !is_degenerate(positions[i], positions[i + 1], positions[i + 2], epsilon))
        .map(|i| [i as u32, i as u32 + 1, i as u32 + 2])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FixtureBodyPart, FixtureModel, MdlBuilder};
    use crate::models::header::{parse_body_parts, parse_header};

    #[test]
    fn box_over_hull() {
        let header = parse_header(&MdlBuilder::default().build()).unwrap();
        let (mesh, warning) = bounding_box(&header, 2.0);
        assert_eq!(warning, None);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.indices.len(), 36);
        assert_eq!(&mesh.positions[..3], &[-2.0, -2.0, -2.0]);
        assert_eq!(&mesh.positions[18..21], &[2.0, 2.0, 2.0]);
        assert!(mesh.indices.iter().all(|&i| i < 8));
    }

    #[test]
    fn empty_hull_uses_view_box() {
        let bytes = MdlBuilder {
            hull: ([0.0; 3], [0.0; 3]),
            ..Default::default()
        }
        .build();
        let header = parse_header(&bytes).unwrap();
        let (mesh, warning) = bounding_box(&header, 1.0);
        assert_eq!(warning, Some(Warning::HullSubstituted));
        assert_eq!(&mesh.positions[..3], &[-2.0, -2.0, -2.0]);
    }

    #[test]
    fn naive_whole_stream() {
        let positions: Vec<Vec3> = (0..7)
            .map(|i| Vec3::new(i as f32, (i % 2) as f32, 0.0))
            .collect();
        assert_eq!(
            naive_triangles(&positions, &[], 1e-6),
            vec![[0, 1, 2], [3, 4, 5]]
        );
    }

    #[test]
    fn naive_respects_mesh_ranges_and_degeneracy() {
        let bytes = MdlBuilder {
            body_parts: vec![FixtureBodyPart {
                name: "body".into(),
                models: vec![FixtureModel {
                    name: "model".into(),
                    first_vertex: 0,
                    vertex_count: 8,
                    meshes: vec![(0, 4), (4, 4)],
                }],
            }],
            ..Default::default()
        }
        .build();
        let header = parse_header(&bytes).unwrap();
        let parts = parse_body_parts(&bytes, &header, &mut Vec::new());

        let mut positions: Vec<Vec3> = (0..8)
            .map(|i| Vec3::new(i as f32, (i % 2) as f32, 0.0))
            .collect();
        // Make the second mesh's first triple collinear.
        positions[5] = Vec3::new(5.0, 0.0, 0.0);
        positions[6] = Vec3::new(6.0, 0.0, 0.0);

        // Only one triple fits each four-vertex mesh; the second is degenerate.
        assert_eq!(naive_triangles(&positions, &parts, 1e-6), vec![[0, 1, 2]]);
    }
}
