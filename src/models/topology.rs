//! Parser for the `.vtx` strip companion.
//!
//! The file is a tree of packed records: body parts → models → LODs →
//! meshes → strip groups, each group owning a vertex table, an index table
//! and a strip table. Every offset is relative to the record that declares
//! it. Only LOD 0 is walked.
//!
//! Unlike the header tables, structural problems here are fatal: a topology
//! file that cannot be walked is rejected as a whole and the loader falls
//! back to guessing triangles from the vertex order.

use rootcause::Report;
use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{le_f32, le_i16, le_i32, le_u8, le_u16};
use winnow::combinator::repeat;
use winnow::token::take;

use crate::data::parser_utils::{Table, WResult, locate_table, parse_record};
use crate::error::{AssetError, AssetFile, IndexPolicy, Warning};
use crate::models::StripGroupPath;
use crate::models::header::{BodyPart, mesh_vertex_base};
use crate::models::limits::{
    MAX_BODY_PARTS, MAX_GROUP_INDICES, MAX_GROUP_VERTICES, MAX_INVALID_INDEX_RATIO, MAX_LODS,
    MAX_MESHES, MAX_MODELS, MAX_STRIP_GROUPS, MAX_STRIPS, STRIP_RESTART,
};
use crate::models::strip::{Primitive, Remapper, expand};

pub const VTX_VERSION: i32 = 7;
pub const VTX_HEADER_SIZE: usize = 36;

const BODY_PART_SIZE: usize = 8;
const MODEL_SIZE: usize = 8;
const LOD_SIZE: usize = 12;
const MESH_SIZE: usize = 9;
const VERTEX_SIZE: usize = 9;
const INDEX_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct TopologyHeader {
    pub version: i32,
    pub vertex_cache_size: i32,
    pub max_bones_per_strip: u16,
    pub max_bones_per_triangle: u16,
    pub max_bones_per_vertex: i32,
    pub checksum: i32,
    pub lod_count: i32,
    pub material_replacement_offset: i32,
    pub body_part_count: i32,
    pub body_part_offset: i32,
}

/// Record sizes that depend on the primary file's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyLayout {
    pub strip_group_size: usize,
    pub strip_size: usize,
}

impl TopologyLayout {
    /// Version 49 models append topology index fields to strip groups and strips.
    pub fn for_model_version(version: i32) -> Self {
        let extra = if version >= 49 { 8 } else { 0 };
        Self {
            strip_group_size: 25 + extra,
            strip_size: 27 + extra,
        }
    }
}

/// What the topology walk needs from the rest of the load.
#[derive(Debug, Clone, Copy)]
pub struct TopologyContext<'a> {
    pub model_version: i32,
    /// Header hierarchy supplying each mesh's first global vertex.
    pub body_parts: &'a [BodyPart],
    pub index_policy: IndexPolicy,
}

/// Triangles decoded from the topology file, with walk statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleList {
    pub triangles: Vec<[u32; 3]>,
    pub strip_groups: usize,
    pub strips: usize,
    /// Non-restart indices read from strips.
    pub index_count: usize,
    pub out_of_range: usize,
}

impl TriangleList {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct StripGroupHeader {
    vertex_count: i32,
    vertex_offset: i32,
    index_count: i32,
    index_offset: i32,
    strip_count: i32,
    strip_offset: i32,
}

#[derive(Debug, Clone, Copy)]
struct StripHeader {
    index_count: i32,
    index_offset: i32,
    flags: u8,
}

fn parse_topology_header(input: &mut &[u8]) -> WResult<TopologyHeader> {
    let version = le_i32.parse_next(input)?;
    let vertex_cache_size = le_i32.parse_next(input)?;
    let max_bones_per_strip = le_u16.parse_next(input)?;
    let max_bones_per_triangle = le_u16.parse_next(input)?;
    let max_bones_per_vertex = le_i32.parse_next(input)?;
    let checksum = le_i32.parse_next(input)?;
    let lod_count = le_i32.parse_next(input)?;
    let material_replacement_offset = le_i32.parse_next(input)?;
    let body_part_count = le_i32.parse_next(input)?;
    let body_part_offset = le_i32.parse_next(input)?;
    Ok(TopologyHeader {
        version,
        vertex_cache_size,
        max_bones_per_strip,
        max_bones_per_triangle,
        max_bones_per_vertex,
        checksum,
        lod_count,
        material_replacement_offset,
        body_part_count,
        body_part_offset,
    })
}

/// `(count, offset)`; shared by body part, model and mesh records.
fn parse_count_offset(input: &mut &[u8]) -> WResult<(i32, i32)> {
    let count = le_i32.parse_next(input)?;
    let offset = le_i32.parse_next(input)?;
    Ok((count, offset))
}

fn parse_lod(input: &mut &[u8]) -> WResult<(i32, i32, f32)> {
    let mesh_count = le_i32.parse_next(input)?;
    let mesh_offset = le_i32.parse_next(input)?;
    let switch_point = le_f32.parse_next(input)?;
    Ok((mesh_count, mesh_offset, switch_point))
}

fn parse_strip_group_header(input: &mut &[u8]) -> WResult<StripGroupHeader> {
    let vertex_count = le_i32.parse_next(input)?;
    let vertex_offset = le_i32.parse_next(input)?;
    let index_count = le_i32.parse_next(input)?;
    let index_offset = le_i32.parse_next(input)?;
    let strip_count = le_i32.parse_next(input)?;
    let strip_offset = le_i32.parse_next(input)?;
    let _flags = le_u8.parse_next(input)?;
    Ok(StripGroupHeader {
        vertex_count,
        vertex_offset,
        index_count,
        index_offset,
        strip_count,
        strip_offset,
    })
}

fn parse_strip_header(input: &mut &[u8]) -> WResult<StripHeader> {
    let index_count = le_i32.parse_next(input)?;
    let index_offset = le_i32.parse_next(input)?;
    let _vertex_count = le_i32.parse_next(input)?;
    let _vertex_offset = le_i32.parse_next(input)?;
    let _bone_count = le_i16.parse_next(input)?;
    let flags = le_u8.parse_next(input)?;
    Ok(StripHeader {
        index_count,
        index_offset,
        flags,
    })
}

/// `origMeshVertID` of a 9-byte strip-group vertex.
fn parse_original_vertex_id(input: &mut &[u8]) -> WResult<u16> {
    // bone weight indices[3], bone count
    let _ = take(4usize).parse_next(input)?;
    let id = le_u16.parse_next(input)?;
    // bone ids[3]
    let _ = take(3usize).parse_next(input)?;
    Ok(id)
}

/// Locate a table, turning any bounds or ceiling violation into a fatal error.
fn checked_table(
    file_data: &[u8],
    anchor: usize,
    rel: i32,
    count: i32,
    stride: usize,
    ceiling: usize,
    what: &'static str,
) -> Result<Table, Report<AssetError>> {
    locate_table(file_data.len(), anchor, rel, count, stride, ceiling)
        .map_err(|e| Report::new(AssetError::malformed(what, e.to_string())))
}

/// Walk LOD 0 of the topology file and expand every strip into triangles
/// over the global vertex array of `vertex_count` vertices.
pub fn parse_topology(
    file_data: &[u8],
    expected_checksum: i32,
    vertex_count: usize,
    context: &TopologyContext<'_>,
    warnings: &mut Vec<Warning>,
) -> Result<TriangleList, Report<AssetError>> {
    let (header, _) = parse_record(file_data, 0, VTX_HEADER_SIZE, parse_topology_header)?;

    // The file carries no magic; the version is the only signature.
    if header.version != VTX_VERSION {
        return Err(Report::new(AssetError::UnsupportedVersion {
            file: AssetFile::Topology,
            found: header.version,
            supported: "7",
        }));
    }
    if header.checksum != expected_checksum {
        warn!(
            expected = expected_checksum,
            found = header.checksum,
            "topology file checksum mismatch"
        );
        warnings.push(Warning::ChecksumMismatch {
            file: AssetFile::Topology,
            expected: expected_checksum,
            found: header.checksum,
        });
    }
    if !(0..=MAX_LODS as i32).contains(&header.lod_count) {
        return Err(Report::new(AssetError::malformed(
            "lods",
            format!("count {} is outside 0..={MAX_LODS}", header.lod_count),
        )));
    }

    let mut walker = Walker {
        file_data,
        layout: TopologyLayout::for_model_version(context.model_version),
        context,
        vertex_count,
        list: TriangleList::default(),
        warnings,
    };

    let parts = checked_table(
        file_data,
        0,
        header.body_part_offset,
        header.body_part_count,
        BODY_PART_SIZE,
        MAX_BODY_PARTS,
        "body parts",
    )?;
    debug!(body_parts = parts.count, layout = ?walker.layout, "walking topology");

    for (body_part, part_base) in parts.offsets().enumerate() {
        walker.body_part(body_part, part_base)?;
    }

    let list = walker.list;
    if list.index_count > 0
        && list.out_of_range as f64 > list.index_count as f64 * MAX_INVALID_INDEX_RATIO
    {
        return Err(Report::new(AssetError::malformed(
            "indices",
            format!(
                "{} of {} indices are out of range",
                list.out_of_range, list.index_count
            ),
        )));
    }

    debug!(
        triangles = list.triangles.len(),
        strip_groups = list.strip_groups,
        strips = list.strips,
        "topology decoded"
    );
    Ok(list)
}

struct Walker<'a, 'w> {
    file_data: &'a [u8],
    layout: TopologyLayout,
    context: &'a TopologyContext<'a>,
    vertex_count: usize,
    list: TriangleList,
    warnings: &'w mut Vec<Warning>,
}

impl Walker<'_, '_> {
    fn body_part(&mut self, body_part: usize, base: usize) -> Result<(), Report<AssetError>> {
        let ((count, offset), _) =
            parse_record(self.file_data, base, BODY_PART_SIZE, parse_count_offset)?;
        let models = checked_table(
            self.file_data,
            base,
            offset,
            count,
            MODEL_SIZE,
            MAX_MODELS,
            "models",
        )?;
        for (model, model_base) in models.offsets().enumerate() {
            self.model(body_part, model, model_base)?;
        }
        Ok(())
    }

    fn model(&mut self, body_part: usize, model: usize, base: usize) -> Result<(), Report<AssetError>> {
        let ((lod_count, lod_offset), _) =
            parse_record(self.file_data, base, MODEL_SIZE, parse_count_offset)?;
        let lods = checked_table(
            self.file_data,
            base,
            lod_offset,
            lod_count,
            LOD_SIZE,
            MAX_LODS,
            "lods",
        )?;
        let Some(lod_base) = lods.offsets().next() else {
            return Ok(());
        };

        let ((mesh_count, mesh_offset, _switch_point), _) =
            parse_record(self.file_data, lod_base, LOD_SIZE, parse_lod)?;
        let meshes = checked_table(
            self.file_data,
            lod_base,
            mesh_offset,
            mesh_count,
            MESH_SIZE,
            MAX_MESHES,
            "meshes",
        )?;

        for (mesh, mesh_base) in meshes.offsets().enumerate() {
            let ((group_count, group_offset), _) =
                parse_record(self.file_data, mesh_base, MESH_SIZE, parse_count_offset)?;
            let groups = checked_table(
                self.file_data,
                mesh_base,
                group_offset,
                group_count,
                self.layout.strip_group_size,
                MAX_STRIP_GROUPS,
                "strip groups",
            )?;
            for (strip_group, group_base) in groups.offsets().enumerate() {
                let path = StripGroupPath {
                    body_part,
                    model,
                    mesh,
                    strip_group,
                };
                self.strip_group(path, group_base)?;
            }
        }
        Ok(())
    }

    fn strip_group(&mut self, path: StripGroupPath, base: usize) -> Result<(), Report<AssetError>> {
        let file_data = self.file_data;
        let (group, _) = parse_record(
            file_data,
            base,
            self.layout.strip_group_size,
            parse_strip_group_header,
        )?;

        let vertex_table = checked_table(
            file_data,
            base,
            group.vertex_offset,
            group.vertex_count,
            VERTEX_SIZE,
            MAX_GROUP_VERTICES,
            "strip group vertices",
        )?;
        let index_table = checked_table(
            file_data,
            base,
            group.index_offset,
            group.index_count,
            INDEX_SIZE,
            MAX_GROUP_INDICES,
            "strip group indices",
        )?;
        let strip_table = checked_table(
            file_data,
            base,
            group.strip_offset,
            group.strip_count,
            self.layout.strip_size,
            MAX_STRIPS,
            "strips",
        )?;
        self.list.strip_groups += 1;

        if strip_table.is_empty() {
            debug!(%path, "strip group has no strips");
            return Ok(());
        }

        let vertex_ids = vertex_table
            .offsets()
            .map(|at| parse_record(file_data, at, VERTEX_SIZE, parse_original_vertex_id).map(|(id, _)| id))
            .collect::<Result<Vec<u16>, _>>()?;
        let (indices, _) = parse_record(
            file_data,
            index_table.start,
            index_table.count * INDEX_SIZE,
            |input| -> WResult<Vec<u16>> { repeat(index_table.count, le_u16).parse_next(input) },
        )?;

        let base_vertex = mesh_vertex_base(
            self.context.body_parts,
            path.body_part,
            path.model,
            path.mesh,
        )
        .unwrap_or(0);
        let mut remapper = Remapper::new(
            &vertex_ids,
            base_vertex,
            self.vertex_count,
            self.context.index_policy,
        );

        for strip_base in strip_table.offsets() {
            let (strip, _) =
                parse_record(file_data, strip_base, self.layout.strip_size, parse_strip_header)?;
            let run = usize::try_from(strip.index_offset)
                .ok()
                .zip(usize::try_from(strip.index_count).ok())
                .and_then(|(start, len)| indices.get(start..start.checked_add(len)?));
            let Some(run) = run else {
                return Err(Report::new(AssetError::malformed(
                    "strip",
                    format!(
                        "in {path}: indices {}+{} outside the group's {} entries",
                        strip.index_offset,
                        strip.index_count,
                        indices.len()
                    ),
                )));
            };

            let mapped = remapper.map_all(run);
            self.list.index_count += run.iter().filter(|&&i| i != STRIP_RESTART).count();
            expand(
                Primitive::from_flags(strip.flags),
                &mapped,
                &mut self.list.triangles,
            );
            self.list.strips += 1;
        }

        let count = remapper.out_of_range();
        if count > 0 {
            let policy = self.context.index_policy;
            warn!(%path, count, %policy, "out-of-range vertex indices");
            self.list.out_of_range += count;
            self.warnings.push(Warning::IndexOutOfRange {
                group: path,
                count,
                policy,
            });
        }
        Ok(())
    }
}
