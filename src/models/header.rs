//! Parser for the primary `.mdl` file (`studiohdr_t`).
//!
//! Only the fixed 248-byte prefix of the header is read by [`parse_header`].
//! The descriptive tables it points at (bones, textures, texture directories
//! and the body part → model → mesh hierarchy) are decoded separately, each
//! bounds-checked at the point of use. A bad table is a warning, never a
//! failure: the header alone is enough for a bounding-box fallback.

use std::ops::{Range, RangeInclusive};

use glam::{Quat, Vec3};
use rootcause::Report;
use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{le_f32, le_i32, le_u32};
use winnow::token::take;

use crate::data::parser_utils::{
    Table, WResult, clamp_count, fixed_string, locate_table, parse_quat, parse_record,
    parse_vec3, read_null_terminated_string, read_relative_name,
};
use crate::error::{AssetError, AssetFile, Warning};
use crate::models::limits::{
    MAX_BODY_PARTS, MAX_BONES, MAX_MESHES, MAX_MODELS, MAX_TEXTURE_DIRS, MAX_TEXTURES,
    MAX_VERTICES,
};
use crate::models::vertex::VERTEX_RECORD_SIZE;

/// "IDST" read as a little-endian u32.
pub const MDL_SIGNATURE: u32 = 0x54534449;
/// Header versions this decoder understands.
pub const SUPPORTED_VERSIONS: RangeInclusive<i32> = 44..=49;
/// Bytes of `studiohdr_t` that are read.
pub const HEADER_SIZE: usize = 248;

const TEXTURE_SIZE: usize = 64;
const TEXTURE_DIR_SIZE: usize = 4;
const BONE_SIZE: usize = 216;
const BODY_PART_SIZE: usize = 16;
const MODEL_SIZE: usize = 148;
const MESH_SIZE: usize = 116;

/// A `(count, offset)` pair from the header's table of contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TableRef {
    pub count: i32,
    pub offset: i32,
}

/// Axis-aligned box stored as two corners.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// True when the box has no extent on any axis.
    pub fn is_empty(&self) -> bool {
        let extent = self.max - self.min;
        extent.abs().max_element() == 0.0
    }

    /// Corners in the order min-z face (counter-clockwise from `min`), then
    /// the max-z face in the same order.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(b.x, b.y, b.z),
            Vec3::new(a.x, b.y, b.z),
        ]
    }
}

/// Fixed fields of the primary file header.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssetHeader {
    pub signature: u32,
    pub version: i32,
    /// Identity tag the companion files must repeat.
    pub checksum: i32,
    pub name: String,
    /// File length as declared by the compiler.
    pub length: i32,
    pub eye_position: Vec3,
    pub illum_position: Vec3,
    pub hull: BoundingBox,
    pub view_bbox: BoundingBox,
    pub flags: i32,
    pub bones: TableRef,
    pub bone_controllers: TableRef,
    pub hitbox_sets: TableRef,
    pub local_animations: TableRef,
    pub local_sequences: TableRef,
    pub activity_list_version: i32,
    pub events_indexed: i32,
    pub textures: TableRef,
    pub texture_dirs: TableRef,
    pub skin_reference_count: i32,
    pub skin_family_count: i32,
    pub skin_index: i32,
    pub body_parts: TableRef,
    pub attachments: TableRef,
}

/// A material slot used by the model's meshes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Texture {
    pub name: String,
    pub flags: i32,
}

/// Rest-pose description of one bone. Nothing here is evaluated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bone {
    pub name: String,
    /// `None` for root bones.
    pub parent: Option<usize>,
    pub position: Vec3,
    pub rotation: Quat,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BodyPart {
    pub name: String,
    pub base: i32,
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Model {
    pub name: String,
    pub kind: i32,
    pub bounding_radius: f32,
    /// Index of the model's first vertex in the LOD-0 vertex array.
    pub first_vertex: usize,
    pub vertex_count: usize,
    pub meshes: Vec<Mesh>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Mesh {
    pub material: i32,
    pub id: i32,
    pub center: Vec3,
    /// Global index of the mesh's first vertex (model base + mesh offset).
    pub first_vertex: usize,
    pub vertex_count: usize,
}

impl Mesh {
    pub fn vertex_range(&self) -> Range<usize> {
        self.first_vertex..self.first_vertex + self.vertex_count
    }
}

// ---------------------------------------------------------------------------
// Winnow sub-parsers
// ---------------------------------------------------------------------------

fn parse_table_ref(input: &mut &[u8]) -> WResult<TableRef> {
    let count = le_i32.parse_next(input)?;
    let offset = le_i32.parse_next(input)?;
    Ok(TableRef { count, offset })
}

fn parse_bounding_box(input: &mut &[u8]) -> WResult<BoundingBox> {
    let min = parse_vec3(input)?;
    let max = parse_vec3(input)?;
    Ok(BoundingBox { min, max })
}

fn parse_header_fields(input: &mut &[u8]) -> WResult<AssetHeader> {
    let signature = le_u32.parse_next(input)?;
    let version = le_i32.parse_next(input)?;
    let checksum = le_i32.parse_next(input)?;
    let name = fixed_string(take(64usize).parse_next(input)?);
    let length = le_i32.parse_next(input)?;
    let eye_position = parse_vec3(input)?;
    let illum_position = parse_vec3(input)?;
    let hull = parse_bounding_box(input)?;
    let view_bbox = parse_bounding_box(input)?;
    let flags = le_i32.parse_next(input)?;
    let bones = parse_table_ref(input)?;
    let bone_controllers = parse_table_ref(input)?;
    let hitbox_sets = parse_table_ref(input)?;
    let local_animations = parse_table_ref(input)?;
    let local_sequences = parse_table_ref(input)?;
    let activity_list_version = le_i32.parse_next(input)?;
    let events_indexed = le_i32.parse_next(input)?;
    let textures = parse_table_ref(input)?;
    let texture_dirs = parse_table_ref(input)?;
    let skin_reference_count = le_i32.parse_next(input)?;
    let skin_family_count = le_i32.parse_next(input)?;
    let skin_index = le_i32.parse_next(input)?;
    let body_parts = parse_table_ref(input)?;
    let attachments = parse_table_ref(input)?;

    Ok(AssetHeader {
        signature,
        version,
        checksum,
        name,
        length,
        eye_position,
        illum_position,
        hull,
        view_bbox,
        flags,
        bones,
        bone_controllers,
        hitbox_sets,
        local_animations,
        local_sequences,
        activity_list_version,
        events_indexed,
        textures,
        texture_dirs,
        skin_reference_count,
        skin_family_count,
        skin_index,
        body_parts,
        attachments,
    })
}

// ---------------------------------------------------------------------------
// Header entry points
// ---------------------------------------------------------------------------

/// Read the fixed header fields without judging them.
pub fn read_header(file_data: &[u8]) -> Result<AssetHeader, Report<AssetError>> {
    let (header, _) = parse_record(file_data, 0, HEADER_SIZE, parse_header_fields)?;
    debug!(name = %header.name, version = header.version, "read model header");
    Ok(header)
}

impl AssetHeader {
    /// Check the signature and version.
    pub fn validate(&self) -> Result<(), Report<AssetError>> {
        if self.signature != MDL_SIGNATURE {
            return Err(Report::new(AssetError::InvalidSignature {
                file: AssetFile::Model,
                expected: MDL_SIGNATURE,
                found: self.signature,
            }));
        }
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(Report::new(AssetError::UnsupportedVersion {
                file: AssetFile::Model,
                found: self.version,
                supported: "44..=49",
            }));
        }
        Ok(())
    }
}

/// Parse and validate the primary file header.
pub fn parse_header(file_data: &[u8]) -> Result<AssetHeader, Report<AssetError>> {
    let header = read_header(file_data)?;
    header.validate()?;
    Ok(header)
}

// ---------------------------------------------------------------------------
// Descriptive tables
// ---------------------------------------------------------------------------

/// Clamp and locate a table declared relative to `anchor`. Problems are
/// recorded as warnings and yield an empty table.
fn header_table(
    file_data: &[u8],
    anchor: usize,
    table_ref: TableRef,
    stride: usize,
    ceiling: usize,
    table: &'static str,
    warnings: &mut Vec<Warning>,
) -> Table {
    let count = clamp_count(table_ref.count, ceiling, table, warnings);
    match locate_table(
        file_data.len(),
        anchor,
        table_ref.offset,
        count as i32,
        stride,
        ceiling,
    ) {
        Ok(located) => located,
        Err(e) => {
            warn!(table, error = %e, "skipping table");
            warnings.push(Warning::TableOutOfBounds {
                table,
                offset: anchor as i64 + table_ref.offset as i64,
                file_len: file_data.len(),
            });
            Table::EMPTY
        }
    }
}

fn parse_texture_fields(input: &mut &[u8]) -> WResult<(i32, i32)> {
    let name_offset = le_i32.parse_next(input)?;
    let flags = le_i32.parse_next(input)?;
    // used, unused, material, client material, unused[10]
    let _ = take(TEXTURE_SIZE - 8).parse_next(input)?;
    Ok((name_offset, flags))
}

/// Decode the texture table. Names are stored relative to each record.
pub fn parse_textures(
    file_data: &[u8],
    header: &AssetHeader,
    warnings: &mut Vec<Warning>,
) -> Vec<Texture> {
    let table = header_table(
        file_data,
        0,
        header.textures,
        TEXTURE_SIZE,
        MAX_TEXTURES,
        "textures",
        warnings,
    );

    let mut textures = Vec::with_capacity(table.count);
    for base in table.offsets() {
        match parse_record(file_data, base, TEXTURE_SIZE, parse_texture_fields) {
            Ok(((name_offset, flags), _)) => textures.push(Texture {
                name: read_relative_name(file_data, base, name_offset),
                flags,
            }),
            Err(e) => {
                unreadable("textures", &e, warnings);
                break;
            }
        }
    }
    textures
}

/// Decode the texture search directories. Unlike names inside records, these
/// offsets are absolute.
pub fn parse_texture_dirs(
    file_data: &[u8],
    header: &AssetHeader,
    warnings: &mut Vec<Warning>,
) -> Vec<String> {
    let table = header_table(
        file_data,
        0,
        header.texture_dirs,
        TEXTURE_DIR_SIZE,
        MAX_TEXTURE_DIRS,
        "texture directories",
        warnings,
    );

    table
        .offsets()
        .filter_map(|base| {
            let (offset, _) = parse_record(file_data, base, TEXTURE_DIR_SIZE, |input| {
                le_i32.parse_next(input)
            })
            .ok()?;
            read_null_terminated_string(file_data, usize::try_from(offset).ok()?)
        })
        .collect()
}

struct BoneFields {
    name_offset: i32,
    parent: i32,
    position: Vec3,
    rotation: Quat,
    flags: i32,
}

fn parse_bone_fields(input: &mut &[u8]) -> WResult<BoneFields> {
    let name_offset = le_i32.parse_next(input)?;
    let parent = le_i32.parse_next(input)?;
    // bone controllers[6]
    let _ = take(24usize).parse_next(input)?;
    let position = parse_vec3(input)?;
    let rotation = parse_quat(input)?;
    // euler rotation, position scale, rotation scale, pose-to-bone 3x4, alignment quaternion
    let _ = take(12usize + 12 + 12 + 48 + 16).parse_next(input)?;
    let flags = le_i32.parse_next(input)?;
    // procedural type/index, physics bone, surface prop, contents, unused[8]
    let _ = take(20usize + 32).parse_next(input)?;
    Ok(BoneFields {
        name_offset,
        parent,
        position,
        rotation,
        flags,
    })
}

/// Decode bone names and rest transforms.
pub fn parse_bones(
    file_data: &[u8],
    header: &AssetHeader,
    warnings: &mut Vec<Warning>,
) -> Vec<Bone> {
    let table = header_table(
        file_data,
        0,
        header.bones,
        BONE_SIZE,
        MAX_BONES,
        "bones",
        warnings,
    );

    let mut bones = Vec::with_capacity(table.count);
    for base in table.offsets() {
        match parse_record(file_data, base, BONE_SIZE, parse_bone_fields) {
            Ok((fields, _)) => bones.push(Bone {
                name: read_relative_name(file_data, base, fields.name_offset),
                parent: usize::try_from(fields.parent)
                    .ok()
                    .filter(|&parent| parent < table.count),
                position: fields.position,
                rotation: fields.rotation,
                flags: fields.flags,
            }),
            Err(e) => {
                unreadable("bones", &e, warnings);
                break;
            }
        }
    }
    bones
}

fn parse_body_part_fields(input: &mut &[u8]) -> WResult<(i32, i32, i32, i32)> {
    let name_offset = le_i32.parse_next(input)?;
    let model_count = le_i32.parse_next(input)?;
    let base = le_i32.parse_next(input)?;
    let model_offset = le_i32.parse_next(input)?;
    Ok((name_offset, model_count, base, model_offset))
}

struct ModelFields {
    name: String,
    kind: i32,
    bounding_radius: f32,
    meshes: TableRef,
    vertex_count: i32,
    vertex_index: i32,
}

fn parse_model_fields(input: &mut &[u8]) -> WResult<ModelFields> {
    let name = fixed_string(take(64usize).parse_next(input)?);
    let kind = le_i32.parse_next(input)?;
    let bounding_radius = le_f32.parse_next(input)?;
    let meshes = parse_table_ref(input)?;
    let vertex_count = le_i32.parse_next(input)?;
    let vertex_index = le_i32.parse_next(input)?;
    // tangents, attachments, eyeballs, vertex data pointers, unused[8]
    let _ = take(4usize + 8 + 8 + 8 + 32).parse_next(input)?;
    Ok(ModelFields {
        name,
        kind,
        bounding_radius,
        meshes,
        vertex_count,
        vertex_index,
    })
}

struct MeshFields {
    material: i32,
    vertex_count: i32,
    vertex_offset: i32,
    id: i32,
    center: Vec3,
}

fn parse_mesh_fields(input: &mut &[u8]) -> WResult<MeshFields> {
    let material = le_i32.parse_next(input)?;
    let _model_index = le_i32.parse_next(input)?;
    let vertex_count = le_i32.parse_next(input)?;
    let vertex_offset = le_i32.parse_next(input)?;
    // flexes, material type/param
    let _ = take(16usize).parse_next(input)?;
    let id = le_i32.parse_next(input)?;
    let center = parse_vec3(input)?;
    // per-LOD vertex data, unused[8]
    let _ = take(36usize + 32).parse_next(input)?;
    Ok(MeshFields {
        material,
        vertex_count,
        vertex_offset,
        id,
        center,
    })
}

/// Decode the body part → model → mesh hierarchy.
///
/// Every table offset is relative to the record that declares it. Models
/// store their first vertex as a byte offset into the vertex data, meshes as
/// a vertex offset from their model; both are resolved into global LOD-0
/// vertex indices here.
pub fn parse_body_parts(
    file_data: &[u8],
    header: &AssetHeader,
    warnings: &mut Vec<Warning>,
) -> Vec<BodyPart> {
    let table = header_table(
        file_data,
        0,
        header.body_parts,
        BODY_PART_SIZE,
        MAX_BODY_PARTS,
        "body parts",
        warnings,
    );

    let mut body_parts = Vec::with_capacity(table.count);
    for base in table.offsets() {
        match parse_body_part_at(file_data, base, warnings) {
            Ok(body_part) => body_parts.push(body_part),
            Err(e) => {
                unreadable("body parts", &e, warnings);
                break;
            }
        }
    }
    debug!(count = body_parts.len(), "parsed body parts");
    body_parts
}

fn parse_body_part_at(
    file_data: &[u8],
    base: usize,
    warnings: &mut Vec<Warning>,
) -> Result<BodyPart, Report<AssetError>> {
    let ((name_offset, model_count, part_base, model_offset), _) =
        parse_record(file_data, base, BODY_PART_SIZE, parse_body_part_fields)?;

    let models_table = header_table(
        file_data,
        base,
        TableRef {
            count: model_count,
            offset: model_offset,
        },
        MODEL_SIZE,
        MAX_MODELS,
        "models",
        warnings,
    );

    let mut models = Vec::with_capacity(models_table.count);
    for model_base in models_table.offsets() {
        models.push(parse_model_at(file_data, model_base, warnings)?);
    }

    Ok(BodyPart {
        name: read_relative_name(file_data, base, name_offset),
        base: part_base,
        models,
    })
}

fn parse_model_at(
    file_data: &[u8],
    base: usize,
    warnings: &mut Vec<Warning>,
) -> Result<Model, Report<AssetError>> {
    let (fields, _) = parse_record(file_data, base, MODEL_SIZE, parse_model_fields)?;
    let first_vertex = fields.vertex_index.max(0) as usize / VERTEX_RECORD_SIZE;
    let vertex_count = clamp_count(fields.vertex_count, MAX_VERTICES, "model vertices", warnings);

    let meshes_table = header_table(
        file_data,
        base,
        fields.meshes,
        MESH_SIZE,
        MAX_MESHES,
        "meshes",
        warnings,
    );

    let mut meshes = Vec::with_capacity(meshes_table.count);
    for mesh_base in meshes_table.offsets() {
        let (mesh, _) = parse_record(file_data, mesh_base, MESH_SIZE, parse_mesh_fields)?;
        meshes.push(Mesh {
            material: mesh.material,
            id: mesh.id,
            center: mesh.center,
            first_vertex: first_vertex + mesh.vertex_offset.max(0) as usize,
            vertex_count: clamp_count(mesh.vertex_count, MAX_VERTICES, "mesh vertices", warnings),
        });
    }

    Ok(Model {
        name: fields.name,
        kind: fields.kind,
        bounding_radius: fields.bounding_radius,
        first_vertex,
        vertex_count,
        meshes,
    })
}

fn unreadable(table: &'static str, report: &Report<AssetError>, warnings: &mut Vec<Warning>) {
    warn!(table, error = %report, "table unreadable");
    warnings.push(Warning::TableUnreadable {
        table,
        reason: report.current_context().to_string(),
    });
}

/// Global LOD-0 index of the first vertex of a mesh, if the header describes it.
pub fn mesh_vertex_base(
    body_parts: &[BodyPart],
    body_part: usize,
    model: usize,
    mesh: usize,
) -> Option<usize> {
    body_parts
        .get(body_part)?
        .models
        .get(model)?
        .meshes
        .get(mesh)
        .map(|mesh| mesh.first_vertex)
}

/// Vertex ranges of every non-empty mesh, in hierarchy order.
pub fn mesh_ranges(body_parts: &[BodyPart]) -> impl Iterator<Item = Range<usize>> + '_ {
    body_parts
        .iter()
        .flat_map(|part| part.models.iter())
        .flat_map(|model| model.meshes.iter())
        .filter(|mesh| mesh.vertex_count > 0)
        .map(Mesh::vertex_range)
}
