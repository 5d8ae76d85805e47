//! Parser for the `.vvd` vertex companion.
//!
//! The file holds a 64-byte header followed by an optional fixup table and a
//! pool of fixed 48-byte vertex records. Only LOD 0 is decoded.

use glam::{Vec2, Vec3};
use rootcause::Report;
use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{le_f32, le_i32, le_u8, le_u32};

use crate::data::parser_utils::{
    WResult, clamp_count, locate_table, parse_record, parse_vec2, parse_vec3,
};
use crate::error::{AssetError, AssetFile, Warning};
use crate::models::limits::{MAX_FIXUPS, MAX_LODS, MAX_VERTICES};

/// "IDSV" read as a little-endian u32.
pub const VVD_SIGNATURE: u32 = 0x56534449;
pub const VVD_VERSION: i32 = 4;
pub const VVD_HEADER_SIZE: usize = 64;
pub const VERTEX_RECORD_SIZE: usize = 48;
const FIXUP_SIZE: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct VertexHeader {
    pub signature: u32,
    pub version: i32,
    pub checksum: i32,
    pub lod_count: i32,
    pub lod_vertex_counts: [i32; MAX_LODS],
    pub fixup_count: i32,
    pub fixup_table_start: i32,
    pub vertex_data_start: i32,
    pub tangent_data_start: i32,
}

/// Maps `count` pool vertices starting at `source_vertex` into the lists of
/// every LOD up to and including `lod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fixup {
    pub lod: i32,
    pub source_vertex: i32,
    pub count: i32,
}

/// One skinned vertex as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VertexRecord {
    pub weights: [f32; 3],
    pub bones: [u8; 3],
    pub bone_count: u8,
    pub position: Vec3,
    pub normal: Vec3,
    pub texcoord: Vec2,
}

/// The decoded LOD-0 vertex array.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    pub header: VertexHeader,
    pub vertices: Vec<VertexRecord>,
}

impl VertexBuffer {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn positions(&self) -> impl ExactSizeIterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.position)
    }
}

fn parse_vertex_header(input: &mut &[u8]) -> WResult<VertexHeader> {
    let signature = le_u32.parse_next(input)?;
    let version = le_i32.parse_next(input)?;
    let checksum = le_i32.parse_next(input)?;
    let lod_count = le_i32.parse_next(input)?;
    let mut lod_vertex_counts = [0i32; MAX_LODS];
    for count in &mut lod_vertex_counts {
        *count = le_i32.parse_next(input)?;
    }
    let fixup_count = le_i32.parse_next(input)?;
    let fixup_table_start = le_i32.parse_next(input)?;
    let vertex_data_start = le_i32.parse_next(input)?;
    let tangent_data_start = le_i32.parse_next(input)?;
    Ok(VertexHeader {
        signature,
        version,
        checksum,
        lod_count,
        lod_vertex_counts,
        fixup_count,
        fixup_table_start,
        vertex_data_start,
        tangent_data_start,
    })
}

fn parse_fixup(input: &mut &[u8]) -> WResult<Fixup> {
    let lod = le_i32.parse_next(input)?;
    let source_vertex = le_i32.parse_next(input)?;
    let count = le_i32.parse_next(input)?;
    Ok(Fixup {
        lod,
        source_vertex,
        count,
    })
}

pub fn parse_vertex_record(input: &mut &[u8]) -> WResult<VertexRecord> {
    let weights = [
        le_f32.parse_next(input)?,
        le_f32.parse_next(input)?,
        le_f32.parse_next(input)?,
    ];
    let bones = [
        le_u8.parse_next(input)?,
        le_u8.parse_next(input)?,
        le_u8.parse_next(input)?,
    ];
    let bone_count = le_u8.parse_next(input)?;
    let position = parse_vec3(input)?;
    let normal = parse_vec3(input)?;
    let texcoord = parse_vec2(input)?;
    Ok(VertexRecord {
        weights,
        bones,
        bone_count,
        position,
        normal,
        texcoord,
    })
}

/// Decode the LOD-0 vertex array.
///
/// A file that ends before the declared number of vertices yields the
/// vertices read so far plus an [`Warning::UnexpectedEof`]. Fixups that sum
/// to fewer vertices than declared are reported as [`Warning::CountClamped`].
pub fn parse_vertices(
    file_data: &[u8],
    expected_checksum: i32,
    warnings: &mut Vec<Warning>,
) -> Result<VertexBuffer, Report<AssetError>> {
    let (header, _) = parse_record(file_data, 0, VVD_HEADER_SIZE, parse_vertex_header)?;

    if header.signature != VVD_SIGNATURE {
        return Err(Report::new(AssetError::InvalidSignature {
            file: AssetFile::Vertices,
            expected: VVD_SIGNATURE,
            found: header.signature,
        }));
    }
    if header.version != VVD_VERSION {
        warn!(version = header.version, "unexpected vertex file version");
        warnings.push(Warning::UnexpectedVersion {
            file: AssetFile::Vertices,
            found: header.version,
            expected: VVD_VERSION,
        });
    }
    if header.checksum != expected_checksum {
        warn!(
            expected = expected_checksum,
            found = header.checksum,
            "vertex file checksum mismatch"
        );
        warnings.push(Warning::ChecksumMismatch {
            file: AssetFile::Vertices,
            expected: expected_checksum,
            found: header.checksum,
        });
    }

    let declared = clamp_count(
        header.lod_vertex_counts[0],
        MAX_VERTICES,
        "lod 0 vertices",
        warnings,
    );
    let data_start = usize::try_from(header.vertex_data_start).map_err(|_| {
        Report::new(AssetError::ParseError(format!(
            "vertex data start {} is negative",
            header.vertex_data_start
        )))
    })?;

    let fixups = read_fixups(file_data, &header, warnings);
    debug!(
        declared,
        fixups = fixups.len(),
        data_start,
        "decoding vertices"
    );

    let available = file_data.len().saturating_sub(data_start) / VERTEX_RECORD_SIZE;
    let mut vertices = Vec::with_capacity(declared.min(available));
    let complete = if fixups.is_empty() {
        read_run(file_data, data_start, 0, declared, &mut vertices)
    } else {
        fixups
            .iter()
            .filter(|fixup| fixup.lod >= 0)
            .all(|fixup| {
                let remaining = declared - vertices.len();
                let count = (fixup.count.max(0) as usize).min(remaining);
                read_run(
                    file_data,
                    data_start,
                    fixup.source_vertex.max(0) as usize,
                    count,
                    &mut vertices,
                )
            })
    };

    if complete && vertices.len() < declared {
        warn!(
            decoded = vertices.len(),
            declared, "fixups cover fewer vertices than declared"
        );
        warnings.push(Warning::CountClamped {
            table: "lod 0 vertices",
            declared: declared as i64,
            clamped: vertices.len(),
        });
    } else if !complete {
        warn!(
            decoded = vertices.len(),
            declared, "vertex file ended early"
        );
        warnings.push(Warning::UnexpectedEof {
            file: AssetFile::Vertices,
            decoded: vertices.len(),
            declared,
        });
    }

    Ok(VertexBuffer { header, vertices })
}

/// Read `count` records starting at pool index `first`. Returns false when
/// the file ran out first.
fn read_run(
    file_data: &[u8],
    data_start: usize,
    first: usize,
    count: usize,
    out: &mut Vec<VertexRecord>,
) -> bool {
    let mut base = data_start + first * VERTEX_RECORD_SIZE;
    for _ in 0..count {
        match parse_record(file_data, base, VERTEX_RECORD_SIZE, parse_vertex_record) {
            Ok((vertex, next)) => {
                out.push(vertex);
                base = next;
            }
            Err(_) => return false,
        }
    }
    true
}

fn read_fixups(file_data: &[u8], header: &VertexHeader, warnings: &mut Vec<Warning>) -> Vec<Fixup> {
    let count = clamp_count(header.fixup_count, MAX_FIXUPS, "fixups", warnings);
    let table = match locate_table(
        file_data.len(),
        0,
        header.fixup_table_start,
        count as i32,
        FIXUP_SIZE,
        MAX_FIXUPS,
    ) {
        Ok(table) => table,
        Err(e) => {
            warn!(error = %e, "fixup table unusable, reading vertices in order");
            warnings.push(Warning::TableOutOfBounds {
                table: "fixups",
                offset: header.fixup_table_start as i64,
                file_len: file_data.len(),
            });
            return Vec::new();
        }
    };

    table
        .offsets()
        .filter_map(|base| {
            parse_record(file_data, base, FIXUP_SIZE, parse_fixup)
                .ok()
                .map(|(fixup, _)| fixup)
        })
        .collect()
}
