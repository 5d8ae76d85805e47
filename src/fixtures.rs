//! Synthetic model files for tests.
//!
//! Each builder writes the smallest well-formed file for its format, with
//! knobs for the corruptions the tests need. Layouts follow the real
//! little-endian records exactly; nothing here goes through the parsers.

use crate::data::MemoryAssetSource;
use crate::error::AssetFile;
use crate::models::header::MDL_SIGNATURE;
use crate::models::vertex::VVD_SIGNATURE;

pub const CHECKSUM: i32 = 0x1234_5678;

/// Growable little-endian buffer with positional writes.
#[derive(Debug, Default)]
pub struct ByteWriter {
    pub bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Append `size` zero bytes and return where they start.
    pub fn reserve(&mut self, size: usize) -> usize {
        let at = self.bytes.len();
        self.bytes.resize(at + size, 0);
        at
    }

    pub fn put(&mut self, at: usize, data: &[u8]) {
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    pub fn put_i32(&mut self, at: usize, value: i32) {
        self.put(at, &value.to_le_bytes());
    }

    pub fn put_u32(&mut self, at: usize, value: u32) {
        self.put(at, &value.to_le_bytes());
    }

    pub fn put_u16(&mut self, at: usize, value: u16) {
        self.put(at, &value.to_le_bytes());
    }

    pub fn put_i16(&mut self, at: usize, value: i16) {
        self.put(at, &value.to_le_bytes());
    }

    pub fn put_u8(&mut self, at: usize, value: u8) {
        self.bytes[at] = value;
    }

    pub fn put_f32(&mut self, at: usize, value: f32) {
        self.put(at, &value.to_le_bytes());
    }

    pub fn put_vec3(&mut self, at: usize, value: [f32; 3]) {
        for (i, v) in value.into_iter().enumerate() {
            self.put_f32(at + i * 4, v);
        }
    }

    /// Offset of `to` relative to `from`, as stored on disk.
    pub fn rel(from: usize, to: usize) -> i32 {
        to as i32 - from as i32
    }

    /// Append a NUL-terminated string and return its offset.
    pub fn push_cstr(&mut self, value: &str) -> usize {
        let at = self.reserve(value.len() + 1);
        self.put(at, value.as_bytes());
        at
    }
}

// ---------------------------------------------------------------------------
// Primary file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FixtureModel {
    pub name: String,
    /// Index of the model's first vertex in the global array.
    pub first_vertex: usize,
    pub vertex_count: usize,
    /// `(vertex offset from the model, vertex count)` per mesh.
    pub meshes: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureBodyPart {
    pub name: String,
    pub models: Vec<FixtureModel>,
}

/// `.mdl` writer. Tables are laid out after the fixed header in declaration order.
#[derive(Debug, Clone)]
pub struct MdlBuilder {
    pub signature: u32,
    pub version: i32,
    pub checksum: i32,
    pub name: String,
    pub hull: ([f32; 3], [f32; 3]),
    pub view_bbox: ([f32; 3], [f32; 3]),
    pub textures: Vec<String>,
    pub texture_dirs: Vec<String>,
    /// `(name, parent, position)`
    pub bones: Vec<(String, i32, [f32; 3])>,
    pub body_parts: Vec<FixtureBodyPart>,
}

impl Default for MdlBuilder {
    fn default() -> Self {
        Self {
            signature: MDL_SIGNATURE,
            version: 48,
            checksum: CHECKSUM,
            name: "fixture.mdl".into(),
            hull: ([-1.0; 3], [1.0; 3]),
            view_bbox: ([-2.0; 3], [2.0; 3]),
            textures: Vec::new(),
            texture_dirs: Vec::new(),
            bones: Vec::new(),
            body_parts: Vec::new(),
        }
    }
}

impl MdlBuilder {
    /// One body part, one model, one mesh covering `vertex_count` vertices.
    pub fn single_mesh(vertex_count: usize) -> Self {
        Self {
            body_parts: vec![FixtureBodyPart {
                name: "body".into(),
                models: vec![FixtureModel {
                    name: "model".into(),
                    first_vertex: 0,
                    vertex_count,
                    meshes: vec![(0, vertex_count)],
                }],
            }],
            ..Default::default()
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::default();
        w.reserve(248);
        w.put_u32(0, self.signature);
        w.put_i32(4, self.version);
        w.put_i32(8, self.checksum);
        let name = self.name.as_bytes();
        w.put(12, &name[..name.len().min(63)]);
        w.put_vec3(104, self.hull.0);
        w.put_vec3(116, self.hull.1);
        w.put_vec3(128, self.view_bbox.0);
        w.put_vec3(140, self.view_bbox.1);

        // Bones
        let bones = w.reserve(self.bones.len() * 216);
        w.put_i32(156, self.bones.len() as i32);
        w.put_i32(160, bones as i32);
        for (i, (name, parent, position)) in self.bones.iter().enumerate() {
            let base = bones + i * 216;
            let name_at = w.push_cstr(name);
            w.put_i32(base, ByteWriter::rel(base, name_at));
            w.put_i32(base + 4, *parent);
            w.put_vec3(base + 32, *position);
            w.put_f32(base + 56, 1.0);
        }

        // Textures
        let textures = w.reserve(self.textures.len() * 64);
        w.put_i32(204, self.textures.len() as i32);
        w.put_i32(208, textures as i32);
        for (i, name) in self.textures.iter().enumerate() {
            let base = textures + i * 64;
            let name_at = w.push_cstr(name);
            w.put_i32(base, ByteWriter::rel(base, name_at));
        }

        // Texture directories hold absolute string offsets
        let dirs = w.reserve(self.texture_dirs.len() * 4);
        w.put_i32(212, self.texture_dirs.len() as i32);
        w.put_i32(216, dirs as i32);
        for (i, dir) in self.texture_dirs.iter().enumerate() {
            let dir_at = w.push_cstr(dir);
            w.put_i32(dirs + i * 4, dir_at as i32);
        }

        // Body parts → models → meshes
        let parts = w.reserve(self.body_parts.len() * 16);
        w.put_i32(232, self.body_parts.len() as i32);
        w.put_i32(236, parts as i32);
        for (i, part) in self.body_parts.iter().enumerate() {
            let part_base = parts + i * 16;
            let name_at = w.push_cstr(&part.name);
            w.put_i32(part_base, ByteWriter::rel(part_base, name_at));
            w.put_i32(part_base + 4, part.models.len() as i32);
            w.put_i32(part_base + 8, 1);

            let models = w.reserve(part.models.len() * 148);
            w.put_i32(part_base + 12, ByteWriter::rel(part_base, models));
            for (j, model) in part.models.iter().enumerate() {
                let model_base = models + j * 148;
                let name = model.name.as_bytes();
                w.put(model_base, &name[..name.len().min(63)]);
                w.put_i32(model_base + 72, model.meshes.len() as i32);
                w.put_i32(model_base + 80, model.vertex_count as i32);
                w.put_i32(model_base + 84, (model.first_vertex * 48) as i32);

                let meshes = w.reserve(model.meshes.len() * 116);
                w.put_i32(model_base + 76, ByteWriter::rel(model_base, meshes));
                for (k, &(offset, count)) in model.meshes.iter().enumerate() {
                    let mesh_base = meshes + k * 116;
                    w.put_i32(mesh_base, k as i32);
                    w.put_i32(mesh_base + 4, ByteWriter::rel(mesh_base, model_base));
                    w.put_i32(mesh_base + 8, count as i32);
                    w.put_i32(mesh_base + 12, offset as i32);
                    w.put_i32(mesh_base + 32, k as i32);
                }
            }
        }

        let length = w.len() as i32;
        w.put_i32(76, length);
        w.bytes
    }
}

// ---------------------------------------------------------------------------
// Vertex file
// ---------------------------------------------------------------------------

/// `.vvd` writer. Vertex `i` gets texcoord `(x, y)` of its own position.
#[derive(Debug, Clone)]
pub struct VvdBuilder {
    pub signature: u32,
    pub version: i32,
    pub checksum: i32,
    pub positions: Vec<[f32; 3]>,
    /// Declared LOD-0 count; defaults to `positions.len()`.
    pub lod0_count: Option<i32>,
    /// `(lod, source vertex, count)`
    pub fixups: Vec<(i32, i32, i32)>,
    /// Cut the finished file to this many bytes.
    pub truncate_to: Option<usize>,
}

impl Default for VvdBuilder {
    fn default() -> Self {
        Self {
            signature: VVD_SIGNATURE,
            version: 4,
            checksum: CHECKSUM,
            positions: Vec::new(),
            lod0_count: None,
            fixups: Vec::new(),
            truncate_to: None,
        }
    }
}

impl VvdBuilder {
    pub fn with_positions(positions: Vec<[f32; 3]>) -> Self {
        Self {
            positions,
            ..Default::default()
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut w = ByteWriter::default();
        w.reserve(64);
        w.put_u32(0, self.signature);
        w.put_i32(4, self.version);
        w.put_i32(8, self.checksum);
        w.put_i32(12, 1);
        w.put_i32(
            16,
            self.lod0_count.unwrap_or(self.positions.len() as i32),
        );

        let fixups = w.reserve(self.fixups.len() * 12);
        w.put_i32(48, self.fixups.len() as i32);
        w.put_i32(52, if self.fixups.is_empty() { 0 } else { fixups as i32 });
        for (i, &(lod, source, count)) in self.fixups.iter().enumerate() {
            let base = fixups + i * 12;
            w.put_i32(base, lod);
            w.put_i32(base + 4, source);
            w.put_i32(base + 8, count);
        }

        let data = w.reserve(self.positions.len() * 48);
        w.put_i32(56, data as i32);
        for (i, &position) in self.positions.iter().enumerate() {
            let base = data + i * 48;
            w.put_f32(base, 1.0);
            w.put_u8(base + 15, 1);
            w.put_vec3(base + 16, position);
            w.put_vec3(base + 28, [0.0, 0.0, 1.0]);
            w.put_f32(base + 40, position[0]);
            w.put_f32(base + 44, position[1]);
        }
        let tangents = w.len() as i32;
        w.put_i32(60, tangents);

        let mut bytes = w.bytes;
        if let Some(len) = self.truncate_to {
            bytes.truncate(len);
        }
        bytes
    }
}

// ---------------------------------------------------------------------------
// Topology file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FixtureStrip {
    /// Element offset into the group's index table.
    pub index_offset: usize,
    pub index_count: usize,
    pub tristrip: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FixtureStripGroup {
    /// `origMeshVertID` of each group vertex.
    pub vertices: Vec<u16>,
    pub indices: Vec<u16>,
    pub strips: Vec<FixtureStrip>,
}

impl FixtureStripGroup {
    /// Group vertex `i` maps to mesh vertex `i`.
    fn identity(vertex_count: usize) -> Vec<u16> {
        (0..vertex_count as u16).collect()
    }

    pub fn list(vertex_count: usize, indices: Vec<u16>) -> Self {
        let strips = vec![FixtureStrip {
            index_offset: 0,
            index_count: indices.len(),
            tristrip: false,
        }];
        Self {
            vertices: Self::identity(vertex_count),
            indices,
            strips,
        }
    }

    pub fn strip(vertex_count: usize, indices: Vec<u16>) -> Self {
        let strips = vec![FixtureStrip {
            index_offset: 0,
            index_count: indices.len(),
            tristrip: true,
        }];
        Self {
            vertices: Self::identity(vertex_count),
            indices,
            strips,
        }
    }
}

/// Strip groups of one topology mesh.
pub type FixtureMesh = Vec<FixtureStripGroup>;

/// `.vtx` writer. Every model gets a single LOD.
#[derive(Debug, Clone)]
pub struct VtxBuilder {
    pub version: i32,
    pub checksum: i32,
    /// Selects the record layout; 49 and above adds topology fields.
    pub mdl_version: i32,
    /// body part → model → mesh
    pub body_parts: Vec<Vec<Vec<FixtureMesh>>>,
    pub body_part_count: Option<i32>,
}

impl Default for VtxBuilder {
    fn default() -> Self {
        Self {
            version: 7,
            checksum: CHECKSUM,
            mdl_version: 48,
            body_parts: Vec::new(),
            body_part_count: None,
        }
    }
}

impl VtxBuilder {
    pub fn single_group(group: FixtureStripGroup) -> Self {
        Self {
            body_parts: vec![vec![vec![vec![group]]]],
            ..Default::default()
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let extra = if self.mdl_version >= 49 { 8 } else { 0 };
        let group_size = 25 + extra;
        let strip_size = 27 + extra;

        let mut w = ByteWriter::default();
        w.reserve(36);
        w.put_i32(0, self.version);
        w.put_i32(4, 24);
        w.put_u16(8, 53);
        w.put_u16(10, 9);
        w.put_i32(12, 3);
        w.put_i32(16, self.checksum);
        w.put_i32(20, 1);
        w.put_i32(
            28,
            self.body_part_count
                .unwrap_or(self.body_parts.len() as i32),
        );

        let parts = w.reserve(self.body_parts.len() * 8);
        w.put_i32(32, parts as i32);
        for (i, models) in self.body_parts.iter().enumerate() {
            let part_base = parts + i * 8;
            let model_table = w.reserve(models.len() * 8);
            w.put_i32(part_base, models.len() as i32);
            w.put_i32(part_base + 4, ByteWriter::rel(part_base, model_table));

            for (j, meshes) in models.iter().enumerate() {
                let model_base = model_table + j * 8;
                let lod = w.reserve(12);
                w.put_i32(model_base, 1);
                w.put_i32(model_base + 4, ByteWriter::rel(model_base, lod));

                let mesh_table = w.reserve(meshes.len() * 9);
                w.put_i32(lod, meshes.len() as i32);
                w.put_i32(lod + 4, ByteWriter::rel(lod, mesh_table));
                w.put_f32(lod + 8, 0.0);

                for (k, groups) in meshes.iter().enumerate() {
                    let mesh_base = mesh_table + k * 9;
                    let group_table = w.reserve(groups.len() * group_size);
                    w.put_i32(mesh_base, groups.len() as i32);
                    w.put_i32(mesh_base + 4, ByteWriter::rel(mesh_base, group_table));

                    for (g, group) in groups.iter().enumerate() {
                        let group_base = group_table + g * group_size;
                        Self::write_group(&mut w, group_base, group, strip_size);
                    }
                }
            }
        }
        w.bytes
    }

    fn write_group(w: &mut ByteWriter, base: usize, group: &FixtureStripGroup, strip_size: usize) {
        let vertices = w.reserve(group.vertices.len() * 9);
        for (i, &orig) in group.vertices.iter().enumerate() {
            let at = vertices + i * 9;
            w.put_u8(at + 3, 1);
            w.put_u16(at + 4, orig);
        }

        let indices = w.reserve(group.indices.len() * 2);
        for (i, &index) in group.indices.iter().enumerate() {
            w.put_u16(indices + i * 2, index);
        }

        let strips = w.reserve(group.strips.len() * strip_size);
        for (i, strip) in group.strips.iter().enumerate() {
            let at = strips + i * strip_size;
            w.put_i32(at, strip.index_count as i32);
            w.put_i32(at + 4, strip.index_offset as i32);
            w.put_i32(at + 8, group.vertices.len() as i32);
            w.put_i32(at + 12, 0);
            w.put_i16(at + 16, 1);
            w.put_u8(at + 18, if strip.tristrip { 0x02 } else { 0x01 });
        }

        w.put_i32(base, group.vertices.len() as i32);
        w.put_i32(base + 4, ByteWriter::rel(base, vertices));
        w.put_i32(base + 8, group.indices.len() as i32);
        w.put_i32(base + 12, ByteWriter::rel(base, indices));
        w.put_i32(base + 16, group.strips.len() as i32);
        w.put_i32(base + 20, ByteWriter::rel(base, strips));
    }
}

// ---------------------------------------------------------------------------
// Whole assets
// ---------------------------------------------------------------------------

/// Unit square in the XY plane, vertices counter-clockwise from the origin.
pub fn quad_positions() -> Vec<[f32; 3]> {
    vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
    ]
}

/// A complete, valid quad: two list triangles over four vertices.
pub fn quad_files() -> (MdlBuilder, VvdBuilder, VtxBuilder) {
    (
        MdlBuilder::single_mesh(4),
        VvdBuilder::with_positions(quad_positions()),
        VtxBuilder::single_group(FixtureStripGroup::list(4, vec![0, 1, 2, 0, 2, 3])),
    )
}

/// Bundle built files into an in-memory source. `None` leaves a file out.
pub fn source(
    mdl: Option<Vec<u8>>,
    vvd: Option<Vec<u8>>,
    vtx: Option<Vec<u8>>,
) -> MemoryAssetSource {
    let mut source = MemoryAssetSource::new("fixture");
    for (file, data) in [
        (AssetFile::Model, mdl),
        (AssetFile::Vertices, vvd),
        (AssetFile::Topology, vtx),
    ] {
        if let Some(data) = data {
            source.insert(file, data);
        }
    }
    source
}

pub fn quad_source() -> MemoryAssetSource {
    let (mdl, vvd, vtx) = quad_files();
    source(Some(mdl.build()), Some(vvd.build()), Some(vtx.build()))
}
