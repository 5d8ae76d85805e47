use std::io::{self, Write};

use crate::models::mesh::ReconstructedMesh;

/// Write the mesh as a Wavefront OBJ object named `name`.
pub fn write_obj<W: Write>(mesh: &ReconstructedMesh, name: &str, mut out: W) -> io::Result<()> {
    writeln!(out, "o {name}")?;
    for v in mesh.vertices() {
        writeln!(out, "v {} {} {}", v.x, v.y, v.z)?;
    }
    // OBJ indices are 1-based.
    for [a, b, c] in mesh.triangles() {
        writeln!(out, "f {} {} {}", a + 1, b + 1, c + 1)?;
    }
    out.flush()
}
