//! Expansion of strip-group index runs into triangles.
//!
//! Indices are first remapped from group-local space into the global LOD-0
//! vertex array, then expanded as either a triangle strip (sliding window,
//! alternating winding) or a triangle list (independent triples).

use itertools::Itertools;

use crate::error::IndexPolicy;
use crate::models::limits::STRIP_RESTART;

/// A strip entry after remapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripIndex {
    Vertex(u32),
    /// Ends the current strip segment.
    Restart,
    /// Could not be resolved to a vertex; any window touching it is dropped.
    Invalid,
}

/// How a strip's index run encodes triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    List,
    Strip,
}

impl Primitive {
    pub const STRIP_FLAG: u8 = 0x02;

    pub fn from_flags(flags: u8) -> Self {
        if flags & Self::STRIP_FLAG != 0 {
            Primitive::Strip
        } else {
            Primitive::List
        }
    }
}

/// Maps group-local indices to global vertex indices for one strip group.
///
/// Group vertex `i` refers to mesh vertex `vertex_ids[i]`, and the mesh's
/// vertices start at `base` in the global array.
#[derive(Debug)]
pub struct Remapper<'a> {
    vertex_ids: &'a [u16],
    base: usize,
    vertex_count: usize,
    policy: IndexPolicy,
    out_of_range: usize,
}

impl<'a> Remapper<'a> {
    pub fn new(vertex_ids: &'a [u16], base: usize, vertex_count: usize, policy: IndexPolicy) -> Self {
        Self {
            vertex_ids,
            base,
            vertex_count,
            policy,
            out_of_range: 0,
        }
    }

    pub fn map(&mut self, local: u16) -> StripIndex {
        if local == STRIP_RESTART {
            return StripIndex::Restart;
        }

        let id = match self.vertex_ids.get(local as usize) {
            Some(&id) => id,
            None => {
                self.out_of_range += 1;
                match self.policy {
                    IndexPolicy::Wrap if !self.vertex_ids.is_empty() => {
                        self.vertex_ids[local as usize % self.vertex_ids.len()]
                    }
                    _ => return StripIndex::Invalid,
                }
            }
        };

        let global = self.base + id as usize;
        if global < self.vertex_count {
            return StripIndex::Vertex(global as u32);
        }

        // Counted once per entry even when both lookups miss.
        if (local as usize) < self.vertex_ids.len() {
            self.out_of_range += 1;
        }
        match self.policy {
            IndexPolicy::Wrap if self.vertex_count > 0 => {
                StripIndex::Vertex((global % self.vertex_count) as u32)
            }
            _ => StripIndex::Invalid,
        }
    }

    pub fn map_all(&mut self, locals: &[u16]) -> Vec<StripIndex> {
        locals.iter().map(|&local| self.map(local)).collect()
    }

    /// Indices that did not land in range, whatever the policy made of them.
    pub fn out_of_range(&self) -> usize {
        self.out_of_range
    }
}

fn triangle(a: StripIndex, b: StripIndex, c: StripIndex) -> Option<[u32; 3]> {
    let (StripIndex::Vertex(a), StripIndex::Vertex(b), StripIndex::Vertex(c)) = (a, b, c) else {
        return None;
    };
    (a != b && b != c && a != c).then_some([a, b, c])
}

/// Expand a triangle strip, appending to `out`.
///
/// Restart entries split the strip into segments that are decoded
/// independently. Within a segment every accepted triangle at an odd position
/// has its last two indices swapped to keep a consistent winding.
pub fn expand_strip(indices: &[StripIndex], out: &mut Vec<[u32; 3]>) {
    for segment in indices.split(|index| *index == StripIndex::Restart) {
        let mut accepted = 0usize;
        for (&a, &b, &c) in segment.iter().tuple_windows() {
            let Some([a, b, c]) = triangle(a, b, c) else {
                continue;
            };
            out.push(if accepted % 2 == 1 { [a, c, b] } else { [a, b, c] });
            accepted += 1;
        }
    }
}

/// Expand a triangle list, appending to `out`. A trailing partial triple is ignored.
pub fn expand_list(indices: &[StripIndex], out: &mut Vec<[u32; 3]>) {
    out.extend(
        indices
            .iter()
            .tuples()
            .filter_map(|(&a, &b, &c)| triangle(a, b, c)),
    );
}

pub fn expand(primitive: Primitive, indices: &[StripIndex], out: &mut Vec<[u32; 3]>) {
    match primitive {
        Primitive::Strip => expand_strip(indices, out),
        Primitive::List => expand_list(indices, out),
    }
}
