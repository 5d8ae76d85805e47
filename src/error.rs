use std::fmt;

use thiserror::Error;

use crate::models::StripGroupPath;

/// One of the three files that make up a compiled model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum AssetFile {
    /// The primary `.mdl` header file.
    Model,
    /// The `.vvd` vertex companion.
    Vertices,
    /// The `.vtx` strip/topology companion.
    Topology,
}

impl AssetFile {
    pub fn extension(&self) -> &'static str {
        match self {
            AssetFile::Model => "mdl",
            AssetFile::Vertices => "vvd",
            AssetFile::Topology => "vtx",
        }
    }
}

impl fmt::Display for AssetFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// How strip indices that land outside the vertex array are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum IndexPolicy {
    /// Wrap the index into range with a modulo, keeping the triangle.
    #[default]
    Wrap,
    /// Discard every triangle that touches the index.
    Drop,
}

impl fmt::Display for IndexPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexPolicy::Wrap => f.write_str("wrapped"),
            IndexPolicy::Drop => f.write_str("dropped"),
        }
    }
}

/// Fatal decode errors. Carried inside a [`rootcause::Report`].
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{file} has invalid signature: expected 0x{expected:08X}, got 0x{found:08X}")]
    InvalidSignature {
        file: AssetFile,
        expected: u32,
        found: u32,
    },
    #[error("{file} version {found} is not supported (supported: {supported})")]
    UnsupportedVersion {
        file: AssetFile,
        found: i32,
        supported: &'static str,
    },
    #[error("malformed topology: {what} {detail}")]
    MalformedTopology { what: &'static str, detail: String },
    #[error("data too short: need {need} bytes at offset 0x{offset:X}, have {have}")]
    DataTooShort {
        offset: usize,
        need: usize,
        have: usize,
    },
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("could not read {file}: {source}")]
    Io {
        file: AssetFile,
        #[source]
        source: std::io::Error,
    },
    #[error("{file} does not exist")]
    Missing { file: AssetFile },
    #[error("invalid scale factor {0}: must be finite and non-zero")]
    InvalidScale(f32),
}

impl AssetError {
    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        AssetError::MalformedTopology {
            what,
            detail: detail.into(),
        }
    }
}

/// Non-fatal conditions recorded while a model loads.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Warning {
    #[error("{file} checksum 0x{found:08X} does not match model checksum 0x{expected:08X}")]
    ChecksumMismatch {
        file: AssetFile,
        expected: i32,
        found: i32,
    },
    #[error("{file} ended early: decoded {decoded} of {declared} records")]
    UnexpectedEof {
        file: AssetFile,
        decoded: usize,
        declared: usize,
    },
    #[error("{count} out-of-range vertex indices in strip group {group} were {policy}")]
    IndexOutOfRange {
        group: StripGroupPath,
        count: usize,
        policy: IndexPolicy,
    },
    #[error("{table} count {declared} clamped to {clamped}")]
    CountClamped {
        table: &'static str,
        declared: i64,
        clamped: usize,
    },
    #[error("{table} table at 0x{offset:X} lies outside the {file_len}-byte file")]
    TableOutOfBounds {
        table: &'static str,
        offset: i64,
        file_len: usize,
    },
    #[error("{table} table could not be read: {reason}")]
    TableUnreadable { table: &'static str, reason: String },
    #[error("{file} version {found} differs from the expected {expected}")]
    UnexpectedVersion {
        file: AssetFile,
        found: i32,
        expected: i32,
    },
    #[error("{file} companion file not found")]
    CompanionMissing { file: AssetFile },
    #[error("{file} companion file rejected: {reason}")]
    CompanionRejected { file: AssetFile, reason: String },
    #[error("{dropped} zero-area triangles dropped")]
    DegenerateTriangles { dropped: usize },
    #[error("topology unavailable; triangles were guessed from consecutive vertices")]
    NaiveTopology,
    #[error("hull extents are empty; bounding box built from the view volume")]
    HullSubstituted,
}
