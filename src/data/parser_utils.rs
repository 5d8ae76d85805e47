//! Shared winnow-based parsing utilities used by the header, vertex and topology parsers.
//!
//! Studio files address their tables with offsets relative to the record that
//! declares them. Nothing here keeps an implicit file position: record parsers
//! take `(file_data, base)` and hand back the next base, and table lookups
//! resolve `(anchor, relative offset)` against the file length before any
//! element is touched.

use glam::{Quat, Vec2, Vec3};
use rootcause::Report;
use thiserror::Error;
use tracing::warn;
use winnow::Parser;
use winnow::binary::le_f32;
use winnow::error::{ContextError, ErrMode};

use crate::error::{AssetError, Warning};

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, ErrMode<ContextError>>;

/// Why a `(offset, count)` pair could not be turned into a [`Table`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("count {declared} is outside 0..={ceiling}")]
    CountOutOfRange { declared: i64, ceiling: usize },
    #[error("table at 0x{offset:X} needs {need} bytes but the file has {have}")]
    OutOfBounds { offset: i64, need: usize, have: usize },
}

/// A bounds-checked run of fixed-size records inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub start: usize,
    pub count: usize,
    pub stride: usize,
}

impl Table {
    pub const EMPTY: Table = Table {
        start: 0,
        count: 0,
        stride: 0,
    };

    /// Absolute offset of record `index`.
    pub fn offset(&self, index: usize) -> usize {
        self.start + index * self.stride
    }

    /// Absolute offsets of every record, in order.
    pub fn offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.count).map(|i| self.offset(i))
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Resolve a relative pointer: anchor + rel = absolute file offset.
///
/// Returns `None` when the result would be negative.
pub fn resolve_offset(anchor: usize, rel: i32) -> Option<usize> {
    let abs = anchor as i64 + rel as i64;
    usize::try_from(abs).ok()
}

/// Resolve and bounds-check a table of `count` records of `stride` bytes that
/// starts `rel` bytes after `anchor`.
///
/// Counts above `ceiling` are rejected outright so that a corrupt count never
/// drives a loop.
pub fn locate_table(
    file_len: usize,
    anchor: usize,
    rel: i32,
    count: i32,
    stride: usize,
    ceiling: usize,
) -> Result<Table, TableError> {
    if count < 0 || count as usize > ceiling {
        return Err(TableError::CountOutOfRange {
            declared: count as i64,
            ceiling,
        });
    }
    let count = count as usize;
    if count == 0 {
        return Ok(Table::EMPTY);
    }

    let offset = anchor as i64 + rel as i64;
    let need = count * stride;
    let start = match usize::try_from(offset) {
        Ok(start) if start.checked_add(need).is_some_and(|end| end <= file_len) => start,
        _ => {
            return Err(TableError::OutOfBounds {
                offset,
                need,
                have: file_len,
            });
        }
    };

    Ok(Table {
        start,
        count,
        stride,
    })
}

/// Clamp a declared header count into `0..=ceiling`, recording a warning when
/// the declared value had to change.
pub fn clamp_count(
    declared: i32,
    ceiling: usize,
    table: &'static str,
    warnings: &mut Vec<Warning>,
) -> usize {
    let clamped = (declared.max(0) as usize).min(ceiling);
    if clamped as i64 != declared as i64 {
        warn!(table, declared, clamped, "count clamped");
        warnings.push(Warning::CountClamped {
            table,
            declared: declared as i64,
            clamped,
        });
    }
    clamped
}

/// Parse one fixed-size record at `base`, returning it with the offset of the
/// record that follows.
pub fn parse_record<T>(
    file_data: &[u8],
    base: usize,
    size: usize,
    parser: impl FnOnce(&mut &[u8]) -> WResult<T>,
) -> Result<(T, usize), Report<AssetError>> {
    let end = base.checked_add(size).filter(|&end| end <= file_data.len());
    let Some(end) = end else {
        return Err(Report::new(AssetError::DataTooShort {
            offset: base,
            need: size,
            have: file_data.len(),
        }));
    };

    let input = &mut &file_data[base..end];
    let record = parser(input).map_err(|e: ErrMode<ContextError>| {
        Report::new(AssetError::ParseError(format!("record at 0x{base:X}: {e}")))
    })?;
    Ok((record, end))
}

/// Decode a NUL-padded fixed-width string field.
pub fn fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Read a null-terminated string from `file_data` starting at `offset`.
///
/// Returns `None` when `offset` lies outside the file. A string that runs to
/// the end of the file without a terminator is returned as-is.
pub fn read_null_terminated_string(file_data: &[u8], offset: usize) -> Option<String> {
    let remaining = file_data.get(offset..)?;
    let end = remaining
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(remaining.len());
    Some(String::from_utf8_lossy(&remaining[..end]).into_owned())
}

/// Resolve a record-relative name offset. A zero offset means "no name".
pub fn read_relative_name(file_data: &[u8], record_base: usize, rel: i32) -> String {
    if rel == 0 {
        return String::new();
    }
    resolve_offset(record_base, rel)
        .and_then(|abs| read_null_terminated_string(file_data, abs))
        .unwrap_or_default()
}

pub fn parse_vec2(input: &mut &[u8]) -> WResult<Vec2> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    Ok(Vec2::new(x, y))
}

pub fn parse_vec3(input: &mut &[u8]) -> WResult<Vec3> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    Ok(Vec3::new(x, y, z))
}

pub fn parse_quat(input: &mut &[u8]) -> WResult<Quat> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    let w = le_f32.parse_next(input)?;
    Ok(Quat::from_xyzw(x, y, z, w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_within_file() {
        let table = locate_table(100, 10, 6, 4, 8, 32).unwrap();
        assert_eq!(table.start, 16);
        assert_eq!(table.offsets().collect::<Vec<_>>(), vec![16, 24, 32, 40]);
    }

    #[test]
    fn table_past_end_is_rejected() {
        let err = locate_table(40, 0, 16, 4, 8, 32).unwrap_err();
        assert_eq!(
            err,
            TableError::OutOfBounds {
                offset: 16,
                need: 32,
                have: 40
            }
        );
    }

    #[test]
    fn table_before_start_is_rejected() {
        let err = locate_table(40, 4, -8, 1, 8, 32).unwrap_err();
        assert!(matches!(err, TableError::OutOfBounds { offset: -4, .. }));
    }

    #[test]
    fn table_count_over_ceiling_is_rejected() {
        let err = locate_table(1 << 20, 0, 0, 33, 8, 32).unwrap_err();
        assert_eq!(
            err,
            TableError::CountOutOfRange {
                declared: 33,
                ceiling: 32
            }
        );
        assert!(locate_table(1 << 20, 0, 0, -1, 8, 32).is_err());
    }

    #[test]
    fn empty_table_ignores_offset() {
        assert_eq!(locate_table(0, 0, 9999, 0, 8, 32), Ok(Table::EMPTY));
    }

    #[test]
    fn clamp_records_warning() {
        let mut warnings = Vec::new();
        assert_eq!(clamp_count(5, 10, "bones", &mut warnings), 5);
        assert!(warnings.is_empty());
        assert_eq!(clamp_count(50, 10, "bones", &mut warnings), 10);
        assert_eq!(clamp_count(-3, 10, "bones", &mut warnings), 0);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn strings() {
        assert_eq!(fixed_string(b"body\0\0junk"), "body");
        let data = b"xxname\0tail";
        assert_eq!(read_null_terminated_string(data, 2).as_deref(), Some("name"));
        assert_eq!(read_null_terminated_string(data, 7).as_deref(), Some("tail"));
        assert_eq!(read_null_terminated_string(data, 64), None);
        assert_eq!(read_relative_name(data, 4, -2), "name");
        assert_eq!(read_relative_name(data, 4, 0), "");
    }

    #[test]
    fn record_cursor_advances() {
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let (value, next) =
            parse_record(&data, 0, 4, |input| winnow::binary::le_u32.parse_next(input)).unwrap();
        assert_eq!((value, next), (1, 4));
        let (value, next) =
            parse_record(&data, next, 4, |input| winnow::binary::le_u32.parse_next(input))
                .unwrap();
        assert_eq!((value, next), (2, 8));
        assert!(parse_record(&data, next, 4, |input| winnow::binary::le_u32.parse_next(input)).is_err());
    }
}
