//! Field marker registry: the closed set of single-byte markers that tag
//! every field and container in the wire format, plus the table-driven
//! dispatch (`marker_info`) that replaces the many `switch(marker)` sites
//! of a naive implementation with one lookup (Design Note "Marker
//! dispatch").
//!
//! Marker numeric assignments are fixed here and must never change once a
//! record written with them exists — see `DESIGN.md` for the chosen table.

use crate::error::CarbonError;

/// Presence/scalar/container/sentinel marker byte values.
///
/// Any stable assignment works; this is the one `carbon` commits to:
pub mod marker {
    pub const NULL: u8 = 0x01;
    pub const TRUE: u8 = 0x02;
    pub const FALSE: u8 = 0x03;

    pub const U8: u8 = 0x10;
    pub const U16: u8 = 0x11;
    pub const U32: u8 = 0x12;
    pub const U64: u8 = 0x13;
    pub const I8: u8 = 0x14;
    pub const I16: u8 = 0x15;
    pub const I32: u8 = 0x16;
    pub const I64: u8 = 0x17;
    pub const FLOAT: u8 = 0x18;

    pub const STRING: u8 = 0x20;
    pub const BINARY: u8 = 0x21;
    pub const BINARY_CUSTOM: u8 = 0x22;

    /// Base marker for array-begin; low 2 bits hold the derivation.
    pub const ARRAY_BEGIN: u8 = 0x30;
    pub const ARRAY_END: u8 = 0x3F;

    /// Base marker for object-begin; low 2 bits hold the derivation.
    pub const OBJECT_BEGIN: u8 = 0x40;
    pub const OBJECT_END: u8 = 0x4F;

    /// Base marker for each column scalar type; low 2 bits hold the
    /// derivation. Columns are laid out contiguously by scalar type, 4
    /// markers (one per derivation) apart.
    pub const COLUMN_U8: u8 = 0x50;
    pub const COLUMN_U16: u8 = 0x54;
    pub const COLUMN_U32: u8 = 0x58;
    pub const COLUMN_U64: u8 = 0x5C;
    pub const COLUMN_I8: u8 = 0x60;
    pub const COLUMN_I16: u8 = 0x64;
    pub const COLUMN_I32: u8 = 0x68;
    pub const COLUMN_I64: u8 = 0x6C;
    pub const COLUMN_FLOAT: u8 = 0x70;
    pub const COLUMN_BOOL: u8 = 0x74;

    /// Per-cell marker bytes inside a boolean column's payload. A single
    /// bit cannot represent null, so booleans spend a whole byte per cell
    /// using one of these three values (Design Note "Column element
    /// sentinels").
    pub const CELL_BOOL_TRUE: u8 = 0xF1;
    pub const CELL_BOOL_FALSE: u8 = 0xF2;
    pub const CELL_BOOL_NULL: u8 = 0xF3;
}

/// Derivation bits carried by every container begin-marker (the low 2 bits)
/// distinguishing multiset/set and sorted/unsorted semantics. The same
/// four-way scheme is reused for arrays, objects and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Derivation {
    /// Unsorted, duplicates allowed (the common case).
    UnsortedMulti = 0,
    /// Sorted, duplicates allowed.
    SortedMulti = 1,
    /// Unsorted, duplicates rejected.
    UnsortedUnique = 2,
    /// Sorted, duplicates rejected.
    SortedUnique = 3,
}

impl Derivation {
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Derivation::UnsortedMulti,
            1 => Derivation::SortedMulti,
            2 => Derivation::UnsortedUnique,
            _ => Derivation::SortedUnique,
        }
    }

    #[must_use]
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// `true` for the two "unique" derivations (set / map).
    #[must_use]
    pub fn is_unique(self) -> bool {
        matches!(self, Derivation::UnsortedUnique | Derivation::SortedUnique)
    }

    /// `true` for the two "sorted" derivations.
    #[must_use]
    pub fn is_sorted(self) -> bool {
        matches!(self, Derivation::SortedMulti | Derivation::SortedUnique)
    }
}

/// Scalar element type carried by a column container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnScalar {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    Bool,
}

impl ColumnScalar {
    /// Size, in bytes, of one packed element of this scalar type.
    #[must_use]
    pub fn element_size(self) -> usize {
        match self {
            ColumnScalar::U8 | ColumnScalar::I8 | ColumnScalar::Bool => 1,
            ColumnScalar::U16 | ColumnScalar::I16 => 2,
            ColumnScalar::U32 | ColumnScalar::I32 | ColumnScalar::Float => 4,
            ColumnScalar::U64 | ColumnScalar::I64 => 8,
        }
    }

    /// The column-begin marker base byte (derivation bits still need to be
    /// OR'd in) for this scalar type.
    #[must_use]
    pub fn base_marker(self) -> u8 {
        match self {
            ColumnScalar::U8 => marker::COLUMN_U8,
            ColumnScalar::U16 => marker::COLUMN_U16,
            ColumnScalar::U32 => marker::COLUMN_U32,
            ColumnScalar::U64 => marker::COLUMN_U64,
            ColumnScalar::I8 => marker::COLUMN_I8,
            ColumnScalar::I16 => marker::COLUMN_I16,
            ColumnScalar::I32 => marker::COLUMN_I32,
            ColumnScalar::I64 => marker::COLUMN_I64,
            ColumnScalar::Float => marker::COLUMN_FLOAT,
            ColumnScalar::Bool => marker::COLUMN_BOOL,
        }
    }

    /// The marker this scalar type's value would carry if it appeared as a
    /// standalone scalar field rather than inside a column.
    #[must_use]
    pub fn standalone_marker(self) -> u8 {
        match self {
            ColumnScalar::U8 => marker::U8,
            ColumnScalar::U16 => marker::U16,
            ColumnScalar::U32 => marker::U32,
            ColumnScalar::U64 => marker::U64,
            ColumnScalar::I8 => marker::I8,
            ColumnScalar::I16 => marker::I16,
            ColumnScalar::I32 => marker::I32,
            ColumnScalar::I64 => marker::I64,
            ColumnScalar::Float => marker::FLOAT,
            ColumnScalar::Bool => marker::TRUE, // caller must special-case bool cells
        }
    }

    /// Human-readable label used in type-mismatch error messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ColumnScalar::U8 => "column<u8>",
            ColumnScalar::U16 => "column<u16>",
            ColumnScalar::U32 => "column<u32>",
            ColumnScalar::U64 => "column<u64>",
            ColumnScalar::I8 => "column<i8>",
            ColumnScalar::I16 => "column<i16>",
            ColumnScalar::I32 => "column<i32>",
            ColumnScalar::I64 => "column<i64>",
            ColumnScalar::Float => "column<float>",
            ColumnScalar::Bool => "column<bool>",
        }
    }

    fn from_base(base: u8) -> Option<Self> {
        match base {
            marker::COLUMN_U8 => Some(ColumnScalar::U8),
            marker::COLUMN_U16 => Some(ColumnScalar::U16),
            marker::COLUMN_U32 => Some(ColumnScalar::U32),
            marker::COLUMN_U64 => Some(ColumnScalar::U64),
            marker::COLUMN_I8 => Some(ColumnScalar::I8),
            marker::COLUMN_I16 => Some(ColumnScalar::I16),
            marker::COLUMN_I32 => Some(ColumnScalar::I32),
            marker::COLUMN_I64 => Some(ColumnScalar::I64),
            marker::COLUMN_FLOAT => Some(ColumnScalar::Float),
            marker::COLUMN_BOOL => Some(ColumnScalar::Bool),
            _ => None,
        }
    }
}

/// The coarse shape a marker byte decodes to, independent of derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Null,
    True,
    False,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    String,
    Binary,
    BinaryCustom,
    ArrayBegin,
    ArrayEnd,
    ObjectBegin,
    ObjectEnd,
    Column(ColumnScalar),
}

impl FieldKind {
    #[must_use]
    pub fn is_array_or_subtype(self) -> bool {
        matches!(self, FieldKind::ArrayBegin)
    }

    #[must_use]
    pub fn is_object_or_subtype(self) -> bool {
        matches!(self, FieldKind::ObjectBegin)
    }

    #[must_use]
    pub fn is_column_or_subtype(self) -> bool {
        matches!(self, FieldKind::Column(_))
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        matches!(self, FieldKind::Null)
    }

    #[must_use]
    pub fn is_true(self) -> bool {
        matches!(self, FieldKind::True)
    }

    #[must_use]
    pub fn is_false(self) -> bool {
        matches!(self, FieldKind::False)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Null => "null",
            FieldKind::True => "true",
            FieldKind::False => "false",
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::U64 => "u64",
            FieldKind::I8 => "i8",
            FieldKind::I16 => "i16",
            FieldKind::I32 => "i32",
            FieldKind::I64 => "i64",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Binary => "binary",
            FieldKind::BinaryCustom => "binary_custom",
            FieldKind::ArrayBegin => "array",
            FieldKind::ArrayEnd => "array_end",
            FieldKind::ObjectBegin => "object",
            FieldKind::ObjectEnd => "object_end",
            FieldKind::Column(_) => "column",
        }
    }
}

/// Everything `marker_info` can tell a caller about a marker byte without
/// reading any payload.
#[derive(Debug, Clone, Copy)]
pub struct MarkerInfo {
    pub kind: FieldKind,
    /// `Some(n)` for fields with a fixed-width payload of `n` bytes
    /// (including 0 for null/true/false); `None` for variable-length
    /// fields (string/binary) and containers, whose size can only be
    /// determined by walking their contents.
    pub value_size: Option<usize>,
    /// `Some(d)` for container begin-markers and column markers, which
    /// encode a derivation in their low 2 bits; `None` otherwise.
    pub derivation: Option<Derivation>,
}

/// Table-driven dispatch: decode a marker byte into its `FieldKind`,
/// `value_size` and `Derivation` in one call.
///
/// # Errors
/// [`CarbonError::BadType`] if `marker` is not part of the closed marker set.
pub fn marker_info(marker: u8) -> Result<MarkerInfo, CarbonError> {
    use self::marker as m;

    Ok(match marker {
        m::NULL => MarkerInfo { kind: FieldKind::Null, value_size: Some(0), derivation: None },
        m::TRUE => MarkerInfo { kind: FieldKind::True, value_size: Some(0), derivation: None },
        m::FALSE => MarkerInfo { kind: FieldKind::False, value_size: Some(0), derivation: None },
        m::U8 => MarkerInfo { kind: FieldKind::U8, value_size: Some(1), derivation: None },
        m::U16 => MarkerInfo { kind: FieldKind::U16, value_size: Some(2), derivation: None },
        m::U32 => MarkerInfo { kind: FieldKind::U32, value_size: Some(4), derivation: None },
        m::U64 => MarkerInfo { kind: FieldKind::U64, value_size: Some(8), derivation: None },
        m::I8 => MarkerInfo { kind: FieldKind::I8, value_size: Some(1), derivation: None },
        m::I16 => MarkerInfo { kind: FieldKind::I16, value_size: Some(2), derivation: None },
        m::I32 => MarkerInfo { kind: FieldKind::I32, value_size: Some(4), derivation: None },
        m::I64 => MarkerInfo { kind: FieldKind::I64, value_size: Some(8), derivation: None },
        m::FLOAT => MarkerInfo { kind: FieldKind::Float, value_size: Some(4), derivation: None },
        m::STRING => MarkerInfo { kind: FieldKind::String, value_size: None, derivation: None },
        m::BINARY => MarkerInfo { kind: FieldKind::Binary, value_size: None, derivation: None },
        m::BINARY_CUSTOM => {
            MarkerInfo { kind: FieldKind::BinaryCustom, value_size: None, derivation: None }
        }
        m::ARRAY_END => MarkerInfo { kind: FieldKind::ArrayEnd, value_size: Some(0), derivation: None },
        m::OBJECT_END => MarkerInfo { kind: FieldKind::ObjectEnd, value_size: Some(0), derivation: None },
        _ if in_base_range(marker, m::ARRAY_BEGIN) => MarkerInfo {
            kind: FieldKind::ArrayBegin,
            value_size: None,
            derivation: Some(Derivation::from_bits(marker)),
        },
        _ if in_base_range(marker, m::OBJECT_BEGIN) => MarkerInfo {
            kind: FieldKind::ObjectBegin,
            value_size: None,
            derivation: Some(Derivation::from_bits(marker)),
        },
        _ => {
            let base = marker & !0x03;
            if let Some(scalar) = ColumnScalar::from_base(base) {
                MarkerInfo {
                    kind: FieldKind::Column(scalar),
                    value_size: None,
                    derivation: Some(Derivation::from_bits(marker)),
                }
            } else {
                return Err(CarbonError::BadType { marker });
            }
        }
    })
}

fn in_base_range(marker: u8, base: u8) -> bool {
    marker & !0x03 == base
}

/// Build an array/object/column begin-marker from a base and a derivation.
#[must_use]
pub fn with_derivation(base: u8, derivation: Derivation) -> u8 {
    base | derivation.bits()
}

/// `value_size(marker)`: number of fixed payload bytes following the
/// marker, or `None` if the field's payload is variable-length or the
/// marker itself denotes a container.
pub fn value_size(marker: u8) -> Result<Option<usize>, CarbonError> {
    Ok(marker_info(marker)?.value_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_markers_roundtrip_value_size() {
        assert_eq!(value_size(marker::NULL).unwrap(), Some(0));
        assert_eq!(value_size(marker::U64).unwrap(), Some(8));
        assert_eq!(value_size(marker::FLOAT).unwrap(), Some(4));
        assert_eq!(value_size(marker::STRING).unwrap(), None);
    }

    #[test]
    fn container_markers_carry_derivation() {
        let m = with_derivation(marker::ARRAY_BEGIN, Derivation::SortedUnique);
        let info = marker_info(m).unwrap();
        assert_eq!(info.kind, FieldKind::ArrayBegin);
        assert_eq!(info.derivation, Some(Derivation::SortedUnique));
    }

    #[test]
    fn column_markers_decode_scalar_and_derivation() {
        let m = with_derivation(ColumnScalar::I32.base_marker(), Derivation::SortedMulti);
        let info = marker_info(m).unwrap();
        assert_eq!(info.kind, FieldKind::Column(ColumnScalar::I32));
        assert_eq!(info.derivation, Some(Derivation::SortedMulti));
    }

    #[test]
    fn unknown_marker_is_bad_type() {
        assert!(marker_info(0x00).is_err());
        assert!(marker_info(0xAA).is_err());
    }
}
