//! Random-access and sequential reading over a column container: a packed,
//! homogeneously-typed run of scalars with no per-element marker byte, laid
//! out as `[marker][uintvar num_elems][uintvar capacity][packed values]`
//! and, unlike array/object, no end marker — its span is computed from
//! `capacity * element_size`.

use crate::error::CarbonError;
use crate::memory::MemFile;
use crate::types::{marker, marker_info, ColumnScalar, Derivation, FieldKind};

/// One decoded column cell. Null is represented by a type-specific sentinel
/// rather than a presence bit (Design Note "Column element sentinels"):
/// unsigned types use their max value, signed types their min value, floats
/// use a NaN bit pattern, and booleans spend a whole byte on one of three
/// marker values since a single bit can't carry null.
#[derive(Debug, Clone, Copy)]
pub struct ColumnValue<'m> {
    scalar: ColumnScalar,
    raw: &'m [u8],
}

impl<'m> ColumnValue<'m> {
    #[must_use]
    pub fn scalar(&self) -> ColumnScalar {
        self.scalar
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        match self.scalar {
            ColumnScalar::U8 => self.raw[0] == u8::MAX,
            ColumnScalar::U16 => u16::from_le_bytes(self.raw.try_into().unwrap()) == u16::MAX,
            ColumnScalar::U32 => u32::from_le_bytes(self.raw.try_into().unwrap()) == u32::MAX,
            ColumnScalar::U64 => u64::from_le_bytes(self.raw.try_into().unwrap()) == u64::MAX,
            ColumnScalar::I8 => self.raw[0] as i8 == i8::MIN,
            ColumnScalar::I16 => i16::from_le_bytes(self.raw.try_into().unwrap()) == i16::MIN,
            ColumnScalar::I32 => i32::from_le_bytes(self.raw.try_into().unwrap()) == i32::MIN,
            ColumnScalar::I64 => i64::from_le_bytes(self.raw.try_into().unwrap()) == i64::MIN,
            ColumnScalar::Float => f32::from_le_bytes(self.raw.try_into().unwrap()).is_nan(),
            ColumnScalar::Bool => self.raw[0] == marker::CELL_BOOL_NULL,
        }
    }

    #[must_use]
    pub fn as_u8(&self) -> Option<u8> {
        if self.scalar != ColumnScalar::U8 || self.is_null() {
            return None;
        }
        Some(self.raw[0])
    }
    #[must_use]
    pub fn as_u16(&self) -> Option<u16> {
        if self.scalar != ColumnScalar::U16 || self.is_null() {
            return None;
        }
        Some(u16::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        if self.scalar != ColumnScalar::U32 || self.is_null() {
            return None;
        }
        Some(u32::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        if self.scalar != ColumnScalar::U64 || self.is_null() {
            return None;
        }
        Some(u64::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_i8(&self) -> Option<i8> {
        if self.scalar != ColumnScalar::I8 || self.is_null() {
            return None;
        }
        Some(self.raw[0] as i8)
    }
    #[must_use]
    pub fn as_i16(&self) -> Option<i16> {
        if self.scalar != ColumnScalar::I16 || self.is_null() {
            return None;
        }
        Some(i16::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        if self.scalar != ColumnScalar::I32 || self.is_null() {
            return None;
        }
        Some(i32::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        if self.scalar != ColumnScalar::I64 || self.is_null() {
            return None;
        }
        Some(i64::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        if self.scalar != ColumnScalar::Float || self.is_null() {
            return None;
        }
        Some(f32::from_le_bytes(self.raw.try_into().unwrap()))
    }
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        if self.scalar != ColumnScalar::Bool {
            return None;
        }
        match self.raw[0] {
            marker::CELL_BOOL_TRUE => Some(true),
            marker::CELL_BOOL_FALSE => Some(false),
            _ => None,
        }
    }
}

/// Bit patterns written for a null cell of each scalar type, keyed off
/// [`ColumnScalar`]. Used by the insertion engine when appending a null
/// into an open column (columns carry no presence marker, so null has to
/// be encoded as one of these sentinels instead).
#[must_use]
pub fn null_payload(scalar: ColumnScalar) -> Vec<u8> {
    match scalar {
        ColumnScalar::U8 => vec![u8::MAX],
        ColumnScalar::U16 => u16::MAX.to_le_bytes().to_vec(),
        ColumnScalar::U32 => u32::MAX.to_le_bytes().to_vec(),
        ColumnScalar::U64 => u64::MAX.to_le_bytes().to_vec(),
        ColumnScalar::I8 => vec![i8::MIN as u8],
        ColumnScalar::I16 => i16::MIN.to_le_bytes().to_vec(),
        ColumnScalar::I32 => i32::MIN.to_le_bytes().to_vec(),
        ColumnScalar::I64 => i64::MIN.to_le_bytes().to_vec(),
        ColumnScalar::Float => f32::NAN.to_le_bytes().to_vec(),
        ColumnScalar::Bool => vec![marker::CELL_BOOL_NULL],
    }
}

/// A typed value destined for a single column cell, used by the revision
/// protocol's overwrite operation (the Column Iterator's `overwrite`
/// responsibility — random access already covers reads, `remove` already
/// covers deletes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnCell {
    Null,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
}

/// Encode `cell` as the raw bytes a column of `scalar`'s type stores for one
/// element.
///
/// # Errors
/// [`CarbonError::TypeMismatch`] if `cell`'s variant does not match `scalar`
/// (e.g. writing a `ColumnCell::U8` into a `ColumnScalar::I32` column).
pub fn encode_cell(scalar: ColumnScalar, cell: ColumnCell) -> Result<Vec<u8>, CarbonError> {
    if let ColumnCell::Null = cell {
        return Ok(null_payload(scalar));
    }
    let mismatch = || CarbonError::TypeMismatch {
        expected: scalar.label(),
        found: "mismatched column cell",
    };
    Ok(match (scalar, cell) {
        (ColumnScalar::Bool, ColumnCell::Bool(b)) => {
            vec![if b { marker::CELL_BOOL_TRUE } else { marker::CELL_BOOL_FALSE }]
        }
        (ColumnScalar::U8, ColumnCell::U8(v)) => vec![v],
        (ColumnScalar::U16, ColumnCell::U16(v)) => v.to_le_bytes().to_vec(),
        (ColumnScalar::U32, ColumnCell::U32(v)) => v.to_le_bytes().to_vec(),
        (ColumnScalar::U64, ColumnCell::U64(v)) => v.to_le_bytes().to_vec(),
        (ColumnScalar::I8, ColumnCell::I8(v)) => vec![v as u8],
        (ColumnScalar::I16, ColumnCell::I16(v)) => v.to_le_bytes().to_vec(),
        (ColumnScalar::I32, ColumnCell::I32(v)) => v.to_le_bytes().to_vec(),
        (ColumnScalar::I64, ColumnCell::I64(v)) => v.to_le_bytes().to_vec(),
        (ColumnScalar::Float, ColumnCell::Float(v)) => v.to_le_bytes().to_vec(),
        _ => return Err(mismatch()),
    })
}

/// Random-access reader over a column container's packed payload.
#[derive(Debug, Clone, Copy)]
pub struct ColumnIter<'m> {
    mf: &'m MemFile,
    begin_offset: usize,
    scalar: ColumnScalar,
    derivation: Derivation,
    num_elems: usize,
    capacity: usize,
    payload_offset: usize,
    cursor: usize,
}

impl<'m> ColumnIter<'m> {
    /// Open a reader over the column whose marker sits at `begin_offset`.
    ///
    /// # Errors
    /// [`CarbonError::TypeMismatch`] if the byte at `begin_offset` is not a
    /// column marker.
    pub fn at(mf: &'m MemFile, begin_offset: usize) -> Result<Self, CarbonError> {
        let b = mf.byte_at(begin_offset)?;
        let info = marker_info(b)?;
        let scalar = match info.kind {
            FieldKind::Column(s) => s,
            _ => {
                return Err(CarbonError::TypeMismatch {
                    expected: "column",
                    found: info.kind.name(),
                })
            }
        };
        let mut offset = begin_offset + 1;
        let (num_elems, n1) = mf.uintvar_at(offset)?;
        offset += n1;
        let (capacity, n2) = mf.uintvar_at(offset)?;
        offset += n2;

        Ok(Self {
            mf,
            begin_offset,
            scalar,
            derivation: info.derivation.unwrap_or(Derivation::UnsortedMulti),
            num_elems: num_elems as usize,
            capacity: capacity as usize,
            payload_offset: offset,
            cursor: 0,
        })
    }

    #[must_use]
    pub fn begin_offset(&self) -> usize {
        self.begin_offset
    }

    #[must_use]
    pub fn scalar(&self) -> ColumnScalar {
        self.scalar
    }

    #[must_use]
    pub fn derivation(&self) -> Derivation {
        self.derivation
    }

    /// Number of occupied elements (as opposed to reserved `capacity`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.num_elems
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_elems == 0
    }

    /// Reserved element slots, including unoccupied trailing padding.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset just past this column's packed payload (`capacity`, not
    /// `len`, since reserved-but-unused slots are still part of the
    /// on-wire span).
    #[must_use]
    pub fn end_offset(&self) -> usize {
        self.payload_offset + self.capacity * self.scalar.element_size()
    }

    /// Random-access read of element `index`.
    ///
    /// # Errors
    /// [`CarbonError::OutOfBounds`] if `index >= len()`.
    pub fn get(&self, index: usize) -> Result<ColumnValue<'m>, CarbonError> {
        if index >= self.num_elems {
            return Err(CarbonError::OutOfBounds {
                offset: index,
                len: self.num_elems,
            });
        }
        let size = self.scalar.element_size();
        let at = self.payload_offset + index * size;
        let raw = self.mf.bytes_at(at, size)?;
        Ok(ColumnValue {
            scalar: self.scalar,
            raw,
        })
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Advance to the next occupied element. Returns `Ok(None)` (not an
    /// error) once `len()` elements have been yielded.
    pub fn next(&mut self) -> Result<Option<ColumnValue<'m>>, CarbonError> {
        if self.cursor >= self.num_elems {
            return Ok(None);
        }
        let v = self.get(self.cursor)?;
        self.cursor += 1;
        Ok(Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_column(values: &[u8]) -> MemFile {
        let mut mf = MemFile::with_capacity(64);
        mf.write(&[crate::types::with_derivation(
            ColumnScalar::U8.base_marker(),
            Derivation::UnsortedMulti,
        )])
        .unwrap();
        mf.write_uintvar(values.len() as u64).unwrap();
        mf.write_uintvar(values.len() as u64).unwrap();
        mf.write(values).unwrap();
        mf
    }

    #[test]
    fn random_access_reads_every_element() {
        let mf = write_column(&[10, 20, 30]);
        let col = ColumnIter::at(&mf, 0).unwrap();
        assert_eq!(col.len(), 3);
        assert_eq!(col.get(0).unwrap().as_u8(), Some(10));
        assert_eq!(col.get(2).unwrap().as_u8(), Some(30));
        assert!(col.get(3).is_err());
    }

    #[test]
    fn sentinel_value_reads_as_null() {
        let mf = write_column(&[1, u8::MAX, 3]);
        let col = ColumnIter::at(&mf, 0).unwrap();
        assert!(col.get(1).unwrap().is_null());
        assert_eq!(col.get(1).unwrap().as_u8(), None);
        assert!(!col.get(0).unwrap().is_null());
    }

    #[test]
    fn sequential_next_matches_random_access() {
        let mf = write_column(&[5, 6, 7]);
        let mut col = ColumnIter::at(&mf, 0).unwrap();
        let mut seen = Vec::new();
        while let Some(v) = col.next().unwrap() {
            seen.push(v.as_u8().unwrap());
        }
        assert_eq!(seen, vec![5, 6, 7]);
        assert!(col.next().unwrap().is_none());
    }

    #[test]
    fn encode_cell_rejects_mismatched_scalar() {
        assert!(encode_cell(ColumnScalar::U8, ColumnCell::I16(4)).is_err());
        assert_eq!(encode_cell(ColumnScalar::U8, ColumnCell::U8(9)).unwrap(), vec![9]);
        assert_eq!(encode_cell(ColumnScalar::U8, ColumnCell::Null).unwrap(), vec![u8::MAX]);
        assert_eq!(
            encode_cell(ColumnScalar::Bool, ColumnCell::Bool(true)).unwrap(),
            vec![marker::CELL_BOOL_TRUE]
        );
    }
}
