//! `FieldAccess`: a transient, `Copy` descriptor of whatever field an
//! iterator's cursor currently stands on — decoded once in [`FieldAccess::decode`]
//! and then queried through typed accessors that enforce the marker matches
//! (else [`CarbonError::TypeMismatch`]).

use crate::error::CarbonError;
use crate::iter::array::ArrayIter;
use crate::iter::column::ColumnIter;
use crate::iter::object::ObjectIter;
use crate::memory::MemFile;
use crate::mime;
use crate::types::{marker, marker_info, ColumnScalar, Derivation, FieldKind};

/// Where a `Binary`/`BinaryCustom` field's mime annotation lives.
#[derive(Debug, Clone, Copy)]
pub enum MimeRef {
    /// A numeric id looked up in the static [`crate::mime`] table.
    Id(u64),
    /// A user-defined mime name stored inline as `[offset, len)`.
    Name { offset: usize, len: usize },
}

/// A decoded field: marker, kind, and enough offsets to fetch the payload
/// on demand. Cheap to copy; holds no borrow, so it outlives the iterator
/// call that produced it.
#[derive(Debug, Clone, Copy)]
pub struct FieldAccess {
    pub marker: u8,
    pub kind: FieldKind,
    /// Offset of the marker byte itself.
    pub marker_offset: usize,
    /// Offset where the scalar/string/binary payload begins, i.e. just
    /// past the marker and any variable-length header (string length,
    /// binary mime id/name). Meaningless for containers — use
    /// `array_value`/`object_value`/`column_value` instead.
    pub payload_offset: usize,
    /// Byte length of the payload (0 for null/true/false, the fixed
    /// scalar width, or the decoded string/binary length).
    pub payload_len: usize,
    pub mime: Option<MimeRef>,
}

macro_rules! scalar_getter {
    ($name:ident, $ty:ty, $kind:ident, $label:expr) => {
        pub fn $name(&self, mf: &MemFile) -> Result<$ty, CarbonError> {
            if self.kind != FieldKind::$kind {
                return Err(self.mismatch($label));
            }
            let bytes = mf.bytes_at(self.payload_offset, core::mem::size_of::<$ty>())?;
            Ok(<$ty>::from_le_bytes(bytes.try_into().unwrap()))
        }
    };
}

impl FieldAccess {
    /// Decode the field whose marker sits at `marker_offset`.
    pub fn decode(mf: &MemFile, marker_offset: usize) -> Result<Self, CarbonError> {
        let marker = mf.byte_at(marker_offset)?;
        let info = marker_info(marker)?;

        let mut payload_offset = marker_offset + 1;
        let mut payload_len = info.value_size.unwrap_or(0);
        let mut mime = None;

        match info.kind {
            FieldKind::String => {
                let (len, len_bytes) = mf.uintvar_at(payload_offset)?;
                payload_offset += len_bytes;
                payload_len = len as usize;
            }
            FieldKind::Binary => {
                let (mime_id, id_bytes) = mf.uintvar_at(payload_offset)?;
                payload_offset += id_bytes;
                let (len, len_bytes) = mf.uintvar_at(payload_offset)?;
                payload_offset += len_bytes;
                payload_len = len as usize;
                mime = Some(MimeRef::Id(mime_id));
            }
            FieldKind::BinaryCustom => {
                let (name_len, name_len_bytes) = mf.uintvar_at(payload_offset)?;
                payload_offset += name_len_bytes;
                let name_offset = payload_offset;
                payload_offset += name_len as usize;
                let (len, len_bytes) = mf.uintvar_at(payload_offset)?;
                payload_offset += len_bytes;
                payload_len = len as usize;
                mime = Some(MimeRef::Name {
                    offset: name_offset,
                    len: name_len as usize,
                });
            }
            _ => {}
        }

        Ok(Self {
            marker,
            kind: info.kind,
            marker_offset,
            payload_offset,
            payload_len,
            mime,
        })
    }

    fn mismatch(&self, expected: &'static str) -> CarbonError {
        CarbonError::TypeMismatch {
            expected,
            found: self.kind.name(),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.kind.is_null()
    }

    pub fn as_bool(&self, mf: &MemFile) -> Result<bool, CarbonError> {
        let _ = mf;
        match self.kind {
            FieldKind::True => Ok(true),
            FieldKind::False => Ok(false),
            _ => Err(self.mismatch("bool")),
        }
    }

    scalar_getter!(as_u8, u8, U8, "u8");
    scalar_getter!(as_u16, u16, U16, "u16");
    scalar_getter!(as_u32, u32, U32, "u32");
    scalar_getter!(as_u64, u64, U64, "u64");
    scalar_getter!(as_i8, i8, I8, "i8");
    scalar_getter!(as_i16, i16, I16, "i16");
    scalar_getter!(as_i32, i32, I32, "i32");
    scalar_getter!(as_i64, i64, I64, "i64");
    scalar_getter!(as_f32, f32, Float, "float");

    /// Decode the field as a string slice borrowed from `mf`.
    pub fn as_str<'m>(&self, mf: &'m MemFile) -> Result<&'m str, CarbonError> {
        if self.kind != FieldKind::String {
            return Err(self.mismatch("string"));
        }
        let bytes = mf.bytes_at(self.payload_offset, self.payload_len)?;
        core::str::from_utf8(bytes)
            .map_err(|e| CarbonError::Corrupted(format!("string field is not valid utf-8: {e}")))
    }

    /// Decode the field as binary bytes plus its resolved mime string.
    pub fn as_binary<'m>(&self, mf: &'m MemFile) -> Result<(&'static str, &'m [u8]), CarbonError> {
        match (self.kind, self.mime) {
            (FieldKind::Binary, Some(MimeRef::Id(id))) => {
                let bytes = mf.bytes_at(self.payload_offset, self.payload_len)?;
                Ok((mime::name_from_id(id), bytes))
            }
            _ => Err(self.mismatch("binary")),
        }
    }

    /// Decode the field as custom binary bytes plus its inline mime name.
    pub fn as_binary_custom<'m>(
        &self,
        mf: &'m MemFile,
    ) -> Result<(&'m str, &'m [u8]), CarbonError> {
        match (self.kind, self.mime) {
            (FieldKind::BinaryCustom, Some(MimeRef::Name { offset, len })) => {
                let name = core::str::from_utf8(mf.bytes_at(offset, len)?).map_err(|e| {
                    CarbonError::Corrupted(format!("mime name is not valid utf-8: {e}"))
                })?;
                let bytes = mf.bytes_at(self.payload_offset, self.payload_len)?;
                Ok((name, bytes))
            }
            _ => Err(self.mismatch("binary_custom")),
        }
    }

    /// Open a nested array iterator. Fails with `TypeMismatch` unless this
    /// field is an array container.
    pub fn array_value<'m>(&self, mf: &'m MemFile) -> Result<ArrayIter<'m>, CarbonError> {
        if !self.kind.is_array_or_subtype() {
            return Err(self.mismatch("array"));
        }
        ArrayIter::at(mf, self.marker_offset)
    }

    /// Open a nested object iterator. Fails with `TypeMismatch` unless this
    /// field is an object container.
    pub fn object_value<'m>(&self, mf: &'m MemFile) -> Result<ObjectIter<'m>, CarbonError> {
        if !self.kind.is_object_or_subtype() {
            return Err(self.mismatch("object"));
        }
        ObjectIter::at(mf, self.marker_offset)
    }

    /// Open a nested column iterator. Fails with `TypeMismatch` unless this
    /// field is a column container.
    pub fn column_value<'m>(&self, mf: &'m MemFile) -> Result<ColumnIter<'m>, CarbonError> {
        if !self.kind.is_column_or_subtype() {
            return Err(self.mismatch("column"));
        }
        ColumnIter::at(mf, self.marker_offset)
    }

    /// The container/column derivation, if this field is one.
    #[must_use]
    pub fn derivation(&self) -> Option<Derivation> {
        marker_info(self.marker).ok().and_then(|i| i.derivation)
    }

    /// The scalar type of a column field, if this field is one.
    #[must_use]
    pub fn column_scalar(&self) -> Option<ColumnScalar> {
        match self.kind {
            FieldKind::Column(s) => Some(s),
            _ => None,
        }
    }
}

/// Skip past a field (scalar, string/binary, or a whole nested container)
/// starting at `marker_offset`, returning the offset just past it. Shared
/// by array/object iteration, `pack`, and `field_remove` — this is the one
/// place that knows how to compute a field's total on-wire size, including
/// recursing into nested containers via `fast_forward`.
pub fn field_end_offset(mf: &MemFile, marker_offset: usize) -> Result<usize, CarbonError> {
    let access = FieldAccess::decode(mf, marker_offset)?;
    match access.kind {
        FieldKind::ArrayBegin => Ok(ArrayIter::at(mf, marker_offset)?.fast_forward()?),
        FieldKind::ObjectBegin => Ok(ObjectIter::at(mf, marker_offset)?.fast_forward()?),
        FieldKind::Column(_) => Ok(ColumnIter::at(mf, marker_offset)?.end_offset()),
        _ => Ok(access.payload_offset + access.payload_len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert::Inserter;

    #[test]
    fn decodes_scalar_fields() {
        let mut mf = MemFile::with_capacity(16);
        mf.write(&[marker::U32]).unwrap();
        mf.write(&42u32.to_le_bytes()).unwrap();
        let access = FieldAccess::decode(&mf, 0).unwrap();
        assert_eq!(access.as_u32(&mf).unwrap(), 42);
        assert!(access.as_u8(&mf).is_err());
    }

    #[test]
    fn decodes_string_field() {
        let mut mf = MemFile::with_capacity(16);
        Inserter::write_string_field(&mut mf, "hi").unwrap();
        let access = FieldAccess::decode(&mf, 0).unwrap();
        assert_eq!(access.as_str(&mf).unwrap(), "hi");
    }
}
