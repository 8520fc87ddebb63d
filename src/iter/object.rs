//! Forward cursor over an object container's key/value pairs.

use crate::error::CarbonError;
use crate::field::{field_end_offset, FieldAccess};
use crate::memory::MemFile;
use crate::types::{marker, marker_info, Derivation, FieldKind};

/// A single decoded key/value pair yielded by [`ObjectIter::next`].
#[derive(Debug, Clone, Copy)]
pub struct ObjectEntry<'m> {
    pub key: &'m str,
    pub key_offset: usize,
    pub value: FieldAccess,
}

/// A forward cursor over the key/value pairs of an object container.
#[derive(Debug, Clone, Copy)]
pub struct ObjectIter<'m> {
    mf: &'m MemFile,
    begin_offset: usize,
    cursor: usize,
    derivation: Derivation,
    ended: bool,
}

impl<'m> ObjectIter<'m> {
    /// Open an iterator over the object container whose begin-marker sits
    /// at `begin_offset`.
    ///
    /// # Errors
    /// [`CarbonError::TypeMismatch`] if the byte at `begin_offset` is not
    /// an object begin-marker.
    pub fn at(mf: &'m MemFile, begin_offset: usize) -> Result<Self, CarbonError> {
        let b = mf.byte_at(begin_offset)?;
        let info = marker_info(b)?;
        if info.kind != FieldKind::ObjectBegin {
            return Err(CarbonError::TypeMismatch {
                expected: "object",
                found: info.kind.name(),
            });
        }
        Ok(Self {
            mf,
            begin_offset,
            cursor: begin_offset + 1,
            derivation: info.derivation.unwrap_or(Derivation::UnsortedMulti),
            ended: false,
        })
    }

    #[must_use]
    pub fn begin_offset(&self) -> usize {
        self.begin_offset
    }

    #[must_use]
    pub fn derivation(&self) -> Derivation {
        self.derivation
    }

    #[must_use]
    pub fn tell(&self) -> usize {
        self.cursor
    }

    pub fn rewind(&mut self) {
        self.cursor = self.begin_offset + 1;
        self.ended = false;
    }

    /// Advance to the next occupied pair, skipping padding. Returns
    /// `Ok(None)` (not an error) once the end marker is reached.
    pub fn next(&mut self) -> Result<Option<ObjectEntry<'m>>, CarbonError> {
        if self.ended {
            return Ok(None);
        }
        loop {
            let b = self.mf.byte_at(self.cursor)?;
            if b == 0 {
                self.cursor += 1;
                continue;
            }
            if b == marker::OBJECT_END {
                self.ended = true;
                return Ok(None);
            }

            let (key_len, key_len_bytes) = self.mf.uintvar_at(self.cursor)?;
            let key_offset = self.cursor + key_len_bytes;
            let key_bytes = self.mf.bytes_at(key_offset, key_len as usize)?;
            let key = core::str::from_utf8(key_bytes).map_err(|e| {
                CarbonError::Corrupted(format!("object key is not valid utf-8: {e}"))
            })?;

            let value_offset = key_offset + key_len as usize;
            let value = FieldAccess::decode(self.mf, value_offset)?;
            self.cursor = field_end_offset(self.mf, value_offset)?;

            return Ok(Some(ObjectEntry {
                key,
                key_offset,
                value,
            }));
        }
    }

    /// Look up a value by key, consuming this iterator (it advances
    /// linearly; callers wanting to keep iterating should `clone` first).
    pub fn find(mut self, key: &str) -> Result<Option<FieldAccess>, CarbonError> {
        while let Some(entry) = self.next()? {
            if entry.key == key {
                return Ok(Some(entry.value));
            }
        }
        Ok(None)
    }

    /// Advance to (and past) this container's end marker, returning the
    /// offset just past it.
    pub fn fast_forward(mut self) -> Result<usize, CarbonError> {
        while self.next()?.is_some() {}
        Ok(self.cursor + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert::Inserter;

    #[test]
    fn iterates_pairs_in_insertion_order() {
        let mut mf = MemFile::with_capacity(64);
        let mut root = Inserter::begin_root_array(&mut mf, None).unwrap();
        let mut obj = root.begin_object(&mut mf, None).unwrap();
        obj.insert_prop_string(&mut mf, "a", "1").unwrap();
        obj.insert_prop_string(&mut mf, "b", "2").unwrap();
        root.end_nested(&mut mf, obj).unwrap();
        root.end(&mut mf).unwrap();

        let mut array = ArrayIterForTest::open(&mf);
        let obj_field = array.next().unwrap().unwrap();
        let mut it = obj_field.object_value(&mf).unwrap();
        let first = it.next().unwrap().unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(first.value.as_str(&mf).unwrap(), "1");
        let second = it.next().unwrap().unwrap();
        assert_eq!(second.key, "b");
        assert!(it.next().unwrap().is_none());
    }

    /// Tiny local helper so the object test doesn't need to depend on the
    /// array iterator module's test-only internals.
    struct ArrayIterForTest;
    impl ArrayIterForTest {
        fn open(mf: &MemFile) -> crate::iter::array::ArrayIter<'_> {
            crate::iter::array::ArrayIter::at(mf, 0).unwrap()
        }
    }
}
