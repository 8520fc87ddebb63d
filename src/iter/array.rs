//! Forward cursor over an array container.

use crate::error::CarbonError;
use crate::field::{field_end_offset, FieldAccess};
use crate::memory::MemFile;
use crate::types::{marker, marker_info, Derivation, FieldKind};

/// A forward cursor over the elements of an array container, honoring the
/// begin/end markers and skipping empty (padding) slots.
#[derive(Debug, Clone, Copy)]
pub struct ArrayIter<'m> {
    mf: &'m MemFile,
    begin_offset: usize,
    cursor: usize,
    derivation: Derivation,
    ended: bool,
}

impl<'m> ArrayIter<'m> {
    /// Open an iterator over the array container whose begin-marker sits
    /// at `begin_offset`.
    ///
    /// # Errors
    /// [`CarbonError::TypeMismatch`] if the byte at `begin_offset` is not
    /// an array begin-marker.
    pub fn at(mf: &'m MemFile, begin_offset: usize) -> Result<Self, CarbonError> {
        let b = mf.byte_at(begin_offset)?;
        let info = marker_info(b)?;
        if info.kind != FieldKind::ArrayBegin {
            return Err(CarbonError::TypeMismatch {
                expected: "array",
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

    /// Offset of this container's begin-marker.
    #[must_use]
    pub fn begin_offset(&self) -> usize {
        self.begin_offset
    }

    /// The array's derivation (multiset/set × sorted/unsorted).
    #[must_use]
    pub fn derivation(&self) -> Derivation {
        self.derivation
    }

    /// Current cursor position.
    #[must_use]
    pub fn tell(&self) -> usize {
        self.cursor
    }

    /// Reset the cursor to the first element.
    pub fn rewind(&mut self) {
        self.cursor = self.begin_offset + 1;
        self.ended = false;
    }

    /// Advance to the next occupied slot, skipping padding. Returns
    /// `Ok(None)` (not an error) once the end marker is reached, or — for
    /// the root array, which has no end marker and simply spans to the end
    /// of the buffer — once the buffer itself is exhausted.
    pub fn next(&mut self) -> Result<Option<FieldAccess>, CarbonError> {
        if self.ended {
            return Ok(None);
        }
        loop {
            if self.cursor >= self.mf.len() {
                self.ended = true;
                return Ok(None);
            }
            let b = self.mf.byte_at(self.cursor)?;
            if b == 0 {
                self.cursor += 1;
                continue;
            }
            if b == marker::ARRAY_END {
                self.ended = true;
                return Ok(None);
            }
            let access = FieldAccess::decode(self.mf, self.cursor)?;
            self.cursor = field_end_offset(self.mf, self.cursor)?;
            return Ok(Some(access));
        }
    }

    /// Advance to (and past) this container's end marker, returning the
    /// offset just past it, without materializing the elements visited
    /// along the way. Used by `field_end_offset`, `pack`, and anything
    /// else that only needs this container's total byte span.
    pub fn fast_forward(mut self) -> Result<usize, CarbonError> {
        while self.next()?.is_some() {}
        Ok(self.cursor + 1)
    }

    /// Count occupied elements by exhausting a clone of this iterator.
    /// Used by tests and by property checks; not on any hot path.
    pub fn count_remaining(mut self) -> Result<usize, CarbonError> {
        let mut n = 0;
        while self.next()?.is_some() {
            n += 1;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insert::Inserter;

    #[test]
    fn iterates_in_insertion_order_and_skips_padding() {
        let mut mf = MemFile::with_capacity(64);
        let mut ins = Inserter::begin_root_array(&mut mf, None).unwrap();
        ins.insert_u8(&mut mf, 1).unwrap();
        ins.insert_u8(&mut mf, 2).unwrap();
        ins.insert_u8(&mut mf, 3).unwrap();
        ins.end(&mut mf).unwrap();

        let mut it = ArrayIter::at(&mf, 0).unwrap();
        let mut seen = Vec::new();
        while let Some(field) = it.next().unwrap() {
            seen.push(field.as_u8(&mf).unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn exhaustion_reports_is_end_not_error() {
        let mut mf = MemFile::with_capacity(16);
        let mut ins = Inserter::begin_root_array(&mut mf, None).unwrap();
        ins.insert_null(&mut mf).unwrap();
        ins.end(&mut mf).unwrap();

        let mut it = ArrayIter::at(&mf, 0).unwrap();
        assert!(it.next().unwrap().is_some());
        assert!(it.next().unwrap().is_none());
        assert!(it.next().unwrap().is_none());
    }
}
