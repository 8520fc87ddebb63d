//! Revision protocol: `begin -> mutate -> end`, under a per-record spinlock,
//! plus `pack`/`shrink` (reclaim padding) and a small dot-path walker used
//! by `revise_remove`.
//!
//! A `Revision` holds the only mutable view of a record's `MemFile` while
//! open; the originating `Record` is marked not-latest only once `end`
//! commits successfully, so an aborted revision leaves the original
//! untouched and re-revisable.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CarbonError;
use crate::field::{field_end_offset, FieldAccess};
use crate::iter::array::ArrayIter;
use crate::iter::column::ColumnIter;
use crate::iter::object::ObjectIter;
use crate::key::{KeyHeader, KeyValue};
use crate::memory::MemFile;
use crate::types::FieldKind;

/// Per-record concurrency state: a write-exclusion spinlock plus the two
/// sticky flags the spec attaches to a revision's lifecycle.
#[derive(Debug, Default)]
pub struct RevisionGuard {
    write_lock: AtomicBool,
    commit_lock: AtomicBool,
    is_latest: AtomicBool,
}

impl RevisionGuard {
    #[must_use]
    pub fn new_latest() -> Self {
        Self {
            write_lock: AtomicBool::new(false),
            commit_lock: AtomicBool::new(false),
            is_latest: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.is_latest.load(Ordering::Acquire)
    }

    /// Spin, then yield, until the write lock is acquired.
    fn acquire_write_lock(&self) {
        let mut spins = 0u32;
        while self
            .write_lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            if spins < 100 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }

    fn try_acquire_write_lock(&self) -> bool {
        self.write_lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release_write_lock(&self) {
        self.write_lock.store(false, Ordering::Release);
    }
}

/// A mutable session opened against a cloned `MemFile`. Dropping this
/// without calling [`Revision::end`] or [`Revision::abort`] is a caller
/// bug; the guard's `write_lock` would stay held forever, so both exit
/// paths are the only ways to release it.
pub struct Revision<'g> {
    guard: &'g RevisionGuard,
    mf: MemFile,
    key_header: KeyHeader,
    ended: bool,
}

impl<'g> Revision<'g> {
    /// Begin a revision, blocking (spin-then-yield) until the write lock is
    /// free.
    ///
    /// # Errors
    /// [`CarbonError::Outdated`] if `guard` no longer belongs to the latest
    /// revision of its record.
    #[tracing::instrument(skip(guard, original))]
    pub fn begin(guard: &'g RevisionGuard, original: &MemFile) -> Result<Self, CarbonError> {
        if !guard.is_latest() {
            return Err(CarbonError::Outdated);
        }
        guard.acquire_write_lock();
        guard.commit_lock.store(true, Ordering::Release);
        let mut mf = original.clone();
        mf.seek(0);
        let key_header = KeyHeader::read(&mut mf)?;
        tracing::debug!("revision begun");
        Ok(Self {
            guard,
            mf,
            key_header,
            ended: false,
        })
    }

    /// Non-blocking variant of [`Self::begin`]: returns `Ok(None)` instead
    /// of blocking if another revision already holds the write lock.
    pub fn try_begin(
        guard: &'g RevisionGuard,
        original: &MemFile,
    ) -> Result<Option<Self>, CarbonError> {
        if !guard.is_latest() {
            return Err(CarbonError::Outdated);
        }
        if !guard.try_acquire_write_lock() {
            return Ok(None);
        }
        guard.commit_lock.store(true, Ordering::Release);
        let mut mf = original.clone();
        mf.seek(0);
        let key_header = KeyHeader::read(&mut mf)?;
        Ok(Some(Self {
            guard,
            mf,
            key_header,
            ended: false,
        }))
    }

    /// Offset of the root array body, just past the key/commit-hash header.
    #[must_use]
    pub fn root_offset(&self) -> usize {
        self.key_header.encoded_len()
    }

    /// Open an iterator over the revised root array.
    pub fn iterator_open(&self) -> Result<ArrayIter<'_>, CarbonError> {
        ArrayIter::at(&self.mf, self.root_offset())
    }

    /// Resolve a dot-separated path (`"a.1.b"`) against the revised root,
    /// walking arrays, objects, and columns uniformly at each segment: a
    /// numeric segment indexes into an array or a column, a non-numeric
    /// segment looks up an object key.
    pub fn find_open(&self, dot_path: &str) -> Result<Option<FieldAccess>, CarbonError> {
        self.resolve_path(dot_path)
    }

    /// Decide whether a path's first segment should address the root
    /// array's single wrapped child rather than the root itself.
    ///
    /// `from_json` always wraps its top-level value as the root array's
    /// sole element, so a path never mentions that implicit index: `"a.1"`
    /// against `from_json({"a":[1,2,3]})` means "key `a` of the wrapped
    /// object", and `"1"` against `from_json([1,2,3])` means "index 1 of
    /// the wrapped array/column" — not "index 1 of the root", which would
    /// only exist for a hand-built record with more than one root element.
    /// Returns `None` (address the root directly) when the root holds zero
    /// or more than one element, or when `first`'s shape (numeric vs. key)
    /// doesn't match what the wrapped child's container kind accepts.
    fn resolve_root_target(
        &self,
        root_offset: usize,
        first: &str,
    ) -> Result<Option<FieldAccess>, CarbonError> {
        let Some(root_elem) = single_root_child(&self.mf, root_offset)? else {
            return Ok(None);
        };
        let addresses_wrapped = match root_elem.kind {
            FieldKind::ArrayBegin | FieldKind::Column(_) => first.parse::<usize>().is_ok(),
            FieldKind::ObjectBegin => first.parse::<usize>().is_err(),
            _ => false,
        };
        Ok(if addresses_wrapped { Some(root_elem) } else { None })
    }

    /// Resolve the first dot-path segment, against the wrapped top-level
    /// value if [`Self::resolve_root_target`] says so, else against the
    /// root array directly.
    fn resolve_first_segment(
        &self,
        root_offset: usize,
        first: &str,
    ) -> Result<Option<FieldAccess>, CarbonError> {
        if let Some(wrapped) = self.resolve_root_target(root_offset, first)? {
            return resolve_segment(&self.mf, &wrapped, first);
        }
        if first.parse::<usize>().is_ok() {
            resolve_segment_in_array(&self.mf, root_offset, first)
        } else {
            Ok(None)
        }
    }

    fn resolve_path(&self, dot_path: &str) -> Result<Option<FieldAccess>, CarbonError> {
        let root_offset = self.root_offset();
        let mut segments = dot_path.split('.');
        let Some(first) = segments.next() else {
            return Ok(None);
        };

        let mut current = match self.resolve_first_segment(root_offset, first)? {
            Some(field) => field,
            None => return Ok(None),
        };

        for segment in segments {
            current = match resolve_segment(&self.mf, &current, segment)? {
                Some(field) => field,
                None => return Ok(None),
            };
        }
        Ok(Some(current))
    }

    /// Remove the field (or column cell) resolved by `dot_path`.
    pub fn remove(&mut self, dot_path: &str) -> Result<bool, CarbonError> {
        let Some((parent_container, last_segment)) = split_parent(dot_path) else {
            return Ok(false);
        };
        let root_offset = self.root_offset();

        let parent = if parent_container.is_empty() {
            None
        } else {
            self.resolve_path(parent_container)?
        };

        match parent {
            None => match self.resolve_root_target(root_offset, last_segment)? {
                // Bare segment against the implicitly-wrapped top-level
                // value, e.g. `remove("msg")` on `from_json({"msg":"hi"})`
                // or `remove("1")` on `from_json([1,2,3])`.
                Some(wrapped) => match wrapped.kind {
                    FieldKind::ArrayBegin => {
                        remove_from_array_or_root(&mut self.mf, wrapped.marker_offset, last_segment)
                    }
                    FieldKind::ObjectBegin => {
                        remove_from_object(&mut self.mf, wrapped.marker_offset, last_segment)
                    }
                    FieldKind::Column(_) => {
                        let index: usize = last_segment
                            .parse()
                            .map_err(|_| CarbonError::DotPathParseError(dot_path.to_string()))?;
                        column_remove(&mut self.mf, wrapped.marker_offset, index)
                    }
                    _ => Err(CarbonError::TypeMismatch {
                        expected: "container",
                        found: wrapped.kind.name(),
                    }),
                },
                None => {
                    if last_segment.parse::<usize>().is_ok() {
                        remove_from_array_or_root(&mut self.mf, root_offset, last_segment)
                    } else {
                        Ok(false)
                    }
                }
            },
            Some(field) => match field.kind {
                FieldKind::ArrayBegin => {
                    remove_from_array_or_root(&mut self.mf, field.marker_offset, last_segment)
                }
                FieldKind::ObjectBegin => {
                    remove_from_object(&mut self.mf, field.marker_offset, last_segment)
                }
                FieldKind::Column(_) => {
                    let index: usize = last_segment
                        .parse()
                        .map_err(|_| CarbonError::DotPathParseError(dot_path.to_string()))?;
                    column_remove(&mut self.mf, field.marker_offset, index)
                }
                _ => Err(CarbonError::TypeMismatch {
                    expected: "container",
                    found: field.kind.name(),
                }),
            },
        }
    }

    /// Overwrite the cell at `index` inside the column resolved by
    /// `dot_path`, leaving `num_elems`/`capacity` unchanged. Reads go
    /// through `ColumnIter::get`, deletes through [`Self::remove`].
    ///
    /// # Errors
    /// [`CarbonError::TypeMismatch`] if `dot_path` does not resolve to a
    /// column, or if `value`'s variant does not match the column's scalar
    /// type. Returns `Ok(false)` if `dot_path` doesn't resolve or `index` is
    /// out of bounds.
    pub fn column_overwrite(
        &mut self,
        dot_path: &str,
        index: usize,
        value: crate::iter::ColumnCell,
    ) -> Result<bool, CarbonError> {
        let Some(field) = self.resolve_path(dot_path)? else {
            return Ok(false);
        };
        match field.kind {
            FieldKind::Column(scalar) => {
                column_overwrite_cell(&mut self.mf, field.marker_offset, scalar, index, value)
            }
            _ => Err(CarbonError::TypeMismatch {
                expected: "column",
                found: field.kind.name(),
            }),
        }
    }

    /// Recurse into every nested array/object/column reachable from the
    /// root, removing padding between each one's last occupied slot and its
    /// end marker (or, for columns, shrinking capacity down to element
    /// count). The root array itself has no end marker to pack against —
    /// its own trailing padding is reclaimed by [`Self::shrink`] instead.
    #[tracing::instrument(skip(self))]
    pub fn pack(&mut self) -> Result<(), CarbonError> {
        let root_offset = self.root_offset();
        let children = collect_array_children(&self.mf, root_offset)?;
        for (kind, offset) in children {
            pack_child(&mut self.mf, kind, offset)?;
        }
        Ok(())
    }

    /// After [`Self::pack`], truncate trailing unused `MemFile` bytes past
    /// the root array's last occupied element (the root has no end marker,
    /// so "used" is just the offset just past its last element).
    pub fn shrink(&mut self) -> Result<(), CarbonError> {
        let root_offset = self.root_offset();
        let mut it = ArrayIter::at(&self.mf, root_offset)?;
        let mut last_end = root_offset + 1;
        while let Some(field) = it.next()? {
            last_end = field_end_offset(&self.mf, field.marker_offset)?;
        }
        self.mf.cut_to(last_end);
        Ok(())
    }

    pub fn key_set_unsigned(&mut self, value: u64) -> Result<(), CarbonError> {
        match self.key_header.kind {
            crate::key::KeyKind::AutoKey | crate::key::KeyKind::UKey => {
                self.key_header.value = KeyValue::Unsigned(value);
                self.rewrite_header()
            }
            _ => Err(CarbonError::TypeMismatch {
                expected: "unsigned key",
                found: "incompatible key kind",
            }),
        }
    }

    pub fn key_set_signed(&mut self, value: i64) -> Result<(), CarbonError> {
        match self.key_header.kind {
            crate::key::KeyKind::IKey => {
                self.key_header.value = KeyValue::Signed(value);
                self.rewrite_header()
            }
            _ => Err(CarbonError::TypeMismatch {
                expected: "signed key",
                found: "incompatible key kind",
            }),
        }
    }

    pub fn key_set_string(&mut self, value: &str) -> Result<(), CarbonError> {
        match self.key_header.kind {
            crate::key::KeyKind::SKey => {
                self.key_header.value = KeyValue::Str(value.to_string());
                self.rewrite_header()
            }
            _ => Err(CarbonError::TypeMismatch {
                expected: "string key",
                found: "incompatible key kind",
            }),
        }
    }

    pub fn key_generate(&mut self) -> Result<u64, CarbonError> {
        match self.key_header.kind {
            crate::key::KeyKind::AutoKey => {
                let value = crate::key::key_generate();
                self.key_header.value = KeyValue::Unsigned(value);
                self.rewrite_header()?;
                Ok(value)
            }
            _ => Err(CarbonError::TypeMismatch {
                expected: "auto key",
                found: "incompatible key kind",
            }),
        }
    }

    fn rewrite_header(&mut self) -> Result<(), CarbonError> {
        let old_len = self.root_offset();
        let new_len = self.key_header.encoded_len();
        self.mf.seek(0);
        if new_len > old_len {
            self.mf.inplace_insert(new_len - old_len)?;
        } else if new_len < old_len {
            self.mf.inplace_remove(old_len - new_len)?;
        }
        self.mf.seek(0);
        self.key_header.write(&mut self.mf)
    }

    /// Finish the revision: recompute the commit hash (if the key kind
    /// carries one) over the payload region, and hand back the sealed
    /// bytes for the caller to install as the new latest `Record`.
    #[tracing::instrument(skip(self))]
    pub fn end(mut self) -> Result<MemFile, CarbonError> {
        if self.key_header.kind.has_commit_hash() {
            let root_offset = self.root_offset();
            let payload = self.mf.bytes_at(root_offset, self.mf.len() - root_offset)?;
            let hash = commit_hash_of(payload);
            self.key_header.commit_hash = Some(hash);
            self.rewrite_header()?;
        }
        self.ended = true;
        self.guard.commit_lock.store(false, Ordering::Release);
        self.guard.is_latest.store(false, Ordering::Release);
        self.guard.release_write_lock();
        tracing::debug!("revision ended");
        Ok(std::mem::replace(&mut self.mf, MemFile::with_capacity(0)))
    }

    /// Abandon the revision: the original record remains latest and
    /// revisable.
    pub fn abort(mut self) {
        self.ended = true;
        self.guard.commit_lock.store(false, Ordering::Release);
        self.guard.release_write_lock();
        tracing::debug!("revision aborted");
    }
}

impl<'g> Drop for Revision<'g> {
    fn drop(&mut self) {
        if !self.ended {
            // Caller dropped the revision without `end`/`abort`: treat it
            // as an abort so the write lock is never leaked.
            self.guard.commit_lock.store(false, Ordering::Release);
            self.guard.release_write_lock();
        }
    }
}

/// Recompute the record's commit hash over its raw payload (key excluded).
#[must_use]
pub fn commit_hash_of(payload: &[u8]) -> u64 {
    let digest = blake3::hash(payload);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[0..8]);
    u64::from_le_bytes(buf)
}

fn resolve_segment_in_array(
    mf: &MemFile,
    array_begin: usize,
    segment: &str,
) -> Result<Option<FieldAccess>, CarbonError> {
    let index: usize = segment
        .parse()
        .map_err(|_| CarbonError::DotPathParseError(segment.to_string()))?;
    let mut it = ArrayIter::at(mf, array_begin)?;
    let mut i = 0;
    while let Some(field) = it.next()? {
        if i == index {
            return Ok(Some(field));
        }
        i += 1;
    }
    Ok(None)
}

fn resolve_segment(
    mf: &MemFile,
    current: &FieldAccess,
    segment: &str,
) -> Result<Option<FieldAccess>, CarbonError> {
    match current.kind {
        FieldKind::ArrayBegin => resolve_segment_in_array(mf, current.marker_offset, segment),
        FieldKind::ObjectBegin => {
            let it = ObjectIter::at(mf, current.marker_offset)?;
            it.find(segment)
        }
        FieldKind::Column(_) => {
            let index: usize = segment
                .parse()
                .map_err(|_| CarbonError::DotPathParseError(segment.to_string()))?;
            let col = ColumnIter::at(mf, current.marker_offset)?;
            if index >= col.len() {
                return Ok(None);
            }
            // Column cells are not addressable as a `FieldAccess` (columns
            // carry no marker byte per element); callers that need a cell
            // value should use `ColumnIter::get` directly once they've
            // located the column. For path resolution purposes the column
            // container itself is returned so callers distinguish "no
            // further segments valid" from "not found".
            Ok(Some(*current))
        }
        _ => Err(CarbonError::TypeMismatch {
            expected: "container",
            found: current.kind.name(),
        }),
    }
}

/// The root array's sole element, or `None` if it holds zero or more than
/// one element. `from_json` always produces a single-element root; records
/// built by hand through the insertion API may not.
fn single_root_child(mf: &MemFile, root_offset: usize) -> Result<Option<FieldAccess>, CarbonError> {
    let mut it = ArrayIter::at(mf, root_offset)?;
    let Some(first) = it.next()? else {
        return Ok(None);
    };
    if it.next()?.is_some() {
        return Ok(None);
    }
    Ok(Some(first))
}

fn column_overwrite_cell(
    mf: &mut MemFile,
    column_begin: usize,
    scalar: crate::types::ColumnScalar,
    index: usize,
    value: crate::iter::ColumnCell,
) -> Result<bool, CarbonError> {
    let payload_offset = {
        let it = ColumnIter::at(mf, column_begin)?;
        if index >= it.len() {
            return Ok(false);
        }
        it.end_offset() - it.capacity() * it.scalar().element_size()
    };
    let bytes = crate::iter::column::encode_cell(scalar, value)?;
    let size = scalar.element_size();
    mf.seek(payload_offset + index * size);
    mf.write(&bytes)?;
    Ok(true)
}

fn split_parent(dot_path: &str) -> Option<(&str, &str)> {
    match dot_path.rfind('.') {
        Some(idx) => Some((&dot_path[..idx], &dot_path[idx + 1..])),
        None => Some(("", dot_path)),
    }
}

fn remove_from_array_or_root(
    mf: &mut MemFile,
    array_begin: usize,
    segment: &str,
) -> Result<bool, CarbonError> {
    let index: usize = segment
        .parse()
        .map_err(|_| CarbonError::DotPathParseError(segment.to_string()))?;
    let mut it = ArrayIter::at(mf, array_begin)?;
    let mut i = 0;
    let mut target: Option<usize> = None;
    while let Some(field) = it.next()? {
        if i == index {
            target = Some(field.marker_offset);
            break;
        }
        i += 1;
    }
    let Some(offset) = target else {
        return Ok(false);
    };
    field_remove(mf, offset)?;
    Ok(true)
}

/// Walk an object's pairs by hand (rather than through [`ObjectIter`]) so
/// the matching pair's start offset — the key-length uintvar, not the key
/// bytes or the value — is known precisely enough to delete the whole pair.
fn remove_from_object(
    mf: &mut MemFile,
    object_begin: usize,
    key: &str,
) -> Result<bool, CarbonError> {
    let mut cursor = object_begin + 1;
    loop {
        let b = mf.byte_at(cursor)?;
        if b == 0 {
            cursor += 1;
            continue;
        }
        if b == crate::types::marker::OBJECT_END {
            return Ok(false);
        }
        let pair_start = cursor;
        let (key_len, key_len_bytes) = mf.uintvar_at(cursor)?;
        let key_offset = cursor + key_len_bytes;
        let key_bytes = mf.bytes_at(key_offset, key_len as usize)?;
        let found = key_bytes == key.as_bytes();
        let value_offset = key_offset + key_len as usize;
        let next_cursor = field_end_offset(mf, value_offset)?;
        if found {
            mf.seek(pair_start);
            mf.inplace_remove(next_cursor - pair_start)?;
            return Ok(true);
        }
        cursor = next_cursor;
    }
}

/// Skip past a field (scalar, string/binary, or whole container) at
/// `marker_offset` and delete those bytes in place. Shared by
/// `remove_from_array_or_root`/`remove_from_object`/pack's padding trim.
fn field_remove(mf: &mut MemFile, marker_offset: usize) -> Result<(), CarbonError> {
    let end = field_end_offset(mf, marker_offset)?;
    mf.seek(marker_offset);
    mf.inplace_remove(end - marker_offset)
}

fn column_remove(mf: &mut MemFile, column_begin: usize, index: usize) -> Result<bool, CarbonError> {
    let (num_elems, capacity, scalar, payload_offset, num_elems_offset) = {
        let it = ColumnIter::at(mf, column_begin)?;
        if index >= it.len() {
            return Ok(false);
        }
        let payload_offset = it.end_offset() - it.capacity() * it.scalar().element_size();
        let num_elems_offset = column_begin + 1;
        (it.len(), it.capacity(), it.scalar(), payload_offset, num_elems_offset)
    };
    let size = scalar.element_size();
    let at = payload_offset + index * size;
    mf.seek(at);
    mf.inplace_remove(size)?;
    // Re-append one sentinel-filled slot at the tail so `capacity` (the
    // reserved span) stays unchanged; only `num_elems` shrinks.
    mf.seek(payload_offset + (capacity - 1) * size);
    mf.inplace_insert(size)?;

    mf.seek(num_elems_offset);
    mf.update_uintvar((num_elems - 1) as u64)?;
    Ok(true)
}

/// Collect `(kind, marker_offset)` for every element of the array at
/// `begin_offset`, fully materialized before any recursive packing so the
/// read-only iterator's borrow of `mf` is released first (packing a child
/// needs `&mut MemFile`, which cannot coexist with a live iterator over it).
fn collect_array_children(
    mf: &MemFile,
    begin_offset: usize,
) -> Result<Vec<(FieldKind, usize)>, CarbonError> {
    let mut it = ArrayIter::at(mf, begin_offset)?;
    let mut out = Vec::new();
    while let Some(field) = it.next()? {
        out.push((field.kind, field.marker_offset));
    }
    Ok(out)
}

fn collect_object_children(
    mf: &MemFile,
    begin_offset: usize,
) -> Result<Vec<(FieldKind, usize)>, CarbonError> {
    let mut it = ObjectIter::at(mf, begin_offset)?;
    let mut out = Vec::new();
    while let Some(entry) = it.next()? {
        out.push((entry.value.kind, entry.value.marker_offset));
    }
    Ok(out)
}

fn pack_child(mf: &mut MemFile, kind: FieldKind, offset: usize) -> Result<(), CarbonError> {
    match kind {
        FieldKind::ArrayBegin => pack_array(mf, offset),
        FieldKind::ObjectBegin => pack_object(mf, offset),
        FieldKind::Column(_) => pack_column(mf, offset),
        _ => Ok(()),
    }
}

fn pack_array(mf: &mut MemFile, begin_offset: usize) -> Result<(), CarbonError> {
    let mut last_end = begin_offset + 1;
    {
        let mut it = ArrayIter::at(mf, begin_offset)?;
        while let Some(field) = it.next()? {
            last_end = field_end_offset(mf, field.marker_offset)?;
        }
    }
    let end_marker_offset = find_array_end_marker(mf, last_end)?;
    if end_marker_offset > last_end {
        mf.seek(last_end);
        mf.inplace_remove(end_marker_offset - last_end)?;
    }

    let num_children = collect_array_children(mf, begin_offset)?.len();
    for i in 0..num_children {
        // Packing a sibling can shift every byte after it, so a `children`
        // snapshot taken before the loop started would be stale by the time
        // we get here; re-resolve offsets fresh before each child.
        let (kind, offset) = collect_array_children(mf, begin_offset)?[i];
        pack_child(mf, kind, offset)?;
    }
    Ok(())
}

fn pack_object(mf: &mut MemFile, begin_offset: usize) -> Result<(), CarbonError> {
    let mut last_end = begin_offset + 1;
    {
        let mut it = ObjectIter::at(mf, begin_offset)?;
        while let Some(entry) = it.next()? {
            last_end = field_end_offset(mf, entry.value.marker_offset)?;
        }
    }
    let end_marker_offset = find_object_end_marker(mf, last_end)?;
    if end_marker_offset > last_end {
        mf.seek(last_end);
        mf.inplace_remove(end_marker_offset - last_end)?;
    }

    let num_children = collect_object_children(mf, begin_offset)?.len();
    for i in 0..num_children {
        // Same staleness hazard as `pack_array`: re-resolve before each child.
        let (kind, offset) = collect_object_children(mf, begin_offset)?[i];
        pack_child(mf, kind, offset)?;
    }
    Ok(())
}

fn pack_column(mf: &mut MemFile, begin_offset: usize) -> Result<(), CarbonError> {
    let (num_elems, capacity, element_size, payload_offset) = {
        let it = ColumnIter::at(mf, begin_offset)?;
        let payload_offset = it.end_offset() - it.capacity() * it.scalar().element_size();
        (it.len(), it.capacity(), it.scalar().element_size(), payload_offset)
    };
    if capacity == num_elems {
        return Ok(());
    }
    let free = (capacity - num_elems) * element_size;
    mf.seek(payload_offset + num_elems * element_size);
    mf.inplace_remove(free)?;

    let capacity_offset = begin_offset + 1 + MemFile::uintvar_len(num_elems as u64);
    mf.seek(capacity_offset);
    mf.update_uintvar(num_elems as u64)?;
    Ok(())
}

fn find_array_end_marker(mf: &MemFile, mut offset: usize) -> Result<usize, CarbonError> {
    loop {
        let b = mf.byte_at(offset)?;
        if b == crate::types::marker::ARRAY_END {
            return Ok(offset);
        }
        if b != 0 {
            return Err(CarbonError::Corrupted(format!(
                "non-zero, non-end byte 0x{b:02x} between last array element and end marker at offset {offset}"
            )));
        }
        offset += 1;
    }
}

fn find_object_end_marker(mf: &MemFile, mut offset: usize) -> Result<usize, CarbonError> {
    loop {
        let b = mf.byte_at(offset)?;
        if b == crate::types::marker::OBJECT_END {
            return Ok(offset);
        }
        if b != 0 {
            return Err(CarbonError::Corrupted(format!(
                "non-zero, non-end byte 0x{b:02x} between last object entry and end marker at offset {offset}"
            )));
        }
        offset += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json;
    use crate::key::KeyKind;
    use crate::options::CarbonOptions;
    use serde_json::json as jsonv;

    fn make_record(value: serde_json::Value, key: KeyHeader) -> MemFile {
        json::from_json(&value, &key, CarbonOptions::default()).unwrap()
    }

    #[test]
    fn commit_hash_changes_after_end() {
        let original = make_record(
            jsonv!({"a": 1}),
            KeyHeader {
                kind: KeyKind::UKey,
                value: KeyValue::Unsigned(7),
                commit_hash: Some(0),
            },
        );
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &original).unwrap();
        revision.key_set_unsigned(7).unwrap();
        revision.remove("0.a").ok();
        let sealed = revision.end().unwrap();

        let mut mf = sealed;
        mf.seek(0);
        let header = KeyHeader::read(&mut mf).unwrap();
        assert_ne!(header.commit_hash, Some(0));
    }

    #[test]
    fn try_begin_fails_while_locked() {
        let original = make_record(jsonv!([1, 2, 3]), KeyHeader::none());
        let guard = RevisionGuard::new_latest();
        let first = Revision::try_begin(&guard, &original).unwrap();
        assert!(first.is_some());
        let second = Revision::try_begin(&guard, &original).unwrap();
        assert!(second.is_none());
        first.unwrap().abort();
        let third = Revision::try_begin(&guard, &original).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn remove_resolves_dot_path_against_the_implicit_root_wrapped_value() {
        // `from_json({"a":[1,2,3]})` wraps the object as the root array's
        // single element, but the dot-path "a.1" never mentions that
        // implicit index.
        let original = make_record(jsonv!({"a": [1, 2, 3]}), KeyHeader::none());
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &original).unwrap();
        assert!(revision.remove("a.1").unwrap());
        let sealed = revision.end().unwrap();

        let value = json::to_json_compact(&sealed).unwrap();
        assert_eq!(value, jsonv!({"a": [1, 3]}));
    }

    #[test]
    fn remove_resolves_bare_key_against_the_implicit_root_wrapped_object() {
        let original = make_record(jsonv!({"msg": "hi", "n": 1}), KeyHeader::none());
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &original).unwrap();
        assert!(revision.remove("msg").unwrap());
        let sealed = revision.end().unwrap();

        assert_eq!(json::to_json_compact(&sealed).unwrap(), jsonv!({"n": 1}));
    }

    #[test]
    fn column_overwrite_replaces_a_cell_in_place() {
        let original = make_record(jsonv!({"a": [1, 2, 3]}), KeyHeader::none());
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &original).unwrap();
        assert!(revision
            .column_overwrite("a", 1, crate::iter::ColumnCell::U8(99))
            .unwrap());
        let sealed = revision.end().unwrap();

        assert_eq!(json::to_json_compact(&sealed).unwrap(), jsonv!({"a": [1, 99, 3]}));
    }

    #[test]
    fn column_overwrite_rejects_mismatched_cell_type() {
        let original = make_record(jsonv!({"a": [1, 2, 3]}), KeyHeader::none());
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &original).unwrap();
        let err = revision
            .column_overwrite("a", 1, crate::iter::ColumnCell::I32(99))
            .unwrap_err();
        assert!(matches!(err, CarbonError::TypeMismatch { .. }));
    }

    #[test]
    fn pack_handles_multiple_sibling_nested_containers() {
        // Each nested object gets its own capacity-hint padding from
        // `CarbonOptions::default()`, so packing "a" shifts every byte after
        // it before "b" is ever visited. A child offset collected before any
        // sibling was packed would point past "b"'s real marker by the time
        // it is used.
        let original = make_record(
            jsonv!({"a": {"x": 1, "y": 2}, "b": {"z": 3}, "c": [1, 2, 3]}),
            KeyHeader::none(),
        );
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &original).unwrap();
        revision.pack().unwrap();
        let sealed = revision.end().unwrap();

        assert_eq!(
            json::to_json_compact(&sealed).unwrap(),
            jsonv!({"a": {"x": 1, "y": 2}, "b": {"z": 3}, "c": [1, 2, 3]})
        );
    }

    #[test]
    fn abort_leaves_original_latest() {
        let original = make_record(jsonv!({"a": 1}), KeyHeader::none());
        let guard = RevisionGuard::new_latest();
        let revision = Revision::begin(&guard, &original).unwrap();
        revision.abort();
        assert!(guard.is_latest());
    }
}
