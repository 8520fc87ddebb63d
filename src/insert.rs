//! The insertion engine: appends typed values into open array, object and
//! column containers while maintaining the capacity/shift invariants
//! described in the format spec's §4.4.
//!
//! An [`InsertSession`] owns the [`MemFile`] being built and a stack of
//! open [`Frame`]s (one per nested container currently under
//! construction). Closing a frame reconciles whatever it grew by back
//! into its parent — the only place in the crate the "capacity grows by
//! pushing the end marker rightward" contract actually runs.

use crate::error::CarbonError;
use crate::key::KeyHeader;
use crate::memory::MemFile;
use crate::mime;
use crate::options::CarbonOptions;
use crate::types::{marker, with_derivation, ColumnScalar, Derivation};

/// What a [`Frame`] is currently appending into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Array,
    Object,
    Column(ColumnScalar),
}

/// Bookkeeping for one open container on the insertion stack.
#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    derivation: Derivation,
    is_root: bool,
    begin_offset: usize,
    /// Bytes this container occupied (including begin/end markers or
    /// column header) the moment it was opened — used to compute how much
    /// it grew when it is closed.
    initial_total_len: usize,

    // array/object bookkeeping
    write_pos: usize,
    end_marker_offset: usize,

    // column bookkeeping
    num_elems: usize,
    capacity: usize,
    num_elems_offset: usize,
    capacity_offset: usize,
    payload_offset: usize,
}

impl Frame {
    fn element_size(&self) -> usize {
        match self.kind {
            FrameKind::Column(s) => s.element_size(),
            _ => 0,
        }
    }

    fn current_total_len(&self) -> usize {
        match self.kind {
            FrameKind::Column(_) => {
                self.payload_offset + self.capacity * self.element_size() - self.begin_offset
            }
            FrameKind::Array | FrameKind::Object => self.end_marker_offset + 1 - self.begin_offset,
        }
    }
}

/// A live insertion session building up a fresh [`MemFile`] (used by
/// [`crate::Record::create_begin`]) or appending to a cloned one (used by
/// the revision protocol's mutating operations).
pub struct InsertSession {
    pub mf: MemFile,
    stack: Vec<Frame>,
    options: CarbonOptions,
}

impl InsertSession {
    /// Start a new session: writes `key_header`, then opens the root array
    /// (which, per the wire format, has no end marker — its body spans to
    /// end-of-buffer).
    pub fn new(
        key_header: &KeyHeader,
        root_derivation: Derivation,
        options: CarbonOptions,
    ) -> Result<Self, CarbonError> {
        let mut mf = MemFile::with_capacity(options.default_capacity_hint + 32);
        key_header.write(&mut mf)?;
        let root_begin = mf.tell();
        mf.write(&[with_derivation(marker::ARRAY_BEGIN, root_derivation)])?;

        let root = Frame {
            kind: FrameKind::Array,
            derivation: root_derivation,
            is_root: true,
            begin_offset: root_begin,
            initial_total_len: 1,
            write_pos: mf.tell(),
            end_marker_offset: usize::MAX,
            num_elems: 0,
            capacity: 0,
            num_elems_offset: 0,
            capacity_offset: 0,
            payload_offset: 0,
        };

        Ok(Self {
            mf,
            stack: vec![root],
            options,
        })
    }

    /// Offset of the root array's begin marker (always right after the key
    /// header).
    #[must_use]
    pub fn root_begin_offset(&self) -> usize {
        self.stack[0].begin_offset
    }

    fn top(&mut self) -> &mut Frame {
        self.stack.last_mut().expect("insertion stack is never empty")
    }

    /// Reserve `needed` bytes at the current frame's write position,
    /// growing the buffer in place if the frame's reserved capacity is
    /// exhausted (or simply appending, for the root). Returns the offset
    /// the caller should write at.
    fn make_room(&mut self, needed: usize) -> Result<usize, CarbonError> {
        let frame = *self.top();
        if frame.is_root {
            let at = self.mf.len();
            return Ok(at);
        }
        let available = frame.end_marker_offset - frame.write_pos;
        if needed > available {
            let grow = needed - available;
            self.mf.seek(frame.end_marker_offset);
            self.mf.inplace_insert(grow)?;
            self.top().end_marker_offset += grow;
        }
        Ok(self.top().write_pos)
    }

    fn write_and_advance(&mut self, at: usize, bytes: &[u8]) -> Result<(), CarbonError> {
        self.mf.seek(at);
        self.mf.write(bytes)?;
        let frame = self.top();
        if frame.is_root {
            frame.write_pos = self.mf.len();
        } else {
            frame.write_pos += bytes.len();
        }
        Ok(())
    }

    fn require_array_or_object(&self, op: &'static str) -> Result<(), CarbonError> {
        match self.stack.last().unwrap().kind {
            FrameKind::Array | FrameKind::Object => Ok(()),
            FrameKind::Column(_) => Err(CarbonError::IllegalOp(format!(
                "{op} is not valid while a column is the open container"
            ))),
        }
    }

    // -- primitive appenders (array elements) ------------------------------

    pub fn insert_null(&mut self) -> Result<(), CarbonError> {
        self.append_field(&[marker::NULL])
    }

    pub fn insert_true(&mut self) -> Result<(), CarbonError> {
        self.append_field(&[marker::TRUE])
    }

    pub fn insert_false(&mut self) -> Result<(), CarbonError> {
        self.append_field(&[marker::FALSE])
    }

    pub fn insert_bool(&mut self, value: bool) -> Result<(), CarbonError> {
        if value {
            self.insert_true()
        } else {
            self.insert_false()
        }
    }

    pub fn insert_u8(&mut self, value: u8) -> Result<(), CarbonError> {
        self.insert_scalar(marker::U8, &value.to_le_bytes())
    }
    pub fn insert_u16(&mut self, value: u16) -> Result<(), CarbonError> {
        self.insert_scalar(marker::U16, &value.to_le_bytes())
    }
    pub fn insert_u32(&mut self, value: u32) -> Result<(), CarbonError> {
        self.insert_scalar(marker::U32, &value.to_le_bytes())
    }
    pub fn insert_u64(&mut self, value: u64) -> Result<(), CarbonError> {
        self.insert_scalar(marker::U64, &value.to_le_bytes())
    }
    pub fn insert_i8(&mut self, value: i8) -> Result<(), CarbonError> {
        self.insert_scalar(marker::I8, &value.to_le_bytes())
    }
    pub fn insert_i16(&mut self, value: i16) -> Result<(), CarbonError> {
        self.insert_scalar(marker::I16, &value.to_le_bytes())
    }
    pub fn insert_i32(&mut self, value: i32) -> Result<(), CarbonError> {
        self.insert_scalar(marker::I32, &value.to_le_bytes())
    }
    pub fn insert_i64(&mut self, value: i64) -> Result<(), CarbonError> {
        self.insert_scalar(marker::I64, &value.to_le_bytes())
    }
    pub fn insert_float(&mut self, value: f32) -> Result<(), CarbonError> {
        self.insert_scalar(marker::FLOAT, &value.to_le_bytes())
    }

    /// Smallest unsigned scalar type that losslessly holds `value`.
    pub fn insert_unsigned(&mut self, value: u64) -> Result<(), CarbonError> {
        if let Ok(v) = u8::try_from(value) {
            self.insert_u8(v)
        } else if let Ok(v) = u16::try_from(value) {
            self.insert_u16(v)
        } else if let Ok(v) = u32::try_from(value) {
            self.insert_u32(v)
        } else {
            self.insert_u64(value)
        }
    }

    /// Smallest signed scalar type that losslessly holds `value`.
    pub fn insert_signed(&mut self, value: i64) -> Result<(), CarbonError> {
        if let Ok(v) = i8::try_from(value) {
            self.insert_i8(v)
        } else if let Ok(v) = i16::try_from(value) {
            self.insert_i16(v)
        } else if let Ok(v) = i32::try_from(value) {
            self.insert_i32(v)
        } else {
            self.insert_i64(value)
        }
    }

    fn insert_scalar(&mut self, marker: u8, payload: &[u8]) -> Result<(), CarbonError> {
        let mut field = Vec::with_capacity(1 + payload.len());
        field.push(marker);
        field.extend_from_slice(payload);
        self.append_field(&field)
    }

    pub fn insert_string(&mut self, value: &str) -> Result<(), CarbonError> {
        let field = encode_string_field(value);
        self.append_field(&field)
    }

    /// Insert binary `bytes` tagged with a mime type resolved (in order)
    /// from `file_ext`, else `mime_name`, else `application/octet-stream`.
    pub fn insert_binary(
        &mut self,
        bytes: &[u8],
        file_ext: Option<&str>,
        mime_name: Option<&str>,
    ) -> Result<(), CarbonError> {
        let field = encode_binary_field(bytes, file_ext, mime_name);
        self.append_field(&field)
    }

    fn append_field(&mut self, field: &[u8]) -> Result<(), CarbonError> {
        match self.stack.last().unwrap().kind {
            FrameKind::Array | FrameKind::Object => {
                let at = self.make_room(field.len())?;
                self.write_and_advance(at, field)
            }
            FrameKind::Column(scalar) => self.column_append_raw(scalar, field),
        }
    }

    // -- object key-prefixed variants ---------------------------------------

    pub fn insert_prop_null(&mut self, key: &str) -> Result<(), CarbonError> {
        self.insert_prop_raw(key, &[marker::NULL])
    }
    pub fn insert_prop_true(&mut self, key: &str) -> Result<(), CarbonError> {
        self.insert_prop_raw(key, &[marker::TRUE])
    }
    pub fn insert_prop_false(&mut self, key: &str) -> Result<(), CarbonError> {
        self.insert_prop_raw(key, &[marker::FALSE])
    }
    pub fn insert_prop_bool(&mut self, key: &str, value: bool) -> Result<(), CarbonError> {
        if value {
            self.insert_prop_true(key)
        } else {
            self.insert_prop_false(key)
        }
    }
    pub fn insert_prop_u8(&mut self, key: &str, value: u8) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::U8, &value.to_le_bytes())
    }
    pub fn insert_prop_u16(&mut self, key: &str, value: u16) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::U16, &value.to_le_bytes())
    }
    pub fn insert_prop_u32(&mut self, key: &str, value: u32) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::U32, &value.to_le_bytes())
    }
    pub fn insert_prop_u64(&mut self, key: &str, value: u64) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::U64, &value.to_le_bytes())
    }
    pub fn insert_prop_i8(&mut self, key: &str, value: i8) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::I8, &value.to_le_bytes())
    }
    pub fn insert_prop_i16(&mut self, key: &str, value: i16) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::I16, &value.to_le_bytes())
    }
    pub fn insert_prop_i32(&mut self, key: &str, value: i32) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::I32, &value.to_le_bytes())
    }
    pub fn insert_prop_i64(&mut self, key: &str, value: i64) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::I64, &value.to_le_bytes())
    }
    pub fn insert_prop_float(&mut self, key: &str, value: f32) -> Result<(), CarbonError> {
        self.insert_prop_scalar(key, marker::FLOAT, &value.to_le_bytes())
    }
    pub fn insert_prop_unsigned(&mut self, key: &str, value: u64) -> Result<(), CarbonError> {
        if let Ok(v) = u8::try_from(value) {
            self.insert_prop_u8(key, v)
        } else if let Ok(v) = u16::try_from(value) {
            self.insert_prop_u16(key, v)
        } else if let Ok(v) = u32::try_from(value) {
            self.insert_prop_u32(key, v)
        } else {
            self.insert_prop_u64(key, value)
        }
    }
    pub fn insert_prop_signed(&mut self, key: &str, value: i64) -> Result<(), CarbonError> {
        if let Ok(v) = i8::try_from(value) {
            self.insert_prop_i8(key, v)
        } else if let Ok(v) = i16::try_from(value) {
            self.insert_prop_i16(key, v)
        } else if let Ok(v) = i32::try_from(value) {
            self.insert_prop_i32(key, v)
        } else {
            self.insert_prop_i64(key, value)
        }
    }

    pub fn insert_prop_string(&mut self, key: &str, value: &str) -> Result<(), CarbonError> {
        let field = encode_string_field(value);
        self.insert_prop_raw(key, &field)
    }

    pub fn insert_prop_binary(
        &mut self,
        key: &str,
        bytes: &[u8],
        file_ext: Option<&str>,
        mime_name: Option<&str>,
    ) -> Result<(), CarbonError> {
        let field = encode_binary_field(bytes, file_ext, mime_name);
        self.insert_prop_raw(key, &field)
    }

    fn insert_prop_scalar(
        &mut self,
        key: &str,
        marker: u8,
        payload: &[u8],
    ) -> Result<(), CarbonError> {
        let mut field = Vec::with_capacity(1 + payload.len());
        field.push(marker);
        field.extend_from_slice(payload);
        self.insert_prop_raw(key, &field)
    }

    fn insert_prop_raw(&mut self, key: &str, value_field: &[u8]) -> Result<(), CarbonError> {
        self.require_array_or_object("insert_prop_*")?;
        let mut pair = encode_key(key);
        pair.extend_from_slice(value_field);
        let at = self.make_room(pair.len())?;
        self.write_and_advance(at, &pair)
    }

    // -- container open/close ----------------------------------------------

    /// Open a nested array as the next array element (or, inside an
    /// object, call [`Self::begin_prop_array`] instead).
    pub fn begin_array(&mut self, capacity_hint: Option<usize>) -> Result<(), CarbonError> {
        self.require_array_or_object("begin_array")?;
        let hint = capacity_hint.unwrap_or(self.options.default_capacity_hint);
        let at = self.make_room(2 + hint)?;
        self.push_container_frame(at, FrameKind::Array, Derivation::UnsortedMulti, hint)
    }

    pub fn begin_object(&mut self, capacity_hint: Option<usize>) -> Result<(), CarbonError> {
        self.require_array_or_object("begin_object")?;
        let hint = capacity_hint.unwrap_or(self.options.default_capacity_hint);
        let at = self.make_room(2 + hint)?;
        self.push_container_frame(at, FrameKind::Object, Derivation::UnsortedMulti, hint)
    }

    pub fn begin_column(
        &mut self,
        scalar: ColumnScalar,
        capacity_hint: usize,
    ) -> Result<(), CarbonError> {
        self.require_array_or_object("begin_column")?;
        let header_len = 1
            + MemFile::uintvar_len(0)
            + MemFile::uintvar_len(capacity_hint as u64)
            + capacity_hint * scalar.element_size();
        let at = self.make_room(header_len)?;
        self.push_column_frame(at, scalar, capacity_hint)
    }

    pub fn begin_prop_array(
        &mut self,
        key: &str,
        capacity_hint: Option<usize>,
    ) -> Result<(), CarbonError> {
        self.require_array_or_object("begin_prop_array")?;
        let hint = capacity_hint.unwrap_or(self.options.default_capacity_hint);
        let key_bytes = encode_key(key);
        let at = self.make_room(key_bytes.len() + 2 + hint)?;
        self.write_and_advance(at, &key_bytes)?;
        let container_at = self.top().write_pos;
        self.push_container_frame(container_at, FrameKind::Array, Derivation::UnsortedMulti, hint)
    }

    pub fn begin_prop_object(
        &mut self,
        key: &str,
        capacity_hint: Option<usize>,
    ) -> Result<(), CarbonError> {
        self.require_array_or_object("begin_prop_object")?;
        let hint = capacity_hint.unwrap_or(self.options.default_capacity_hint);
        let key_bytes = encode_key(key);
        let at = self.make_room(key_bytes.len() + 2 + hint)?;
        self.write_and_advance(at, &key_bytes)?;
        let container_at = self.top().write_pos;
        self.push_container_frame(container_at, FrameKind::Object, Derivation::UnsortedMulti, hint)
    }

    pub fn begin_prop_column(
        &mut self,
        key: &str,
        scalar: ColumnScalar,
        capacity_hint: usize,
    ) -> Result<(), CarbonError> {
        self.require_array_or_object("begin_prop_column")?;
        let key_bytes = encode_key(key);
        let header_len = 1
            + MemFile::uintvar_len(0)
            + MemFile::uintvar_len(capacity_hint as u64)
            + capacity_hint * scalar.element_size();
        let at = self.make_room(key_bytes.len() + header_len)?;
        self.write_and_advance(at, &key_bytes)?;
        let container_at = self.top().write_pos;
        self.push_column_frame(container_at, scalar, capacity_hint)
    }

    fn push_container_frame(
        &mut self,
        at: usize,
        kind: FrameKind,
        derivation: Derivation,
        capacity_hint: usize,
    ) -> Result<(), CarbonError> {
        let (begin_m, end_m) = match kind {
            FrameKind::Array => (marker::ARRAY_BEGIN, marker::ARRAY_END),
            FrameKind::Object => (marker::OBJECT_BEGIN, marker::OBJECT_END),
            FrameKind::Column(_) => unreachable!(),
        };
        self.mf.seek(at);
        self.mf.write(&[with_derivation(begin_m, derivation)])?;
        let body_start = self.mf.tell();
        self.mf.write(&vec![0u8; capacity_hint])?;
        let end_marker_offset = self.mf.tell();
        self.mf.write(&[end_m])?;

        let parent_is_root = self.top().is_root;
        if parent_is_root {
            self.top().write_pos = self.mf.len();
        } else {
            self.top().write_pos = end_marker_offset + 1;
        }
        let _ = body_start;

        self.stack.push(Frame {
            kind,
            derivation,
            is_root: false,
            begin_offset: at,
            initial_total_len: end_marker_offset + 1 - at,
            write_pos: at + 1,
            end_marker_offset,
            num_elems: 0,
            capacity: 0,
            num_elems_offset: 0,
            capacity_offset: 0,
            payload_offset: 0,
        });
        Ok(())
    }

    fn push_column_frame(
        &mut self,
        at: usize,
        scalar: ColumnScalar,
        capacity_hint: usize,
    ) -> Result<(), CarbonError> {
        self.mf.seek(at);
        self.mf
            .write(&[with_derivation(scalar.base_marker(), Derivation::UnsortedMulti)])?;
        let num_elems_offset = self.mf.tell();
        self.mf.write_uintvar(0)?;
        let capacity_offset = self.mf.tell();
        self.mf.write_uintvar(capacity_hint as u64)?;
        let payload_offset = self.mf.tell();
        self.mf
            .write(&vec![0u8; capacity_hint * scalar.element_size()])?;
        let end = self.mf.tell();

        let parent_is_root = self.top().is_root;
        if parent_is_root {
            self.top().write_pos = self.mf.len();
        } else {
            self.top().write_pos = end;
        }

        self.stack.push(Frame {
            kind: FrameKind::Column(scalar),
            derivation: Derivation::UnsortedMulti,
            is_root: false,
            begin_offset: at,
            initial_total_len: end - at,
            write_pos: payload_offset,
            end_marker_offset: end,
            num_elems: 0,
            capacity: capacity_hint,
            num_elems_offset,
            capacity_offset,
            payload_offset,
        });
        Ok(())
    }

    /// Close the innermost open container, reconciling however much it
    /// grew back into its parent's bookkeeping.
    pub fn end(&mut self) -> Result<(), CarbonError> {
        if self.stack.len() == 1 {
            // Closing the root is a no-op: there is no end marker to seal,
            // its body already spans to end-of-buffer.
            return Ok(());
        }
        let finished = self.stack.pop().unwrap();
        let growth = finished.current_total_len() as isize - finished.initial_total_len as isize;
        let parent = self.top();
        if !parent.is_root {
            parent.end_marker_offset = (parent.end_marker_offset as isize + growth) as usize;
        }
        parent.write_pos = finished.begin_offset + finished.current_total_len();
        Ok(())
    }

    // -- column append --------------------------------------------------

    /// `field` is `[marker, payload...]` as produced for a standalone
    /// scalar. A column stores no per-cell marker, so null and bool cells
    /// need translating into their sentinel/flag byte (Design Note "Column
    /// element sentinels") rather than simply dropping the marker byte.
    fn column_append_raw(&mut self, scalar: ColumnScalar, field: &[u8]) -> Result<(), CarbonError> {
        let cell = match field[0] {
            marker::NULL => crate::iter::column::null_payload(scalar),
            marker::TRUE if scalar == ColumnScalar::Bool => vec![marker::CELL_BOOL_TRUE],
            marker::FALSE if scalar == ColumnScalar::Bool => vec![marker::CELL_BOOL_FALSE],
            m if scalar.standalone_marker() == m => field[1..].to_vec(),
            _ => {
                return Err(CarbonError::TypeMismatch {
                    expected: scalar.label(),
                    found: "mismatched scalar",
                })
            }
        };
        self.column_append_payload(scalar, &cell)
    }

    fn column_append_payload(
        &mut self,
        scalar: ColumnScalar,
        payload: &[u8],
    ) -> Result<(), CarbonError> {
        {
            let frame = self.top();
            if frame.num_elems == frame.capacity {
                self.grow_column(scalar)?;
            }
        }
        let frame = *self.top();
        let elem_size = scalar.element_size();
        let at = frame.payload_offset + frame.num_elems * elem_size;
        self.mf.seek(at);
        self.mf.write(payload)?;
        let frame = self.top();
        frame.num_elems += 1;
        self.mf.seek(frame.num_elems_offset);
        let shift = self.mf.update_uintvar(frame.num_elems as u64)?;
        if shift != 0 {
            self.shift_column_tail(shift);
        }
        Ok(())
    }

    fn grow_column(&mut self, scalar: ColumnScalar) -> Result<(), CarbonError> {
        let elem_size = scalar.element_size();
        let frame = *self.top();
        let new_capacity = (frame.capacity * 2).max(frame.capacity + 1);
        let extra_elems = new_capacity - frame.capacity;
        let tail_offset = frame.payload_offset + frame.capacity * elem_size;
        self.mf.seek(tail_offset);
        self.mf.inplace_insert(extra_elems * elem_size)?;

        self.mf.seek(self.top().capacity_offset);
        let shift = self.mf.update_uintvar(new_capacity as u64)?;
        let frame = self.top();
        frame.capacity = new_capacity;
        frame.payload_offset = (frame.payload_offset as isize + shift) as usize;
        self.shift_column_tail_by_growth(shift + (extra_elems * elem_size) as isize);
        Ok(())
    }

    /// After `update_uintvar` on `num_elems` shifted bytes, fix up
    /// `capacity_offset`/`payload_offset` (everything after `num_elems`).
    fn shift_column_tail(&mut self, shift: isize) {
        let frame = self.top();
        frame.capacity_offset = (frame.capacity_offset as isize + shift) as usize;
        frame.payload_offset = (frame.payload_offset as isize + shift) as usize;
    }

    /// After growing a column's capacity (uintvar width change plus the
    /// freshly inserted payload bytes), nothing further inside this frame
    /// needs fixing — `payload_offset` was already adjusted by the uintvar
    /// shift in `grow_column`; this just documents that the combined delta
    /// is what `end()` will see via `current_total_len()`.
    fn shift_column_tail_by_growth(&mut self, _total_shift: isize) {}

    /// Number of elements in the currently-open column.
    #[must_use]
    pub fn current_column_len(&self) -> usize {
        self.stack.last().unwrap().num_elems
    }

    /// Finish the session, returning the built `MemFile`. All frames but
    /// the root must already be closed.
    pub fn finish(mut self) -> Result<MemFile, CarbonError> {
        if self.stack.len() != 1 {
            return Err(CarbonError::IllegalOp(
                "finish called with unclosed nested containers".into(),
            ));
        }
        self.end()?;
        Ok(self.mf)
    }
}

fn encode_key(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 2);
    write_uintvar_into(&mut out, key.len() as u64);
    out.extend_from_slice(key.as_bytes());
    out
}

fn encode_string_field(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 2);
    out.push(marker::STRING);
    write_uintvar_into(&mut out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
    out
}

/// A known extension wins (`BINARY` + table id); else an explicit mime
/// name is kept verbatim (`BINARY_CUSTOM`); else falls back to
/// `application/octet-stream` (`BINARY` + id 0).
fn encode_binary_field(bytes: &[u8], file_ext: Option<&str>, mime_name: Option<&str>) -> Vec<u8> {
    let known_id = file_ext.map(mime::id_from_extension).filter(|id| *id != mime::OCTET_STREAM_ID);

    if let Some(id) = known_id {
        let mut out = Vec::with_capacity(bytes.len() + 8);
        out.push(marker::BINARY);
        write_uintvar_into(&mut out, id);
        write_uintvar_into(&mut out, bytes.len() as u64);
        out.extend_from_slice(bytes);
        out
    } else if let Some(name) = mime_name.filter(|n| !n.is_empty()) {
        let mut out = Vec::with_capacity(bytes.len() + name.len() + 8);
        out.push(marker::BINARY_CUSTOM);
        write_uintvar_into(&mut out, name.len() as u64);
        out.extend_from_slice(name.as_bytes());
        write_uintvar_into(&mut out, bytes.len() as u64);
        out.extend_from_slice(bytes);
        out
    } else {
        let mut out = Vec::with_capacity(bytes.len() + 8);
        out.push(marker::BINARY);
        write_uintvar_into(&mut out, mime::OCTET_STREAM_ID);
        write_uintvar_into(&mut out, bytes.len() as u64);
        out.extend_from_slice(bytes);
        out
    }
}

fn write_uintvar_into(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Test-only helper used by `field.rs`'s doctest-adjacent unit tests: build
/// a one-off `MemFile` containing just a string field at offset 0.
#[cfg(test)]
pub(crate) struct Inserter;

#[cfg(test)]
impl Inserter {
    pub(crate) fn write_string_field(mf: &mut MemFile, value: &str) -> Result<(), CarbonError> {
        mf.write(&encode_string_field(value))
    }

    pub(crate) fn begin_root_array(
        mf: &mut MemFile,
        _capacity: Option<usize>,
    ) -> Result<RootArrayBuilder, CarbonError> {
        mf.write(&[with_derivation(marker::ARRAY_BEGIN, Derivation::UnsortedMulti)])?;
        Ok(RootArrayBuilder)
    }
}

/// Minimal test-only builder mirroring the shape `iter` unit tests expect;
/// real callers use [`InsertSession`] and [`crate::Record`] instead.
#[cfg(test)]
pub(crate) struct RootArrayBuilder;

#[cfg(test)]
impl RootArrayBuilder {
    pub(crate) fn insert_u8(&mut self, mf: &mut MemFile, value: u8) -> Result<(), CarbonError> {
        mf.write(&[marker::U8])?;
        mf.write(&value.to_le_bytes())
    }

    pub(crate) fn insert_null(&mut self, mf: &mut MemFile) -> Result<(), CarbonError> {
        mf.write(&[marker::NULL])
    }

    pub(crate) fn begin_object(
        &mut self,
        mf: &mut MemFile,
        _capacity: Option<usize>,
    ) -> Result<NestedObjectBuilder, CarbonError> {
        mf.write(&[with_derivation(marker::OBJECT_BEGIN, Derivation::UnsortedMulti)])?;
        Ok(NestedObjectBuilder)
    }

    pub(crate) fn end_nested(
        &mut self,
        mf: &mut MemFile,
        _nested: NestedObjectBuilder,
    ) -> Result<(), CarbonError> {
        mf.write(&[marker::OBJECT_END])
    }

    pub(crate) fn end(&mut self, _mf: &mut MemFile) -> Result<(), CarbonError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) struct NestedObjectBuilder;

#[cfg(test)]
impl NestedObjectBuilder {
    pub(crate) fn insert_prop_string(
        &mut self,
        mf: &mut MemFile,
        key: &str,
        value: &str,
    ) -> Result<(), CarbonError> {
        mf.write(&encode_key(key))?;
        mf.write(&encode_string_field(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyHeader;

    fn new_session() -> InsertSession {
        InsertSession::new(
            &KeyHeader::none(),
            Derivation::UnsortedMulti,
            CarbonOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn root_array_appends_without_reservation() {
        let mut session = new_session();
        session.insert_u8(1).unwrap();
        session.insert_u8(2).unwrap();
        session.insert_u8(3).unwrap();
        let mf = session.finish().unwrap();
        let it = crate::iter::ArrayIter::at(&mf, 0).unwrap();
        assert_eq!(it.count_remaining().unwrap(), 3);
    }

    #[test]
    fn nested_object_inside_array_grows_past_reservation() {
        let mut session = new_session();
        session.begin_object(Some(2)).unwrap();
        for i in 0..20 {
            session
                .insert_prop_string(&format!("k{i}"), "value-value-value")
                .unwrap();
        }
        session.end().unwrap();
        session.insert_u8(9).unwrap();
        let mf = session.finish().unwrap();

        let mut it = crate::iter::ArrayIter::at(&mf, 0).unwrap();
        let obj_field = it.next().unwrap().unwrap();
        let mut obj_it = obj_field.object_value(&mf).unwrap();
        let mut count = 0;
        while obj_it.next().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 20);

        let tail = it.next().unwrap().unwrap();
        assert_eq!(tail.as_u8(&mf).unwrap(), 9);
        assert!(it.next().unwrap().is_none());
    }

    #[test]
    fn column_grows_capacity_on_overflow() {
        let mut session = new_session();
        session.begin_column(ColumnScalar::U8, 2).unwrap();
        for i in 0..10u8 {
            session.insert_u8(i).unwrap();
        }
        session.end().unwrap();
        let mf = session.finish().unwrap();

        let mut it = crate::iter::ArrayIter::at(&mf, 0).unwrap();
        let col_field = it.next().unwrap().unwrap();
        let col = col_field.column_value(&mf).unwrap();
        assert_eq!(col.len(), 10);
        for i in 0..10u8 {
            assert_eq!(col.get(i as usize).unwrap().as_u8(), Some(i));
        }
    }
}
