//! The zero-copy iterator family: forward cursors over array, object and
//! column containers. All three borrow a `&MemFile` read-only and track
//! their own position rather than sharing the buffer's cursor (Design Note
//! "Self-referential MemFile cursors").

pub mod array;
pub mod column;
pub mod object;

pub use array::ArrayIter;
pub use column::{ColumnCell, ColumnIter, ColumnValue};
pub use object::{ObjectEntry, ObjectIter};
