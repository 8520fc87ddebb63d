//! `carbon`: a self-describing, mutable, columnar-aware binary document
//! format for JSON-equivalent data.
//!
//! A [`Record`] owns one document: a key header (optionally a primary key
//! plus a commit hash) followed by a root array body. Build one from JSON
//! with [`Record::from_json`], or from scratch with [`Record::create_begin`]
//! and the [`InsertSession`] it hands back. Read it back out with
//! [`Record::to_json_compact`] or by walking [`iter::ArrayIter`]/
//! [`iter::ObjectIter`]/[`iter::ColumnIter`] directly. Mutate it in place
//! through [`Record::revise_begin`], which returns a [`revise::Revision`].

#![warn(missing_docs)]

mod error;
mod field;
mod insert;
pub mod iter;
mod json;
mod key;
mod memory;
mod mime;
mod options;
mod record;
mod revise;
mod types;

pub use error::CarbonError;
pub use field::FieldAccess;
pub use insert::InsertSession;
pub use iter::ColumnCell;
pub use key::{KeyHeader, KeyKind, KeyValue};
pub use memory::MemFile;
pub use options::{CarbonOptions, Mode};
pub use record::{Record, RecordBuilder};
pub use revise::{Revision, RevisionGuard};
pub use types::{ColumnScalar, Derivation, FieldKind};
