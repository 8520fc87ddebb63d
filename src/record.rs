//! [`Record`]: the public entry point tying [`MemFile`], [`KeyHeader`],
//! the insertion engine, JSON import/export, and the revision protocol
//! together into one owned, self-describing document.

use crate::error::CarbonError;
use crate::insert::InsertSession;
use crate::json;
use crate::key::{KeyHeader, KeyKind, KeyValue};
use crate::memory::MemFile;
use crate::options::{CarbonOptions, Mode};
use crate::revise::{commit_hash_of, Revision, RevisionGuard};
use crate::types::Derivation;

/// A fresh record under construction, handed back by [`Record::create_begin`].
/// Open containers via [`Self::session`], then seal with [`Self::create_end`].
pub struct RecordBuilder {
    session: InsertSession,
    mode: Mode,
}

impl RecordBuilder {
    /// The open insertion session — append root-level values through it.
    pub fn session(&mut self) -> &mut InsertSession {
        &mut self.session
    }

    /// Seal the builder into an immutable, revisable [`Record`].
    ///
    /// # Errors
    /// Propagates any error from the still-open insertion session (e.g. an
    /// unclosed nested container) or, in [`Mode::Optimize`], from packing.
    #[tracing::instrument(skip(self))]
    pub fn create_end(self) -> Result<Record, CarbonError> {
        let mut mf = self.session.finish()?;
        mf.seek(0);
        let mut key_header = KeyHeader::read(&mut mf)?;

        if key_header.kind.has_commit_hash() {
            let root_offset = key_header.encoded_len();
            let hash = commit_hash_of(mf.bytes_at(root_offset, mf.len() - root_offset)?);
            key_header.commit_hash = Some(hash);
            mf.seek(0);
            key_header.write(&mut mf)?;
        }

        let mut record = Record {
            mf,
            guard: RevisionGuard::new_latest(),
        };
        if self.mode == Mode::Optimize {
            record.optimize_in_place()?;
        }
        tracing::info!(kind = ?key_header.kind, "record created");
        Ok(record)
    }
}

/// An owned, self-describing Carbon document: a key header plus a root
/// array body. Immutable once built — mutation happens through a
/// [`Revision`] obtained from [`Self::revise_begin`]/[`Self::revise_try_begin`],
/// which hands back a brand new `Record` on [`Revision::end`].
pub struct Record {
    mf: MemFile,
    guard: RevisionGuard,
}

impl Record {
    /// Start building a record with no primary key and no commit hash.
    #[must_use]
    pub fn create_begin_unkeyed(options: CarbonOptions, mode: Mode) -> RecordBuilder {
        Self::create_begin(KeyHeader::none(), options, mode)
    }

    /// Start building a record with the given key header.
    ///
    /// # Panics
    /// Never — construction of the in-memory key header cannot fail; only
    /// [`RecordBuilder::create_end`] can return an error.
    #[must_use]
    pub fn create_begin(key_header: KeyHeader, options: CarbonOptions, mode: Mode) -> RecordBuilder {
        let session = InsertSession::new(&key_header, Derivation::UnsortedMulti, options)
            .expect("writing a fresh key header can't fail");
        RecordBuilder { session, mode }
    }

    /// Import a JSON document as a new record. The top-level value (object,
    /// array, or scalar) becomes the root array's single wrapped element.
    /// In [`Mode::Optimize`], the record is packed and shrunk before its
    /// commit hash is computed, same as `create_end`.
    ///
    /// # Errors
    /// [`CarbonError::UnsupportedType`] if the document contains a JSON type
    /// this format cannot represent (there are none at present — every
    /// `serde_json::Value` variant maps onto a Carbon field).
    pub fn from_json(
        value: &serde_json::Value,
        key_header: KeyHeader,
        options: CarbonOptions,
        mode: Mode,
    ) -> Result<Self, CarbonError> {
        let mf = json::from_json(value, &key_header, options)?;
        let mut record = Self {
            mf,
            guard: RevisionGuard::new_latest(),
        };
        if mode == Mode::Optimize {
            record.optimize_in_place()?;
        }
        record.seal_commit_hash(&key_header)?;
        Ok(record)
    }

    /// Recompute and write the commit hash over the current payload, if
    /// `key_header`'s kind carries one. Shared by `from_json` and
    /// `optimize_in_place`'s caller so the hash is always taken over the
    /// final (possibly packed) bytes, never a pre-pack snapshot.
    fn seal_commit_hash(&mut self, key_header: &KeyHeader) -> Result<(), CarbonError> {
        if !key_header.kind.has_commit_hash() {
            return Ok(());
        }
        let root_offset = key_header.encoded_len();
        let hash = commit_hash_of(self.mf.bytes_at(root_offset, self.mf.len() - root_offset)?);
        let mut sealed = key_header.clone();
        sealed.commit_hash = Some(hash);
        self.mf.seek(0);
        sealed.write(&mut self.mf)
    }

    /// Export this record's root element back to a `serde_json::Value`.
    ///
    /// # Errors
    /// [`CarbonError::UnsupportedType`] if the record contains a binary
    /// field, which has no JSON representation.
    pub fn to_json_compact(&self) -> Result<serde_json::Value, CarbonError> {
        json::to_json_compact(&self.mf)
    }

    /// Raw on-wire bytes (key header followed by the root array body).
    #[must_use]
    pub fn raw_data(&self) -> &[u8] {
        self.mf.as_slice()
    }

    /// Wrap a previously-serialized byte buffer back into a `Record`.
    ///
    /// # Errors
    /// Propagates any error reading the key header (e.g. corrupted or
    /// truncated input).
    pub fn from_raw(bytes: Vec<u8>) -> Result<Self, CarbonError> {
        let mut mf = MemFile::from_vec(bytes);
        let _ = KeyHeader::read(&mut mf)?;
        Ok(Self {
            mf,
            guard: RevisionGuard::new_latest(),
        })
    }

    fn key_header(&self) -> Result<KeyHeader, CarbonError> {
        let mut mf = self.mf.clone();
        mf.seek(0);
        KeyHeader::read(&mut mf)
    }

    /// This record's key kind.
    pub fn key_kind(&self) -> Result<KeyKind, CarbonError> {
        Ok(self.key_header()?.kind)
    }

    /// This record's key value, if it carries one.
    pub fn key_value(&self) -> Result<KeyValue, CarbonError> {
        Ok(self.key_header()?.value)
    }

    /// The commit hash recorded the last time this record was sealed
    /// (`create_end` or a successful `revise_end`), if its key kind carries
    /// one.
    pub fn commit_hash(&self) -> Result<Option<u64>, CarbonError> {
        Ok(self.key_header()?.commit_hash)
    }

    /// `true` if no newer revision has superseded this record.
    #[must_use]
    pub fn is_latest(&self) -> bool {
        self.guard.is_latest()
    }

    /// Clone this record's bytes into an independent copy with its own
    /// fresh revision guard (it does not share latest/outdated state with
    /// the original).
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            mf: self.mf.clone(),
            guard: RevisionGuard::new_latest(),
        }
    }

    /// Begin revising this record, blocking (spin-then-yield) until any
    /// concurrent revision finishes.
    ///
    /// # Errors
    /// [`CarbonError::Outdated`] if a previous revision of this record has
    /// already been sealed.
    pub fn revise_begin(&self) -> Result<Revision<'_>, CarbonError> {
        Revision::begin(&self.guard, &self.mf)
    }

    /// Non-blocking variant of [`Self::revise_begin`]: `Ok(None)` if another
    /// revision currently holds the write lock.
    pub fn revise_try_begin(&self) -> Result<Option<Revision<'_>>, CarbonError> {
        Revision::try_begin(&self.guard, &self.mf)
    }

    /// Install the bytes produced by [`Revision::end`] as this record's new
    /// content. Callers typically replace their `Record` binding outright
    /// with a fresh `Record::from_raw(sealed.into_vec())` instead; this
    /// method exists for callers that want to keep reusing the same
    /// allocation/guard in place (e.g. [`RecordBuilder::create_end`]'s
    /// `Mode::Optimize` path).
    fn optimize_in_place(&mut self) -> Result<(), CarbonError> {
        let guard = RevisionGuard::new_latest();
        let mut revision = Revision::begin(&guard, &self.mf)?;
        revision.pack()?;
        revision.shrink()?;
        let sealed = revision.end()?;
        self.mf = sealed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_begin_end_round_trips_through_the_session() {
        let mut builder = Record::create_begin_unkeyed(CarbonOptions::default(), Mode::Default);
        builder.session().insert_u8(7).unwrap();
        builder.session().insert_string("hi").unwrap();
        let record = builder.create_end().unwrap();

        let value = record.to_json_compact().unwrap();
        assert_eq!(value, json!([7, "hi"]));
    }

    #[test]
    fn from_json_to_json_round_trips_an_object() {
        let value = json!({"name": "ok", "count": 3});
        let record = Record::from_json(&value, KeyHeader::none(), CarbonOptions::default(), Mode::Default).unwrap();
        assert_eq!(record.to_json_compact().unwrap(), value);
    }

    #[test]
    fn keyed_record_carries_a_commit_hash() {
        let key = KeyHeader {
            kind: KeyKind::UKey,
            value: KeyValue::Unsigned(42),
            commit_hash: Some(0),
        };
        let record = Record::from_json(&json!([1, 2, 3]), key, CarbonOptions::default(), Mode::Default).unwrap();
        assert_eq!(record.key_value().unwrap(), KeyValue::Unsigned(42));
        // The placeholder `Some(0)` passed into the key header must have
        // been replaced by a hash of the actual payload, not carried through
        // verbatim.
        assert_ne!(record.commit_hash().unwrap(), Some(0));
    }

    #[test]
    fn revise_and_end_produces_a_record_that_is_no_longer_latest_on_the_original() {
        let record = Record::from_json(&json!({"a": 1}), KeyHeader::none(), CarbonOptions::default(), Mode::Default)
            .unwrap();
        let revision = record.revise_begin().unwrap();
        let sealed = revision.end().unwrap();
        assert!(!record.is_latest());

        let revised = Record::from_raw(sealed.into_vec()).unwrap();
        assert_eq!(revised.to_json_compact().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn optimize_mode_packs_and_shrinks_on_create_end() {
        let mut builder = Record::create_begin_unkeyed(CarbonOptions::default(), Mode::Optimize);
        builder.session().begin_object(Some(4)).unwrap();
        builder.session().insert_prop_u8("x", 1).unwrap();
        builder.session().end().unwrap();
        let record = builder.create_end().unwrap();
        assert_eq!(record.to_json_compact().unwrap(), json!({"x": 1}));
    }
}
