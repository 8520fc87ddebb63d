//! Record primary key and commit hash header, living at offset 0 of the
//! record's [`crate::MemFile`] ahead of the root array body.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CarbonError;
use crate::memory::MemFile;

/// One byte tagging which kind of primary key (if any) a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyKind {
    /// No key, no commit hash.
    NoKey = 0,
    /// Auto-generated `u64`, assigned by [`key_generate`].
    AutoKey = 1,
    /// User-supplied unsigned 64-bit key.
    UKey = 2,
    /// User-supplied signed 64-bit key.
    IKey = 3,
    /// User-supplied UTF-8 string key.
    SKey = 4,
}

impl KeyKind {
    fn from_tag(tag: u8) -> Result<Self, CarbonError> {
        match tag {
            0 => Ok(KeyKind::NoKey),
            1 => Ok(KeyKind::AutoKey),
            2 => Ok(KeyKind::UKey),
            3 => Ok(KeyKind::IKey),
            4 => Ok(KeyKind::SKey),
            other => Err(CarbonError::Corrupted(format!(
                "unrecognized key tag byte {other}"
            ))),
        }
    }

    /// A commit hash is present iff the key kind is not `NoKey`.
    #[must_use]
    pub fn has_commit_hash(self) -> bool {
        !matches!(self, KeyKind::NoKey)
    }
}

/// A decoded primary key value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    None,
    Unsigned(u64),
    Signed(i64),
    Str(String),
}

/// Decoded key header: kind, payload, and the commit hash (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyHeader {
    pub kind: KeyKind,
    pub value: KeyValue,
    pub commit_hash: Option<u64>,
}

impl KeyHeader {
    /// Construct a header with no key and no commit hash.
    #[must_use]
    pub fn none() -> Self {
        Self {
            kind: KeyKind::NoKey,
            value: KeyValue::None,
            commit_hash: None,
        }
    }

    /// Byte length of this header as it would be written to the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let payload_len = match &self.value {
            KeyValue::None => 0,
            KeyValue::Unsigned(_) | KeyValue::Signed(_) => 8,
            KeyValue::Str(s) => MemFile::uintvar_len(s.len() as u64) + s.len(),
        };
        1 + payload_len + if self.kind.has_commit_hash() { 8 } else { 0 }
    }

    /// Write the header at the current cursor (expected to be offset 0).
    pub fn write(&self, mf: &mut MemFile) -> Result<(), CarbonError> {
        mf.write(&[self.kind as u8])?;
        match &self.value {
            KeyValue::None => {}
            KeyValue::Unsigned(v) => mf.write(&v.to_le_bytes())?,
            KeyValue::Signed(v) => mf.write(&v.to_le_bytes())?,
            KeyValue::Str(s) => {
                mf.write_uintvar(s.len() as u64)?;
                mf.write(s.as_bytes())?;
            }
        }
        if self.kind.has_commit_hash() {
            mf.write(&self.commit_hash.unwrap_or(0).to_le_bytes())?;
        }
        Ok(())
    }

    /// Read a header starting at the cursor (expected to be offset 0),
    /// leaving the cursor positioned just past it (at the root array body).
    pub fn read(mf: &mut MemFile) -> Result<Self, CarbonError> {
        let tag = mf.read_u8()?;
        let kind = KeyKind::from_tag(tag)?;
        let value = match kind {
            KeyKind::NoKey => KeyValue::None,
            KeyKind::AutoKey | KeyKind::UKey => {
                let bytes = mf.read(8)?;
                KeyValue::Unsigned(u64::from_le_bytes(bytes.try_into().unwrap()))
            }
            KeyKind::IKey => {
                let bytes = mf.read(8)?;
                KeyValue::Signed(i64::from_le_bytes(bytes.try_into().unwrap()))
            }
            KeyKind::SKey => {
                let (len, _) = mf.read_uintvar()?;
                let bytes = mf.read(len as usize)?.to_vec();
                KeyValue::Str(String::from_utf8(bytes).map_err(|e| {
                    CarbonError::Corrupted(format!("key string is not valid utf-8: {e}"))
                })?)
            }
        };
        let commit_hash = if kind.has_commit_hash() {
            let bytes = mf.read(8)?;
            Some(u64::from_le_bytes(bytes.try_into().unwrap()))
        } else {
            None
        };
        Ok(Self {
            kind,
            value,
            commit_hash,
        })
    }
}

static AUTOKEY_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a fresh `u64` value for an `AutoKey` record.
///
/// Mixes a process-wide monotonic counter with wall-clock nanoseconds
/// through `blake3` so that keys generated within the same process are
/// both unique and not trivially predictable/sequential on the wire.
#[must_use]
pub fn key_generate() -> u64 {
    let counter = AUTOKEY_COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);

    let mut seed = [0u8; 24];
    seed[0..8].copy_from_slice(&counter.to_le_bytes());
    seed[8..24].copy_from_slice(&nanos.to_le_bytes());

    let digest = blake3::hash(&seed);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest.as_bytes()[0..8]);
    let value = u64::from_le_bytes(buf);
    // AutoKey == 0 is reserved to mean "not yet assigned" by convention.
    if value == 0 {
        1
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_key_roundtrips_without_commit_hash() {
        let header = KeyHeader::none();
        let mut mf = MemFile::with_capacity(16);
        header.write(&mut mf).unwrap();
        mf.seek(0);
        let decoded = KeyHeader::read(&mut mf).unwrap();
        assert_eq!(decoded, header);
        assert!(decoded.commit_hash.is_none());
    }

    #[test]
    fn skey_roundtrips_with_commit_hash() {
        let header = KeyHeader {
            kind: KeyKind::SKey,
            value: KeyValue::Str("order-42".to_string()),
            commit_hash: Some(0xDEAD_BEEF),
        };
        let mut mf = MemFile::with_capacity(32);
        header.write(&mut mf).unwrap();
        mf.seek(0);
        let decoded = KeyHeader::read(&mut mf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn key_generate_is_nonzero_and_not_constant() {
        let a = key_generate();
        let b = key_generate();
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }
}
