//! Ordered string-keyed metadata dictionary.
//!
//! Minimal boundary form of the metadata payload the container carries for
//! the program and each stream. Insertion order is preserved on the wire.

use crate::io::{varint, Channel};
use crate::Result;

/// Longest accepted key or value on the wire.
const MAX_ENTRY_LEN: u64 = 1 << 16;

/// Longest accepted entry count on the wire.
const MAX_ENTRIES: u64 = 1 << 16;

/// Insertion-ordered string-keyed dictionary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key, replacing an existing value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value.into(),
            None => self.entries.push((key, value.into())),
        }
    }

    /// Look up a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drop keys that are recomputed at finalization so stale caller-supplied
    /// values never survive a write/read cycle.
    pub(crate) fn strip_derived(&mut self) {
        self.entries
            .retain(|(k, _)| k != "bitrate" && k != "max-packet-size" && !k.starts_with("gavf."));
    }

    /// Log all entries at debug level.
    pub fn dump(&self, label: &str) {
        for (k, v) in self.iter() {
            tracing::debug!(label, key = k, value = v, "metadata");
        }
    }

    pub(crate) fn write_to<C: Channel + ?Sized>(&self, ch: &mut C) -> Result<()> {
        varint::write_uvarint(ch, self.entries.len() as u64)?;
        for (k, v) in &self.entries {
            varint::write_string(ch, k)?;
            varint::write_string(ch, v)?;
        }
        Ok(())
    }

    pub(crate) fn read_from<C: Channel + ?Sized>(ch: &mut C) -> Result<Self> {
        let count = varint::read_uvarint(ch)?;
        if count > MAX_ENTRIES {
            return Err(crate::Error::invalid_data(format!(
                "metadata entry count {count} exceeds limit"
            )));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let k = varint::read_string(ch, MAX_ENTRY_LEN)?;
            let v = varint::read_string(ch, MAX_ENTRY_LEN)?;
            entries.push((k, v));
        }
        Ok(Self { entries })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}
