//! Core data model — points, tags, and time-series identity.
//!
//! A [`Point`] is a `(timestamp, value)` pair; a [`TimeSeries`] is a
//! measurement name plus an ordered set of [`Tag`]s.  The series identity
//! used everywhere on disk is the SHA-256 hex digest of the measurement
//! name concatenated with every tag's name and value in sorted order, so
//! two logically equal series always map to the same parquet directory.


use sha2::{Digest, Sha256};

use crate::encoding::{Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Point
// ------------------------------------------------------------------------------------------------

/// A single sample: seconds since the UNIX epoch plus a float value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Sample time in seconds since the UNIX epoch.
    pub timestamp: u64,

    /// Sample value.
    pub value: f64,
}

impl Point {
    /// Create a new point.
    pub fn new(timestamp: u64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

// ------------------------------------------------------------------------------------------------
// Tags
// ------------------------------------------------------------------------------------------------

/// A single `name=value` label on a time series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tag {
    /// Tag name.
    pub name: String,

    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a new tag.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Encode for Tag {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        self.name.encode_to(buf);
        self.value.encode_to(buf);
    }
}

impl Decode for Tag {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (name, mut offset) = String::decode_from(buf)?;
        let (value, n) = String::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { name, value }, offset))
    }
}

/// An ordered tag set, kept sorted lexicographically by `(name, value)`.
///
/// Equality of two tag sets implies identical serialized byte sequences,
/// which is what makes the series hash stable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tags(Vec<Tag>);

impl Tags {
    /// Build a tag set from arbitrary-order tags; sorts them.
    pub fn new(mut tags: Vec<Tag>) -> Self {
        tags.sort();
        Self(tags)
    }

    /// An empty tag set.
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Serialized byte size of the tag list (without the count prefix).
    pub fn wire_size(&self) -> u64 {
        self.0
            .iter()
            .map(|t| 8 + t.name.len() as u64 + 8 + t.value.len() as u64)
            .sum()
    }

    /// Decode `count` tags from `buf`, returning `(tags, bytes_consumed)`.
    pub fn decode_n(buf: &[u8], count: u64) -> Result<(Self, usize), EncodingError> {
        let mut tags = Vec::with_capacity(count as usize);
        let mut offset = 0;
        for _ in 0..count {
            let (tag, n) = Tag::decode_from(&buf[offset..])?;
            offset += n;
            tags.push(tag);
        }
        // Already sorted on disk, but re-sorting keeps the invariant under
        // manual edits to the log.
        Ok((Self::new(tags), offset))
    }
}

impl Encode for Tags {
    fn encode_to(&self, buf: &mut Vec<u8>) {
        for tag in &self.0 {
            tag.encode_to(buf);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TimeSeries
// ------------------------------------------------------------------------------------------------

/// A measurement name plus its sorted tag set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeries {
    /// Measurement name, e.g. `"cpu_temperature"`.
    pub measurement: String,

    /// Sorted tag set.
    pub tags: Tags,
}

impl TimeSeries {
    /// Create a new series handle.
    pub fn new(measurement: impl Into<String>, tags: Tags) -> Self {
        Self {
            measurement: measurement.into(),
            tags,
        }
    }

    /// SHA-256 hex digest identifying this series on disk.
    ///
    /// Covers the measurement name and each tag's name and value bytes in
    /// sorted order.  Two series with equal hashes are semantically equal.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.measurement.as_bytes());
        for tag in self.tags.iter() {
            hasher.update(tag.name.as_bytes());
            hasher.update(tag.value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
