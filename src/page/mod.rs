//! Fixed-size, typed, serializable pages.
//!
//! Every persisted file in TempusDB is a sequence of fixed-size pages.  A
//! page carries a 24-byte big-endian header `min | max | count` followed
//! by a typed body and zero padding:
//!
//! - **Timestamp page** — uvarint absolute timestamp, then uvarint deltas.
//! - **Value page** — a Gorilla-compressed bit stream (padding counted in
//!   bits, `(P - 24) * 8`).
//! - **Tombstone page** — one bit per row, MSB-first (1 = deleted).
//!
//! (The WAL page lives in [`crate::wal`] next to its entry type; it
//! implements the same [`Page`] capability set.)
//!
//! Every page maintains a padding budget consumed by each accepted entry;
//! `try_add` returns `false` when the entry no longer fits, signalling the
//! owning chunk to flush and allocate a fresh page.
//!
//! Deserialization recovers enough codec state to *continue* writing when
//! a partially filled page is reloaded at startup: after reading `N`
//! entries a timestamp page exposes the last absolute value, and a value
//! page the last scaled value plus the last `(leading, trailing)` pair.

#[cfg(test)]
mod tests;

use thiserror::Error;

use crate::bitio::{BitIoError, BitReader, BitWriter};
use crate::codec::{
    CodecError, TimestampCompressor, TimestampReconstructor, ValueCompressor, ValueReconstructor,
};
use crate::encoding::EncodingError;

/// Size of the fixed page header in bytes.
pub const PAGE_META_SIZE: u64 = 24;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced while serializing or deserializing pages.
#[derive(Debug, Error)]
pub enum PageError {
    /// The page body contradicts its header (e.g. count reads past bounds).
    #[error("corrupt page: {0}")]
    Corrupt(String),

    /// A wire primitive failed to decode.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The value bit stream failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A raw bit-level read failed.
    #[error("bit stream error: {0}")]
    BitIo(#[from] BitIoError),
}

// ------------------------------------------------------------------------------------------------
// Page header
// ------------------------------------------------------------------------------------------------

/// The 24-byte page header: `min:u64 | max:u64 | count:u64`, big-endian.
///
/// Timestamp and WAL pages store plain u64 values; value pages store
/// `f64::to_bits` patterns; tombstone pages store zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    /// Minimum entry value on the page.
    pub min: u64,
    /// Maximum entry value on the page.
    pub max: u64,
    /// Number of entries on the page.
    pub count: u64,
}

impl PageMeta {
    /// Header for an empty page.
    pub fn new() -> Self {
        Self {
            min: u64::MAX,
            max: 0,
            count: 0,
        }
    }

    /// Fold a u64 entry into the min/max fields.
    pub fn update(&mut self, value: u64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Serialize into exactly [`PAGE_META_SIZE`] bytes.
    pub fn serialize(&self) -> [u8; PAGE_META_SIZE as usize] {
        let mut bytes = [0u8; PAGE_META_SIZE as usize];
        bytes[0..8].copy_from_slice(&self.min.to_be_bytes());
        bytes[8..16].copy_from_slice(&self.max.to_be_bytes());
        bytes[16..24].copy_from_slice(&self.count.to_be_bytes());
        bytes
    }

    /// Read a header from the first 24 bytes of `bytes`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, PageError> {
        if bytes.len() < PAGE_META_SIZE as usize {
            return Err(PageError::Corrupt(format!(
                "page shorter than header ({} bytes)",
                bytes.len()
            )));
        }
        let mut field = [0u8; 8];
        field.copy_from_slice(&bytes[0..8]);
        let min = u64::from_be_bytes(field);
        field.copy_from_slice(&bytes[8..16]);
        let max = u64::from_be_bytes(field);
        field.copy_from_slice(&bytes[16..24]);
        let count = u64::from_be_bytes(field);
        Ok(Self { min, max, count })
    }
}

impl Default for PageMeta {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------------------------------------
// Page capability set
// ------------------------------------------------------------------------------------------------

/// Capabilities shared by every page type.  Dispatch is always static —
/// callers are generic or hold the concrete type.
pub trait Page {
    /// Serialize into exactly `page_size` bytes (header, body, padding).
    fn serialize(&self) -> Vec<u8>;

    /// Number of entries currently on the page.
    fn entry_count(&self) -> u64;

    /// The page header as it would be written.
    fn metadata(&self) -> PageMeta;
}

// ------------------------------------------------------------------------------------------------
// Timestamp page
// ------------------------------------------------------------------------------------------------

/// A page of delta-encoded timestamps.
#[derive(Debug)]
pub struct TimestampPage {
    page_size: u64,
    meta: PageMeta,
    body: Vec<u8>,
    /// Bytes remaining in the body.
    padding: u64,
    compressor: TimestampCompressor,
}

impl TimestampPage {
    /// Create an empty page of `page_size` bytes.
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            meta: PageMeta::new(),
            body: Vec::with_capacity((page_size - PAGE_META_SIZE) as usize),
            padding: page_size - PAGE_META_SIZE,
            compressor: TimestampCompressor::new(),
        }
    }

    /// Append `timestamp` if it fits; `false` means the page is full and
    /// the owner must spill it.
    pub fn try_add(&mut self, timestamp: u64) -> bool {
        let needed = self.compressor.encoded_len(timestamp, self.meta.count) as u64;
        if needed > self.padding {
            return false;
        }
        self.compressor
            .compress_next(timestamp, self.meta.count, &mut self.body);
        self.padding -= needed;
        self.meta.update(timestamp);
        self.meta.count += 1;
        true
    }

    /// The last absolute timestamp on the page (0 when empty).
    pub fn last_timestamp(&self) -> u64 {
        self.compressor.last_value()
    }

    /// Rebuild a page from its serialized form, restoring the delta state
    /// so further appends continue the stream.  Returns the page and its
    /// decoded timestamps.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, Vec<u64>), PageError> {
        let page_size = bytes.len() as u64;
        let meta = PageMeta::deserialize(bytes)?;
        let body = &bytes[PAGE_META_SIZE as usize..];
        if meta.count > body.len() as u64 {
            return Err(PageError::Corrupt(format!(
                "timestamp count {} exceeds body of {} bytes",
                meta.count,
                body.len()
            )));
        }

        let mut reconstructor = TimestampReconstructor::new(body);
        let mut timestamps = Vec::with_capacity(meta.count as usize);
        for _ in 0..meta.count {
            let (ts, _) = reconstructor.reconstruct_next()?;
            timestamps.push(ts);
        }

        let used = reconstructor.bytes_read();
        let page = Self {
            page_size,
            meta,
            body: body[..used].to_vec(),
            padding: (page_size - PAGE_META_SIZE) - used as u64,
            compressor: TimestampCompressor::resume(reconstructor.last_value()),
        };
        Ok((page, timestamps))
    }
}

impl Page for TimestampPage {
    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.page_size as usize);
        bytes.extend_from_slice(&self.meta.serialize());
        bytes.extend_from_slice(&self.body);
        bytes.resize(self.page_size as usize, 0);
        bytes
    }

    fn entry_count(&self) -> u64 {
        self.meta.count
    }

    fn metadata(&self) -> PageMeta {
        self.meta
    }
}

// ------------------------------------------------------------------------------------------------
// Value page
// ------------------------------------------------------------------------------------------------

/// A page of Gorilla-compressed values, packed at bit granularity.
#[derive(Debug)]
pub struct ValuePage {
    page_size: u64,
    count: u64,
    min_value: f64,
    max_value: f64,
    writer: BitWriter,
    /// Bits remaining in the body — `(page_size - 24) * 8` when empty.
    padding_bits: u64,
    compressor: ValueCompressor,
}

impl ValuePage {
    /// Create an empty page of `page_size` bytes.
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            count: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            writer: BitWriter::with_capacity((page_size - PAGE_META_SIZE) as usize),
            padding_bits: (page_size - PAGE_META_SIZE) * 8,
            compressor: ValueCompressor::new(),
        }
    }

    /// Append `value` if its compressed form fits; `false` means the page
    /// is full and the owner must spill it.
    pub fn try_add(&mut self, value: f64) -> bool {
        let cv = self.compressor.compress_next(value, self.count);
        let needed = u64::from(cv.bit_len());
        if needed > self.padding_bits {
            return false;
        }
        cv.write_to(&mut self.writer);
        self.compressor.commit(&cv);
        self.padding_bits -= needed;
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
        self.count += 1;
        true
    }

    /// The scaled bit pattern of the last value on the page.
    pub fn last_scaled(&self) -> u64 {
        self.compressor.last_scaled()
    }

    /// Rebuild a page from its serialized form, restoring the XOR window
    /// state so further appends continue the bit stream.  Returns the page
    /// and its decoded values.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, Vec<f64>), PageError> {
        let page_size = bytes.len() as u64;
        let meta = PageMeta::deserialize(bytes)?;
        let body = &bytes[PAGE_META_SIZE as usize..];
        if meta.count > body.len() as u64 * 8 {
            return Err(PageError::Corrupt(format!(
                "value count {} exceeds body of {} bits",
                meta.count,
                body.len() * 8
            )));
        }

        let mut reconstructor = ValueReconstructor::new(body);
        let mut values = Vec::with_capacity(meta.count as usize);
        for _ in 0..meta.count {
            values.push(reconstructor.reconstruct_next()?);
        }

        let bit_pos = reconstructor.bit_pos();
        let (leading, trailing) = reconstructor.last_window();
        let page = Self {
            page_size,
            count: meta.count,
            min_value: if meta.count == 0 {
                f64::INFINITY
            } else {
                f64::from_bits(meta.min)
            },
            max_value: if meta.count == 0 {
                f64::NEG_INFINITY
            } else {
                f64::from_bits(meta.max)
            },
            writer: BitWriter::from_bits(body, bit_pos),
            padding_bits: (page_size - PAGE_META_SIZE) * 8 - bit_pos as u64,
            compressor: ValueCompressor::resume(reconstructor.last_scaled(), leading, trailing),
        };
        Ok((page, values))
    }
}

impl Page for ValuePage {
    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.page_size as usize);
        bytes.extend_from_slice(&self.metadata().serialize());
        bytes.extend_from_slice(self.writer.as_bytes());
        bytes.resize(self.page_size as usize, 0);
        bytes
    }

    fn entry_count(&self) -> u64 {
        self.count
    }

    fn metadata(&self) -> PageMeta {
        PageMeta {
            min: self.min_value.to_bits(),
            max: self.max_value.to_bits(),
            count: self.count,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Tombstone page
// ------------------------------------------------------------------------------------------------

/// A page of per-row deletion bits, packed MSB-first.
#[derive(Debug)]
pub struct TombstonePage {
    page_size: u64,
    bits: Vec<bool>,
    /// Bits remaining in the body.
    padding_bits: u64,
}

impl TombstonePage {
    /// Create an empty page of `page_size` bytes.
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            bits: Vec::new(),
            padding_bits: (page_size - PAGE_META_SIZE) * 8,
        }
    }

    /// Append one row's deletion bit if it fits.
    pub fn try_add(&mut self, deleted: bool) -> bool {
        if self.padding_bits == 0 {
            return false;
        }
        self.bits.push(deleted);
        self.padding_bits -= 1;
        true
    }

    /// The deletion bit for row `index` on this page.
    pub fn bit(&self, index: usize) -> Option<bool> {
        self.bits.get(index).copied()
    }

    /// Flip row `index` to deleted.  Out-of-range indices are ignored.
    pub fn mark_deleted(&mut self, index: usize) {
        if let Some(bit) = self.bits.get_mut(index) {
            *bit = true;
        }
    }

    /// All deletion bits on the page, in row order.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Rebuild a page from its serialized form.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, PageError> {
        let page_size = bytes.len() as u64;
        let meta = PageMeta::deserialize(bytes)?;
        let capacity = (page_size - PAGE_META_SIZE) * 8;
        if meta.count > capacity {
            return Err(PageError::Corrupt(format!(
                "tombstone count {} exceeds page capacity {capacity}",
                meta.count
            )));
        }

        let mut reader = BitReader::new(&bytes[PAGE_META_SIZE as usize..]);
        let mut bits = Vec::with_capacity(meta.count as usize);
        for _ in 0..meta.count {
            bits.push(reader.read_bit()? == 1);
        }

        Ok(Self {
            page_size,
            bits,
            padding_bits: capacity - meta.count,
        })
    }
}

impl Page for TombstonePage {
    fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.page_size as usize);
        bytes.extend_from_slice(&self.metadata().serialize());
        let mut writer = BitWriter::with_capacity((self.page_size - PAGE_META_SIZE) as usize);
        for &bit in &self.bits {
            writer.write_bit(u8::from(bit));
        }
        bytes.extend_from_slice(writer.as_bytes());
        bytes.resize(self.page_size as usize, 0);
        bytes
    }

    fn entry_count(&self) -> u64 {
        self.bits.len() as u64
    }

    fn metadata(&self) -> PageMeta {
        PageMeta {
            min: 0,
            max: 0,
            count: self.bits.len() as u64,
        }
    }
}
